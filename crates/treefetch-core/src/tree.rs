//! Fetch results.

use std::path::PathBuf;

use crate::hash::Hash;
use crate::store::{Store, StorePath};

/// Metadata about a fetched tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeInfo {
    /// Unix seconds of the newest change in the tree, when the source knows it.
    pub last_modified: Option<i64>,
    /// NAR hash of the tree. Once known it never changes.
    pub nar_hash: Option<Hash>,
}

impl TreeInfo {
    /// Store path a tree with this NAR hash occupies, named `source`.
    /// `None` until the NAR hash is known.
    pub fn compute_store_path(&self, store: &dyn Store) -> Option<StorePath> {
        self.nar_hash
            .as_ref()
            .map(|hash| store.make_fixed_output_path(hash, "source"))
    }
}

/// A materialized, content-addressed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    /// Where the tree can be read. Empty until the orchestration fills it.
    pub actual_path: PathBuf,
    pub store_path: StorePath,
    pub info: TreeInfo,
}

impl Tree {
    pub fn new(store_path: StorePath, last_modified: Option<i64>) -> Self {
        Self {
            actual_path: PathBuf::new(),
            store_path,
            info: TreeInfo {
                last_modified,
                nar_hash: None,
            },
        }
    }

    pub fn with_actual_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.actual_path = path.into();
        self
    }
}
