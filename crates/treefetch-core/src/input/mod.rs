//! Inputs: parsed, possibly unresolved references to external sources.
//!
//! Each source kind is an [`InputVariant`]. Callers hold an [`Input`], a cheap
//! shared handle pairing a variant with the optional NAR hash the caller
//! expects. Inputs are never mutated; resolving or overriding one produces a
//! new handle.

pub mod git;
pub mod github;
pub mod refs;

use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::attrs::{Attr, Attrs};
use crate::context::FetchContext;
use crate::error::{FetchError, Result};
use crate::hash::Hash;
use crate::tree::Tree;

pub use git::{GitInput, GitInputScheme};
pub use github::{GitHubInput, GitHubInputScheme};

/// A replacement pointer for [`Input::apply_overrides`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Override {
    Ref(String),
    Rev(Hash),
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref(name) => f.write_str(name),
            Self::Rev(rev) => f.write_str(&rev.git_rev()),
        }
    }
}

/// Behaviour every source kind provides.
pub trait InputVariant: fmt::Debug + Send + Sync + 'static {
    /// Stable discriminator, stored as the `type` attribute.
    fn type_tag(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// Value equality; always false across variants.
    fn equals(&self, other: &dyn InputVariant) -> bool;

    fn get_ref(&self) -> Option<&str>;

    fn get_rev(&self) -> Option<&Hash>;

    fn is_immutable(&self) -> bool {
        self.get_rev().is_some()
    }

    /// Variant-specific attributes, without `type` and `narHash`.
    fn canonical_attrs(&self) -> Attrs;

    /// Canonical, re-parseable URL form.
    fn to_display_string(&self) -> String;

    /// A copy with its pointer replaced by `pointer`.
    fn with_override(&self, pointer: &Override) -> Result<Arc<dyn InputVariant>> {
        Err(FetchError::UnsupportedOverride {
            input: self.to_display_string(),
            value: pointer.to_string(),
        })
    }

    /// Materialize a live working copy at `dest_dir`.
    fn clone_to(&self, ctx: &FetchContext, dest_dir: &Path) -> Result<()> {
        let _ = (ctx, dest_dir);
        Err(FetchError::Other(anyhow::anyhow!(
            "cloning input '{}' is not supported",
            self.to_display_string()
        )))
    }

    /// Fetch the tree and return it with the resolved input.
    fn fetch_tree_internal(&self, ctx: &FetchContext) -> Result<(Tree, Input)>;
}

/// Shared handle to an input.
#[derive(Debug, Clone)]
pub struct Input {
    variant: Arc<dyn InputVariant>,
    nar_hash: Option<Hash>,
}

impl Input {
    pub fn new(variant: impl InputVariant) -> Self {
        Self::from_variant(Arc::new(variant))
    }

    pub fn from_variant(variant: Arc<dyn InputVariant>) -> Self {
        Self {
            variant,
            nar_hash: None,
        }
    }

    /// The same input pinned to (or freed from) an expected NAR hash.
    pub fn with_nar_hash(self, nar_hash: Option<Hash>) -> Self {
        Self { nar_hash, ..self }
    }

    pub fn variant(&self) -> &dyn InputVariant {
        self.variant.as_ref()
    }

    pub fn downcast_ref<T: InputVariant>(&self) -> Option<&T> {
        self.variant.as_any().downcast_ref::<T>()
    }

    /// Whether both handles share one underlying variant value.
    pub fn ptr_eq(&self, other: &Input) -> bool {
        Arc::ptr_eq(&self.variant, &other.variant)
    }

    pub fn type_tag(&self) -> &'static str {
        self.variant.type_tag()
    }

    pub fn is_immutable(&self) -> bool {
        self.variant.is_immutable()
    }

    pub fn get_ref(&self) -> Option<&str> {
        self.variant.get_ref()
    }

    pub fn get_rev(&self) -> Option<&Hash> {
        self.variant.get_rev()
    }

    pub fn nar_hash(&self) -> Option<&Hash> {
        self.nar_hash.as_ref()
    }

    /// Full attribute form, including `type` and `narHash`.
    pub fn to_attrs(&self) -> Attrs {
        let mut attrs = self.variant.canonical_attrs();
        if let Some(nar_hash) = &self.nar_hash {
            attrs.insert("narHash".into(), Attr::String(nar_hash.to_sri()));
        }
        attrs.insert("type".into(), Attr::from(self.type_tag()));
        attrs
    }

    pub fn to_display_string(&self) -> String {
        self.variant.to_display_string()
    }

    /// Replace the ref or the rev.
    ///
    /// The pointer is replaced as a unit: a new rev drops the ref and a new
    /// ref drops the rev, so an input never carries both. Supplying both at
    /// once is rejected. Supplying neither returns this very handle.
    pub fn apply_overrides(&self, git_ref: Option<String>, rev: Option<Hash>) -> Result<Input> {
        let pointer = match (git_ref, rev) {
            (None, None) => return Ok(self.clone()),
            (Some(_), Some(_)) => {
                return Err(FetchError::ConflictingOverrides(self.to_display_string()));
            }
            (Some(name), None) => Override::Ref(name),
            (None, Some(rev)) => Override::Rev(rev),
        };
        let variant = self.variant.with_override(&pointer)?;
        Ok(Self {
            variant,
            nar_hash: self.nar_hash.clone(),
        })
    }

    pub fn clone_to(&self, ctx: &FetchContext, dest_dir: &Path) -> Result<()> {
        self.variant.clone_to(ctx, dest_dir)
    }

    /// Fetch the tree this input denotes and verify its NAR hash.
    ///
    /// Returns the tree and the resolved input: ref cleared, rev pinned and
    /// the tree's NAR hash recorded.
    pub fn fetch_tree(&self, ctx: &FetchContext) -> Result<(Tree, Input)> {
        let (mut tree, resolved) = self.variant.fetch_tree_internal(ctx)?;
        let store = ctx.store();

        if tree.actual_path.as_os_str().is_empty() {
            tree.actual_path = store.to_real_path(&tree.store_path);
        }

        let nar_hash = match &tree.info.nar_hash {
            Some(hash) => hash.clone(),
            None => {
                let hash = store.query_path_info(&tree.store_path)?.nar_hash;
                tree.info.nar_hash = Some(hash.clone());
                hash
            }
        };

        if let Some(resolved_hash) = &resolved.nar_hash {
            assert_eq!(
                resolved_hash, &nar_hash,
                "resolved input '{}' disagrees with the NAR hash of {}",
                resolved, tree.store_path
            );
        }

        if let Some(expected) = &self.nar_hash
            && expected != &nar_hash
        {
            return Err(FetchError::HashMismatch {
                input: self.to_display_string(),
                path: tree.actual_path,
                expected: expected.to_sri(),
                got: nar_hash.to_sri(),
            });
        }

        Ok((tree, resolved.with_nar_hash(Some(nar_hash))))
    }
}

impl PartialEq for Input {
    fn eq(&self, other: &Self) -> bool {
        self.variant.equals(other.variant.as_ref()) && self.nar_hash == other.nar_hash
    }
}

impl Eq for Input {}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

#[cfg(test)]
mod tests;
