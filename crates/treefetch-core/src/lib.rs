//! treefetch core library
//!
//! Parses references to remote source trees (`github:owner/repo/ref`,
//! `git+https://…`), resolves them to immutable commits, materializes the
//! trees in a content-addressed store and verifies their NAR hashes.

pub mod attrs;
pub mod cache;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod fs;
pub mod git;
pub mod hash;
pub mod input;
pub mod parsed_url;
pub mod registry;
pub mod store;
pub mod tree;

/// Re-exports of commonly used types
pub mod prelude {
    // Attributes and hashes
    pub use crate::attrs::{Attr, Attrs};
    pub use crate::hash::{Hash, HashAlgorithm};

    // Inputs
    pub use crate::input::{GitHubInput, GitInput, Input, InputVariant};
    pub use crate::registry::{InputScheme, InputSchemeRegistry};

    // Fetching
    pub use crate::context::FetchContext;
    pub use crate::tree::{Tree, TreeInfo};

    // Services
    pub use crate::cache::{Cache, FileCache, MemoryCache};
    pub use crate::download::{Downloader, HttpDownloader};
    pub use crate::store::{LocalStore, Store, StorePath};

    // Configuration and errors
    pub use crate::config::Settings;
    pub use crate::error::{FetchError, Result};
}
