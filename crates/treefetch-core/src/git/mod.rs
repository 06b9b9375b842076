//! Git plumbing behind the `git` input: bare mirrors, commit lookup, export
//! and working-copy clones.
//!
//! Everything here shells out to `git` except commit metadata, which is read
//! with libgit2.

mod commit;
mod mirror;

pub use commit::commit_time;
pub use mirror::{GitMirror, clone_working_copy};
