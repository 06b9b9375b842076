//! Commit metadata read through libgit2.

use std::path::Path;

use anyhow::Context;
use git2::{Oid, Repository};

/// Committer time of `rev`, in Unix seconds.
pub fn commit_time(repo_path: &Path, rev: &str) -> anyhow::Result<i64> {
    let repo = Repository::open(repo_path)
        .with_context(|| format!("Failed to open repository: {}", repo_path.display()))?;
    let oid = Oid::from_str(rev).with_context(|| format!("Invalid commit hash: {}", rev))?;
    let commit = repo
        .find_commit(oid)
        .with_context(|| format!("Commit {} not found in {}", rev, repo_path.display()))?;
    Ok(commit.time().seconds())
}
