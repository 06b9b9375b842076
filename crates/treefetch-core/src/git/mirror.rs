//! Bare mirrors of remote repositories, one per URL.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;

use crate::fs::copy_tree;

/// Keeps bare mirrors under `<cache_dir>/git` and exports commits from them.
#[derive(Debug, Clone)]
pub struct GitMirror {
    cache_dir: PathBuf,
}

impl GitMirror {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Mirror location for `url`; stable across runs.
    pub fn bare_repo_dir(&self, url: &str) -> PathBuf {
        let hash = blake3::hash(url.as_bytes()).to_hex().to_string();
        self.cache_dir.join("git").join(format!("{}.git", hash))
    }

    /// Resolve `reference` (a branch, tag or `HEAD`) on the remote to a commit,
    /// updating the mirror.
    pub fn resolve_ref(&self, url: &str, reference: &str) -> anyhow::Result<String> {
        let bare_dir = self.ensure_bare_repo(url)?;
        run_git(Some(&bare_dir), &["fetch", "--force", "origin", reference])?;
        let commit = git_rev_parse(Some(&bare_dir), "FETCH_HEAD^{commit}")?;
        tracing::debug!(url, reference, commit = %commit, "resolved git reference");
        Ok(commit)
    }

    /// Make sure `rev` is present in the mirror, fetching if needed.
    pub fn ensure_commit(&self, url: &str, rev: &str) -> anyhow::Result<PathBuf> {
        let bare_dir = self.ensure_bare_repo(url)?;
        if has_commit(&bare_dir, rev) {
            return Ok(bare_dir);
        }

        run_git(
            Some(&bare_dir),
            &["fetch", "--force", "origin", "+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"],
        )?;
        if !has_commit(&bare_dir, rev) {
            run_git(Some(&bare_dir), &["fetch", "origin", rev])?;
        }
        if !has_commit(&bare_dir, rev) {
            anyhow::bail!("Commit {} not found in {}", rev, url);
        }
        Ok(bare_dir)
    }

    /// Check out `rev` from the mirror into `dest`, without `.git`.
    pub fn export(&self, bare_dir: &Path, rev: &str, dest: &Path) -> anyhow::Result<()> {
        let worktree_dir = self.unique_temp_worktree_dir()?;
        let worktree_str = worktree_dir
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid worktree dir"))?;

        run_git(
            Some(bare_dir),
            &["worktree", "add", "--detach", worktree_str, rev],
        )?;

        let copied = std::fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create export directory: {}", dest.display()))
            .and_then(|_| copy_tree(&worktree_dir, dest, true));

        run_git(
            Some(bare_dir),
            &["worktree", "remove", "--force", worktree_str],
        )?;
        let _ = std::fs::remove_dir_all(&worktree_dir);

        copied
    }

    fn ensure_bare_repo(&self, url: &str) -> anyhow::Result<PathBuf> {
        let bare_dir = self.bare_repo_dir(url);
        if bare_dir.exists() {
            return Ok(bare_dir);
        }

        std::fs::create_dir_all(
            bare_dir
                .parent()
                .ok_or_else(|| anyhow::anyhow!("Bare repo directory has no parent"))?,
        )
        .with_context(|| {
            format!(
                "Failed to create git cache directory: {}",
                bare_dir.display()
            )
        })?;

        tracing::info!(url, "creating git mirror");
        run_git(
            None,
            &[
                "clone",
                "--bare",
                url,
                bare_dir
                    .to_str()
                    .ok_or_else(|| anyhow::anyhow!("Invalid bare repo dir"))?,
            ],
        )?;

        Ok(bare_dir)
    }

    fn unique_temp_worktree_dir(&self) -> anyhow::Result<PathBuf> {
        let worktree_base = self.cache_dir.join("worktrees");
        std::fs::create_dir_all(&worktree_base).with_context(|| {
            format!(
                "Failed to create worktrees directory: {}",
                worktree_base.display()
            )
        })?;
        clean_stale_worktrees(&worktree_base)?;

        for attempt in 0..100 {
            let thread_id = format!("{:?}", std::thread::current().id())
                .chars()
                .filter(char::is_ascii_digit)
                .collect::<String>();
            let name = format!("{}.{}.{}", std::process::id(), thread_id, attempt);
            let candidate = worktree_base.join(name);
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        anyhow::bail!(
            "Failed to allocate a temp worktree directory in {}",
            worktree_base.display()
        );
    }
}

/// `git clone <url> <dest>` followed by `git checkout <pointer>`.
pub fn clone_working_copy(url: &str, dest: &Path, pointer: &str) -> anyhow::Result<()> {
    let dest_str = dest
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid destination: {}", dest.display()))?;
    run_git(None, &["clone", url, dest_str])?;
    run_git(Some(dest), &["checkout", pointer])
}

fn has_commit(bare_dir: &Path, rev: &str) -> bool {
    git_rev_parse(Some(bare_dir), &format!("{}^{{commit}}", rev)).is_ok()
}

/// Remove worktrees left behind by processes that no longer exist.
fn clean_stale_worktrees(base: &Path) -> anyhow::Result<()> {
    let current_pid = std::process::id();
    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if let Some(pid_str) = name_str.split('.').next()
            && let Ok(pid) = pid_str.parse::<u32>()
            && pid != current_pid
            && !is_process_alive(pid)
        {
            let _ = std::fs::remove_dir_all(entry.path());
        }
    }
    Ok(())
}

fn is_process_alive(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new(&format!("/proc/{}", pid)).exists()
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        true
    }
}

fn run_git(cwd: Option<&Path>, args: &[&str]) -> anyhow::Result<()> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .with_context(|| format!("Failed to run git {:?}", args))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Git command failed {:?}: {}", args, stderr.trim());
    }
    Ok(())
}

fn git_rev_parse(cwd: Option<&Path>, rev: &str) -> anyhow::Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(["rev-parse", "--verify", "--quiet", rev]);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .with_context(|| format!("Failed to run git rev-parse {}", rev))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git rev-parse {} failed: {}", rev, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
