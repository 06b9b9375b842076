//! Filesystem primitives shared across features.

pub mod nar;

use std::fs;
use std::path::Path;

use anyhow::Context;

pub use nar::{NarDigest, hash_path};

/// Copy a tree from `src` to `dst`, preserving symlinks and permissions.
///
/// When `skip_git` is set, `.git` entries are left out.
pub fn copy_tree(src: &Path, dst: &Path, skip_git: bool) -> anyhow::Result<()> {
    let meta = fs::symlink_metadata(src)
        .with_context(|| format!("Failed to stat: {}", src.display()))?;

    if meta.is_dir() {
        fs::create_dir_all(dst)
            .with_context(|| format!("Failed to create directory: {}", dst.display()))?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if skip_git && file_name == ".git" {
                continue;
            }
            copy_tree(&entry.path(), &dst.join(&file_name), skip_git)?;
        }
    } else if meta.file_type().is_symlink() {
        copy_symlink(src, dst)?;
    } else {
        fs::copy(src, dst).with_context(|| {
            format!("Failed to copy {} to {}", src.display(), dst.display())
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> anyhow::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(&target, dst)
        .with_context(|| format!("Failed to create symlink: {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> anyhow::Result<()> {
    anyhow::bail!(
        "Symlinks are not supported on this platform: {} -> {}",
        src.display(),
        dst.display()
    )
}
