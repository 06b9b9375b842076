//! Tarball unpacking.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

/// Result of unpacking an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedArchive {
    /// The single top-level directory of the archive, or the destination
    /// itself when the archive has several top-level entries.
    pub root: PathBuf,
    /// Newest entry modification time, Unix seconds.
    pub last_modified: i64,
}

/// Unpack a gzipped tarball into `dest`, which must be empty or absent.
pub fn unpack_tarball<R: Read>(reader: R, dest: &Path) -> anyhow::Result<UnpackedArchive> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create unpack directory: {}", dest.display()))?;

    let mut archive = Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(true);

    let mut last_modified = 0i64;
    for entry in archive.entries().context("Failed to read tarball")? {
        let mut entry = entry.context("Failed to read tarball entry")?;
        if matches!(
            entry.header().entry_type(),
            EntryType::XGlobalHeader | EntryType::XHeader
        ) {
            continue;
        }
        let mtime = entry.header().mtime().unwrap_or(0);
        last_modified = last_modified.max(i64::try_from(mtime).unwrap_or(i64::MAX));
        let unpacked = entry
            .unpack_in(dest)
            .with_context(|| format!("Failed to unpack into {}", dest.display()))?;
        if !unpacked {
            anyhow::bail!("Tarball entry escapes the unpack directory");
        }
    }

    let mut top_level = fs::read_dir(dest)?.collect::<Result<Vec<_>, _>>()?;
    let root = if top_level.len() == 1 && top_level[0].file_type()?.is_dir() {
        top_level.remove(0).path()
    } else {
        dest.to_path_buf()
    };

    Ok(UnpackedArchive {
        root,
        last_modified,
    })
}
