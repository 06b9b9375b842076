//! Deterministic NAR hashing of filesystem trees
//!
//! Serializes a path in the Nix archive (NAR) format and hashes the
//! serialization with SHA-256, so results agree with
//! `nix-hash --type sha256`. The hash identifies the *content* of a fetched
//! tree independently of where it came from.
//!
//! # Serialization
//! - Every string is written as its length (u64, little endian), its bytes,
//!   then zero padding up to a multiple of 8
//! - Directory entries are visited in byte order of their names
//! - Regular files record their executable bit and full contents
//! - Symlinks record their target and are never followed

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::hash::{Hash, HashAlgorithm};

/// NAR hash and serialized size of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarDigest {
    pub hash: Hash,
    pub size: u64,
}

/// Compute the NAR hash of `path`, which may be a directory, file or symlink.
///
/// # Example
/// ```no_run
/// use treefetch_core::fs::nar::hash_path;
/// use std::path::Path;
///
/// let digest = hash_path(Path::new("/path/to/dir"))?;
/// assert!(digest.hash.to_sri().starts_with("sha256-"));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn hash_path(path: &Path) -> anyhow::Result<NarDigest> {
    let mut sink = NarSink::default();
    sink.string(b"nix-archive-1");
    serialize(&mut sink, path)?;
    let bytes = sink.hasher.finalize().to_vec();
    Ok(NarDigest {
        hash: Hash::from_bytes(HashAlgorithm::Sha256, bytes)?,
        size: sink.size,
    })
}

#[derive(Default)]
struct NarSink {
    hasher: Sha256,
    size: u64,
}

impl NarSink {
    fn raw(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.size += data.len() as u64;
    }

    fn string(&mut self, data: &[u8]) {
        self.raw(&(data.len() as u64).to_le_bytes());
        self.raw(data);
        self.pad(data.len() as u64);
    }

    fn pad(&mut self, len: u64) {
        let padding = (8 - (len % 8)) % 8;
        self.raw(&[0u8; 8][..padding as usize]);
    }
}

fn serialize(sink: &mut NarSink, path: &Path) -> anyhow::Result<()> {
    let meta = fs::symlink_metadata(path)
        .with_context(|| format!("Failed to stat: {}", path.display()))?;
    let ty = meta.file_type();

    sink.string(b"(");
    if ty.is_symlink() {
        let target = fs::read_link(path)
            .with_context(|| format!("Failed to read symlink: {}", path.display()))?;
        sink.string(b"type");
        sink.string(b"symlink");
        sink.string(b"target");
        sink.string(target.to_string_lossy().as_bytes());
    } else if ty.is_file() {
        sink.string(b"type");
        sink.string(b"regular");
        if is_executable(&meta) {
            sink.string(b"executable");
            sink.string(b"");
        }
        sink.string(b"contents");
        write_contents(sink, path, meta.len())?;
    } else if ty.is_dir() {
        sink.string(b"type");
        sink.string(b"directory");

        let mut entries = fs::read_dir(path)
            .with_context(|| format!("Failed to read directory: {}", path.display()))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read directory entries: {}", path.display()))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            sink.string(b"entry");
            sink.string(b"(");
            sink.string(b"name");
            sink.string(entry.file_name().to_string_lossy().as_bytes());
            sink.string(b"node");
            serialize(sink, &entry.path())?;
            sink.string(b")");
        }
    } else {
        anyhow::bail!("Unsupported filesystem entry type: {}", path.display());
    }
    sink.string(b")");

    Ok(())
}

fn write_contents(sink: &mut NarSink, path: &Path, len: u64) -> anyhow::Result<()> {
    sink.raw(&len.to_le_bytes());
    let mut file =
        fs::File::open(path).with_context(|| format!("Failed to open: {}", path.display()))?;
    let mut buf = [0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        if n == 0 {
            break;
        }
        sink.raw(&buf[..n]);
        written += n as u64;
    }
    if written != len {
        anyhow::bail!("File changed while hashing: {}", path.display());
    }
    sink.pad(len);
    Ok(())
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}
