//! Canonical content hash of a filesystem subtree (spec §4.1, component A).
//!
//! The hash is a recursive Merkle construction over [`ReadableFs`]: a
//! directory's digest folds in `name || 0x00 || child_digest || 0x00` for
//! every masked-out, non-empty child in byte-wise ascending name order.
//! Files and symlinks are leaves whose digest is taken directly over their
//! content (file bytes, or link target string). Blake2b-512 is the
//! published algorithm; the printable form is `"blake2b-" || hex(digest)`.

use anvil_fs::{EntryKind, FsError, ReadableFs};
use anvil_paths::SlashPathBuf;
use blake2::{Blake2b512, Digest};
use thiserror::Error;

const ALGORITHM_PREFIX: &str = "blake2b";

type RawDigest = [u8; 64];

#[derive(Debug, Error)]
pub enum HashError {
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("symlink at {0} resolves outside the filesystem root")]
    SymlinkEscapesRoot(String),
    #[error("checksum {0:?} does not use a recognized algorithm")]
    UnrecognizedAlgorithm(String),
    #[error("checksum {0:?} is not valid hex")]
    InvalidHex(String),
}

fn empty_digest() -> RawDigest {
    let hasher = Blake2b512::new();
    hasher.finalize().into()
}

/// Lexically resolves `target`, read as a symlink body sitting at `dir`,
/// against the filesystem root. Pure string manipulation: we never dereference
/// the link on disk, so this can't loop forever even if the target points at
/// an ancestor.
fn resolve_within_root(dir: &SlashPathBuf, target: &str) -> Option<SlashPathBuf> {
    let mut stack: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        dir.as_str().split('/').filter(|c| !c.is_empty()).collect()
    };
    for component in target.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                stack.pop()?;
            }
            other => stack.push(other),
        }
    }
    SlashPathBuf::parse(&stack.join("/")).ok()
}

/// Leaf content is hashed behind a domain-separation tag so a zero-byte file
/// never collides with [`empty_digest`] (a directory with no entries, which
/// hashes over zero bytes too).
fn hash_leaf_bytes(bytes: &[u8]) -> RawDigest {
    let mut hasher = Blake2b512::new();
    hasher.update([1u8]);
    hasher.update(bytes);
    hasher.finalize().into()
}

fn hash_entry(
    fs: &dyn ReadableFs,
    path: &SlashPathBuf,
    dir: &SlashPathBuf,
    kind: EntryKind,
) -> Result<RawDigest, HashError> {
    match kind {
        EntryKind::File => Ok(hash_leaf_bytes(&fs.read_file(path)?)),
        EntryKind::Symlink => {
            let target = fs.read_link(path)?;
            if resolve_within_root(dir, &target).is_none() {
                return Err(HashError::SymlinkEscapesRoot(path.as_str().to_owned()));
            }
            Ok(hash_leaf_bytes(target.as_bytes()))
        }
        EntryKind::Dir => hash_dir(fs, path),
        EntryKind::Other => unreachable!("Other entries are filtered before hashing"),
    }
}

fn hash_dir(fs: &dyn ReadableFs, dir: &SlashPathBuf) -> Result<RawDigest, HashError> {
    let mut entries = fs.read_dir(dir)?;
    entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

    let empty = empty_digest();
    let mut hasher = Blake2b512::new();
    for entry in entries {
        if entry.kind == EntryKind::Other {
            continue;
        }
        let child_suffix = SlashPathBuf::parse(&entry.name).map_err(FsError::from)?;
        let child_path = dir.join(&child_suffix);
        if fs.is_masked(&child_path) {
            continue;
        }
        let child_digest = hash_entry(fs, &child_path, dir, entry.kind)?;
        if child_digest == empty {
            continue;
        }
        hasher.update(entry.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(child_digest);
        hasher.update([0u8]);
    }
    Ok(hasher.finalize().into())
}

fn format_digest(digest: RawDigest) -> String {
    format!("{ALGORITHM_PREFIX}-{}", hex::encode(digest))
}

fn parse_digest(sum: &str) -> Result<RawDigest, HashError> {
    let hex_part = sum
        .strip_prefix(ALGORITHM_PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(|| HashError::UnrecognizedAlgorithm(sum.to_owned()))?;
    let bytes = hex::decode(hex_part).map_err(|_| HashError::InvalidHex(sum.to_owned()))?;
    bytes
        .try_into()
        .map_err(|_| HashError::InvalidHex(sum.to_owned()))
}

/// Computes the canonical hash of the whole subtree visible through `fs`.
pub fn hash(fs: &dyn ReadableFs) -> Result<String, HashError> {
    let digest = hash_dir(fs, &SlashPathBuf::root())?;
    Ok(format_digest(digest))
}

/// Recomputes the hash and compares it against `expected`, which must be in
/// the `"blake2b-<hex>"` form produced by [`hash`].
pub fn verify(fs: &dyn ReadableFs, expected: &str) -> Result<bool, HashError> {
    let want = parse_digest(expected)?;
    let got = hash_dir(fs, &SlashPathBuf::root())?;
    Ok(got == want)
}
