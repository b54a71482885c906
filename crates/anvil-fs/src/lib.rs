//! Read-only filesystem views over a fetched repo subtree.
//!
//! [`ReadableFs`] is the trait the Merkle hasher (`anvil-hash`), the config
//! engine importer (`anvil-jsonnet`), and the component resolver
//! (`anvil-component`) all traverse. A view is either [`LocalFs`], rooted at
//! a real directory with an optional mask predicate applied to every path
//! measured from that root, or [`SubFs`], a deeper view into another
//! `ReadableFs` without re-rooting the mask.
#![deny(clippy::all)]

use std::{io, sync::Arc};

use anvil_paths::{AbsoluteSystemPathBuf, SlashPathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error(transparent)]
    Path(#[from] anvil_paths::PathError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0} is not a directory")]
    NotADirectory(String),
    #[error("symlink at {0} resolves outside the filesystem root")]
    LinkEscapesRoot(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Symlink,
    Dir,
    Other,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
}

/// A read-only, rooted view of a filesystem subtree.
///
/// Implementations MUST enumerate `read_dir` entries and resolve them
/// deterministically; callers (notably the Merkle hasher) re-sort by name
/// themselves and must not rely on traversal order.
pub trait ReadableFs: Send + Sync {
    fn read_dir(&self, dir: &SlashPathBuf) -> Result<Vec<Entry>, FsError>;
    fn read_file(&self, path: &SlashPathBuf) -> Result<Vec<u8>, FsError>;
    fn read_link(&self, path: &SlashPathBuf) -> Result<String, FsError>;
    fn entry_kind(&self, path: &SlashPathBuf) -> Result<EntryKind, FsError>;

    /// True if `path`, measured from this view's own root, is excluded from
    /// traversal (e.g. `.git/`). Masking is a property of the root, so
    /// [`SubFs`] forwards to the same predicate with the full path.
    fn is_masked(&self, _path: &SlashPathBuf) -> bool {
        false
    }
}

/// A predicate over a path measured from the filesystem root, `true` meaning
/// "excluded from traversal".
pub type MaskFn = Arc<dyn Fn(&SlashPathBuf) -> bool + Send + Sync>;

/// Rejects `.git` at the root and anything under it. This is the mask the
/// git fetcher (component B) applies to its clones.
pub fn git_mask() -> MaskFn {
    Arc::new(|path: &SlashPathBuf| {
        let s = path.as_str();
        s == ".git" || s.starts_with(".git/")
    })
}

/// A filesystem view rooted at a real directory on disk.
pub struct LocalFs {
    root: AbsoluteSystemPathBuf,
    mask: Option<MaskFn>,
}

impl LocalFs {
    pub fn new(root: AbsoluteSystemPathBuf) -> Self {
        Self { root, mask: None }
    }

    pub fn with_mask(root: AbsoluteSystemPathBuf, mask: MaskFn) -> Self {
        Self {
            root,
            mask: Some(mask),
        }
    }

    pub fn root(&self) -> &AbsoluteSystemPathBuf {
        &self.root
    }
}

impl ReadableFs for LocalFs {
    fn read_dir(&self, dir: &SlashPathBuf) -> Result<Vec<Entry>, FsError> {
        let abs = self.root.join_slash(dir.as_slash_path());
        let read_dir = match fs_err::read_dir(abs.as_path()) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry
                .file_name()
                .into_string()
                .map_err(|_| anvil_paths::PathError::NonUtf8)?;
            let file_type = entry.file_type()?;
            let kind = if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            entries.push(Entry { name, kind });
        }
        Ok(entries)
    }

    fn read_file(&self, path: &SlashPathBuf) -> Result<Vec<u8>, FsError> {
        let abs = self.root.join_slash(path.as_slash_path());
        Ok(fs_err::read(abs.as_path())?)
    }

    fn read_link(&self, path: &SlashPathBuf) -> Result<String, FsError> {
        let abs = self.root.join_slash(path.as_slash_path());
        let target = fs_err::read_link(abs.as_path())?;
        target
            .to_str()
            .map(str::to_owned)
            .ok_or(FsError::Path(anvil_paths::PathError::NonUtf8))
    }

    fn entry_kind(&self, path: &SlashPathBuf) -> Result<EntryKind, FsError> {
        let abs = self.root.join_slash(path.as_slash_path());
        let metadata = fs_err::symlink_metadata(abs.as_path())?;
        Ok(if metadata.is_dir() {
            EntryKind::Dir
        } else if metadata.file_type().is_symlink() {
            EntryKind::Symlink
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        })
    }

    fn is_masked(&self, path: &SlashPathBuf) -> bool {
        self.mask.as_ref().is_some_and(|m| m(path))
    }
}

/// A view into `dir` of some other [`ReadableFs`], without re-rooting
/// masking: a `.git/` mask set on the parent still applies, expressed in
/// terms of the parent's own root.
pub struct SubFs<F> {
    inner: Arc<F>,
    prefix: SlashPathBuf,
}

impl<F: ReadableFs> SubFs<F> {
    pub fn new(inner: Arc<F>, prefix: SlashPathBuf) -> Self {
        Self { inner, prefix }
    }

    fn full(&self, path: &SlashPathBuf) -> SlashPathBuf {
        self.prefix.join(path)
    }
}

impl<F: ReadableFs> ReadableFs for SubFs<F> {
    fn read_dir(&self, dir: &SlashPathBuf) -> Result<Vec<Entry>, FsError> {
        self.inner.read_dir(&self.full(dir))
    }

    fn read_file(&self, path: &SlashPathBuf) -> Result<Vec<u8>, FsError> {
        self.inner.read_file(&self.full(path))
    }

    fn read_link(&self, path: &SlashPathBuf) -> Result<String, FsError> {
        self.inner.read_link(&self.full(path))
    }

    fn entry_kind(&self, path: &SlashPathBuf) -> Result<EntryKind, FsError> {
        self.inner.entry_kind(&self.full(path))
    }

    fn is_masked(&self, path: &SlashPathBuf) -> bool {
        self.inner.is_masked(&self.full(path))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_tree(root: &std::path::Path) {
        fs::create_dir_all(root.join("foobar")).unwrap();
        fs::write(root.join("foo.txt"), b"foo").unwrap();
        fs::write(root.join("foobar/bar.txt"), b"bar").unwrap();
    }

    #[test]
    fn local_fs_reads_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path());
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fs_view = LocalFs::new(root);

        let contents = fs_view
            .read_file(&SlashPathBuf::parse("foo.txt").unwrap())
            .unwrap();
        assert_eq!(contents, b"foo");

        let entries = fs_view.read_dir(&SlashPathBuf::root()).unwrap();
        let mut names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["foo.txt", "foobar"]);
    }

    #[test]
    fn git_mask_excludes_dotgit() {
        let mask = git_mask();
        assert!(mask(&SlashPathBuf::parse(".git").unwrap()));
        assert!(mask(&SlashPathBuf::parse(".git/HEAD").unwrap()));
        assert!(!mask(&SlashPathBuf::parse("src/main.rs").unwrap()));
    }

    #[test]
    fn sub_fs_reroots_but_keeps_mask() {
        let tmp = tempfile::tempdir().unwrap();
        write_tree(tmp.path());
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let local = Arc::new(LocalFs::with_mask(root, git_mask()));
        let sub = SubFs::new(local, SlashPathBuf::parse("foobar").unwrap());

        let contents = sub
            .read_file(&SlashPathBuf::parse("bar.txt").unwrap())
            .unwrap();
        assert_eq!(contents, b"bar");
        assert!(sub.is_masked(&SlashPathBuf::parse(".git").unwrap()));
    }
}
