use std::path::Path;

/// Borrowed view of an [`AbsoluteSystemPathBuf`](crate::AbsoluteSystemPathBuf).
#[repr(transparent)]
pub struct AbsoluteSystemPath(Path);

impl AbsoluteSystemPath {
    pub(crate) fn new_unchecked(path: &Path) -> &Self {
        // SAFETY: `AbsoluteSystemPath` is a `#[repr(transparent)]` wrapper
        // around `Path`, so this reborrow is layout-compatible.
        unsafe { &*(path as *const Path as *const AbsoluteSystemPath) }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for AbsoluteSystemPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}
