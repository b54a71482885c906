use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{AbsoluteSystemPath, PathError, SlashPath};

/// An owned, absolute, host-native filesystem path.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AbsoluteSystemPathBuf(PathBuf);

impl AbsoluteSystemPathBuf {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PathError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(PathError::NotAbsolute(path));
        }
        Ok(Self(path))
    }

    /// Builds an absolute path without checking that it is actually
    /// absolute. Callers must have already validated the invariant (e.g.
    /// because the path came from `std::env::current_dir`).
    pub fn new_unchecked(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn as_absolute_path(&self) -> &AbsoluteSystemPath {
        AbsoluteSystemPath::new_unchecked(&self.0)
    }

    pub fn parent(&self) -> Option<Self> {
        self.0.parent().map(|p| Self(p.to_path_buf()))
    }

    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|s| s.to_str())
    }

    /// Joins a validated, `..`-free slash path onto this root. Because
    /// `SlashPath` cannot contain `..` components, the result is always
    /// contained within `self`.
    pub fn join_slash(&self, suffix: &SlashPath) -> Self {
        Self(self.0.join(crate::to_system(suffix.as_str())))
    }

    pub fn join_component(&self, component: &str) -> Self {
        Self(self.0.join(component))
    }
}

impl fmt::Display for AbsoluteSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

impl fmt::Debug for AbsoluteSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl AsRef<Path> for AbsoluteSystemPathBuf {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl TryFrom<&Path> for AbsoluteSystemPathBuf {
    type Error = PathError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        Self::new(path.to_path_buf())
    }
}
