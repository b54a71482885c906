//! Path newtypes used across anvil.
//!
//! Two families are provided: [`AbsoluteSystemPathBuf`] for filesystem roots
//! and locations on disk, and [`SlashPathBuf`] for the slash-separated,
//! `..`-free paths that appear inside component manifests, template output
//! destinations, and engine import strings. Keeping the two distinct makes it
//! a type error to pass an unvalidated manifest path straight to `std::fs`.

mod absolute_system_path;
mod absolute_system_path_buf;
mod slash_path;
mod slash_path_buf;

pub use absolute_system_path::AbsoluteSystemPath;
pub use absolute_system_path_buf::AbsoluteSystemPathBuf;
pub use slash_path::SlashPath;
pub use slash_path_buf::SlashPathBuf;

use std::path::PathBuf;

use path_slash::{PathBufExt, PathExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path is not valid UTF-8")]
    NonUtf8,
    #[error("path {0:?} is not absolute")]
    NotAbsolute(PathBuf),
    #[error("path {0:?} is absolute, expected a relative slash path")]
    NotRelative(String),
    #[error("path {0:?} escapes its root via `..`")]
    Escapes(String),
    #[error("path {0:?} contains an empty component")]
    EmptyComponent(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub(crate) fn to_system(slash_path: &str) -> PathBuf {
    PathBuf::from_slash(slash_path)
}

pub(crate) fn to_slash(path: &std::path::Path) -> Result<String, PathError> {
    path.to_slash().map(|s| s.into_owned()).ok_or(PathError::NonUtf8)
}
