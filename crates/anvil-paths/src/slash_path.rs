use std::fmt;

/// Borrowed view of a [`SlashPathBuf`](crate::SlashPathBuf).
#[repr(transparent)]
pub struct SlashPath(str);

impl SlashPath {
    pub(crate) fn new_unchecked(s: &str) -> &Self {
        // SAFETY: `SlashPath` is a `#[repr(transparent)]` wrapper around
        // `str`, so this reborrow is layout-compatible.
        unsafe { &*(s as *const str as *const SlashPath) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlashPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
