use std::fmt;

use crate::{PathError, SlashPath};

/// An owned, validated, slash-separated relative path: non-absolute, no `..`
/// or empty components. This is the shape every path inside a component
/// manifest, engine import, or template output must take (spec §3, §4.5,
/// §4.6).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SlashPathBuf(String);

impl SlashPathBuf {
    /// Parses and validates `s`. Rejects absolute paths, `..` components,
    /// and empty components (e.g. `a//b`, `/a`, `a/../b`).
    pub fn parse(s: &str) -> Result<Self, PathError> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        if s.starts_with('/') {
            return Err(PathError::NotRelative(s.to_owned()));
        }
        for component in s.split('/') {
            if component.is_empty() {
                return Err(PathError::EmptyComponent(s.to_owned()));
            }
            if component == ".." {
                return Err(PathError::Escapes(s.to_owned()));
            }
        }
        Ok(Self(s.to_owned()))
    }

    /// Like [`parse`](Self::parse), but silently drops `.` components, which
    /// are harmless rather than a path-escape hazard.
    pub fn parse_cleaning(s: &str) -> Result<Self, PathError> {
        let cleaned: Vec<&str> = s.split('/').filter(|c| *c != ".").collect();
        Self::parse(&cleaned.join("/"))
    }

    pub fn as_slash_path(&self) -> &SlashPath {
        SlashPath::new_unchecked(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn root() -> Self {
        Self(String::new())
    }

    /// Joins `suffix` onto `self`. Both sides are already validated, so the
    /// join can never escape; the only work is avoiding a spurious leading
    /// slash when `self` is the root.
    pub fn join(&self, suffix: &SlashPathBuf) -> Self {
        if self.is_root() {
            suffix.clone()
        } else if suffix.is_root() {
            self.clone()
        } else {
            Self(format!("{}/{}", self.0, suffix.0))
        }
    }
}

impl fmt::Display for SlashPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SlashPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl AsRef<str> for SlashPathBuf {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("/a/b" ; "absolute")]
    #[test_case("/" ; "bare slash")]
    fn rejects_not_relative(input: &str) {
        assert!(matches!(
            SlashPathBuf::parse(input),
            Err(PathError::NotRelative(_))
        ));
    }

    #[test_case("a/../b" ; "interior dotdot")]
    #[test_case(".." ; "bare dotdot")]
    fn rejects_dotdot(input: &str) {
        assert!(matches!(
            SlashPathBuf::parse(input),
            Err(PathError::Escapes(_))
        ));
    }

    #[test_case("a//b" ; "interior double slash")]
    #[test_case("a/b/" ; "trailing slash")]
    fn rejects_empty_component(input: &str) {
        assert!(matches!(
            SlashPathBuf::parse(input),
            Err(PathError::EmptyComponent(_))
        ));
    }

    #[test]
    fn empty_string_parses_as_root() {
        let p = SlashPathBuf::parse("").unwrap();
        assert!(p.is_root());
    }

    #[test]
    fn accepts_plain_relative() {
        let p = SlashPathBuf::parse("anvil_out/foo.txt").unwrap();
        assert_eq!(p.as_str(), "anvil_out/foo.txt");
    }

    #[test]
    fn join_handles_root() {
        let root = SlashPathBuf::root();
        let a = SlashPathBuf::parse("a/b").unwrap();
        assert_eq!(root.join(&a).as_str(), "a/b");
        assert_eq!(a.join(&root).as_str(), "a/b");
    }

    #[test]
    fn cleaning_drops_dot_components() {
        let p = SlashPathBuf::parse_cleaning("./a/./b").unwrap();
        assert_eq!(p.as_str(), "a/b");
    }
}
