//! The `RepoSpec` / `Spec` data model (spec §3): a polymorphic value tagged
//! by a kind string, with a canonical key deterministic in its identifying
//! fields. New kinds are added by registering a parser, not by extending an
//! enum — see [`SpecRegistry`].

use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use serde::Deserialize;

use crate::errors::RepoError;

/// The identifying fields of one repo-spec variant, plus its canonical key.
pub trait RepoSpecValue: fmt::Debug + Send + Sync {
    /// Deterministic in the identifying fields; stable across runs.
    fn key(&self) -> String;
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalDirSpec {
    pub dir: String,
}

impl RepoSpecValue for LocalDirSpec {
    fn key(&self) -> String {
        self.dir.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitSpec {
    pub repo: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub shallow_since: Option<String>,
}

impl RepoSpecValue for GitSpec {
    fn key(&self) -> String {
        let repo = urlencoding::encode(&self.repo);
        let suffix = match (&self.tag, &self.branch, &self.commit) {
            (Some(tag), None, None) => urlencoding::encode(tag).into_owned(),
            (None, Some(branch), Some(commit)) => {
                format!(
                    "{}-{}",
                    urlencoding::encode(branch),
                    urlencoding::encode(commit)
                )
            }
            _ => unreachable!("GitParser rejects any other combination before a GitSpec exists"),
        };
        format!("{repo}@{suffix}")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `(Kind, RepoSpec)`. Printable as `urlencode(Kind) ":" RepoSpec.key()`.
#[derive(Clone, Debug)]
pub struct Spec {
    pub kind: String,
    pub value: Arc<dyn RepoSpecValue>,
}

impl Spec {
    pub fn new(kind: impl Into<String>, value: Arc<dyn RepoSpecValue>) -> Self {
        Self {
            kind: kind.into(),
            value,
        }
    }

    /// The cache/checksum key: `urlencode(kind) ":" value.key()`.
    pub fn string(&self) -> String {
        format!("{}:{}", urlencoding::encode(&self.kind), self.value.key())
    }

    pub fn downcast<T: RepoSpecValue + 'static>(&self) -> Result<&T, RepoError> {
        self.value
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| RepoError::InvalidSpec(format!("spec kind {:?} has unexpected shape", self.kind)))
    }
}

pub trait SpecParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Arc<dyn RepoSpecValue>, RepoError>;
}

pub struct LocalDirParser;

impl SpecParser for LocalDirParser {
    fn parse(&self, bytes: &[u8]) -> Result<Arc<dyn RepoSpecValue>, RepoError> {
        let raw: LocalDirSpec = serde_json::from_slice(bytes)
            .map_err(|e| RepoError::InvalidSpec(format!("localdir: {e}")))?;
        // "the path must equal its cleaned form": reject anything our
        // slash-path validator wouldn't round-trip unchanged.
        let cleaned = anvil_paths::SlashPathBuf::parse(&raw.dir)
            .map_err(|e| RepoError::InvalidSpec(format!("localdir.dir: {e}")))?;
        if cleaned.as_str() != raw.dir {
            return Err(RepoError::InvalidSpec(
                "localdir.dir is not in canonical form".into(),
            ));
        }
        Ok(Arc::new(raw))
    }
}

pub struct GitParser;

impl SpecParser for GitParser {
    fn parse(&self, bytes: &[u8]) -> Result<Arc<dyn RepoSpecValue>, RepoError> {
        let raw: GitSpec = serde_json::from_slice(bytes)
            .map_err(|e| RepoError::InvalidSpec(format!("git: {e}")))?;
        let has_tag = raw.tag.is_some();
        let has_branch_commit = raw.branch.is_some() && raw.commit.is_some();
        let tag_conflicts_with_branch_commit =
            has_tag && (raw.branch.is_some() || raw.commit.is_some());
        if has_tag == has_branch_commit || tag_conflicts_with_branch_commit {
            return Err(RepoError::InvalidSpec(
                "exactly one of `tag` or (`branch` and `commit`) must be set".into(),
            ));
        }
        Ok(Arc::new(raw))
    }
}

/// `kind string -> Parser`. New repo kinds register a parser here rather
/// than extending a closed enum (design note, §9).
pub struct SpecRegistry {
    parsers: HashMap<String, Arc<dyn SpecParser>>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        let mut parsers: HashMap<String, Arc<dyn SpecParser>> = HashMap::new();
        parsers.insert("localdir".to_owned(), Arc::new(LocalDirParser));
        parsers.insert("git".to_owned(), Arc::new(GitParser));
        Self { parsers }
    }

    pub fn register(&mut self, kind: impl Into<String>, parser: Arc<dyn SpecParser>) {
        self.parsers.insert(kind.into(), parser);
    }

    pub fn parse(&self, kind: &str, bytes: &[u8]) -> Result<Spec, RepoError> {
        let parser = self
            .parsers
            .get(kind)
            .ok_or_else(|| RepoError::UnknownKind(kind.to_owned()))?;
        Ok(Spec::new(kind, parser.parse(bytes)?))
    }
}

impl Default for SpecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
