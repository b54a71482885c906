//! Config-engine registry and cache (spec §4.4, component D): builds a
//! [`ConfigEngineInstance`] for a given `(engine-kind, repo spec, dir)` and
//! guarantees at most one build per cache key for the lifetime of the
//! process.

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use anvil_context::Context;
use anvil_fs::{ReadableFs, SubFs};
use anvil_paths::SlashPathBuf;
use anvil_repository::{FetchCache, RepoError, Spec};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid dir {0:?}: {1}")]
    InvalidDir(String, anvil_paths::PathError),
    #[error("unknown engine kind {0:?}")]
    UnknownEngineKind(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("engine build failed: {0}")]
    Build(String),
}

/// An evaluator bound to one sub-filesystem. Produced by a [`Builder`] and
/// cached for reuse across every component that resolves to the same
/// `(kind, spec, dir)`.
///
/// `exec` is intentionally synchronous: the reference Jsonnet-like engine
/// (component F) runs a synchronous evaluator, so the asynchronous boundary
/// in this design sits at engine *construction* (which must fetch a repo),
/// not at evaluation.
pub trait ConfigEngineInstance: Send + Sync {
    fn exec(
        &self,
        ctx: &Context,
        path: &SlashPathBuf,
        args: &serde_json::Value,
    ) -> Result<Vec<u8>, EngineError>;
}

#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(
        &self,
        fs: Arc<dyn ReadableFs>,
    ) -> Result<Arc<dyn ConfigEngineInstance>, EngineError>;
}

/// `engine-kind string -> Builder`. New engine kinds register a builder here
/// rather than extending a closed enum (same shape as
/// `anvil_repository::SpecRegistry`).
#[derive(Default)]
pub struct EngineRegistry {
    builders: HashMap<String, Arc<dyn Builder>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, builder: Arc<dyn Builder>) {
        self.builders.insert(kind.into(), builder);
    }

    fn get(&self, kind: &str) -> Option<Arc<dyn Builder>> {
        self.builders.get(kind).cloned()
    }
}

/// Memoizes engine instances by `urlencode(kind) ":" repoKey ":" dir` (spec
/// §4.4). Concurrent access is not required by the spec; the lock here is
/// never held across an `.await`, matching [`FetchCache`]'s own pattern.
pub struct EngineCache {
    registry: EngineRegistry,
    fetch_cache: Arc<FetchCache>,
    instances: Mutex<HashMap<String, Arc<dyn ConfigEngineInstance>>>,
}

impl EngineCache {
    pub fn new(registry: EngineRegistry, fetch_cache: Arc<FetchCache>) -> Self {
        Self {
            registry,
            fetch_cache,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(
        &self,
        ctx: &Context,
        engine_kind: &str,
        spec: &Spec,
        dir: &str,
    ) -> Result<Arc<dyn ConfigEngineInstance>, EngineError> {
        let dir = SlashPathBuf::parse(dir)
            .map_err(|e| EngineError::InvalidDir(dir.to_owned(), e))?;
        let cache_key = format!(
            "{}:{}:{}",
            urlencoding::encode(engine_kind),
            spec.string(),
            dir.as_str()
        );

        if let Some(cached) = self.instances.lock().unwrap().get(&cache_key) {
            return Ok(cached.clone());
        }

        let builder = self
            .registry
            .get(engine_kind)
            .ok_or_else(|| EngineError::UnknownEngineKind(engine_kind.to_owned()))?;

        let repo_fs = self.fetch_cache.get(ctx, spec).await?;
        let sub_fs: Arc<dyn ReadableFs> = Arc::new(SubFs::new(repo_fs, dir));
        let instance = builder.build(sub_fs).await?;

        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .entry(cache_key.clone())
            .or_insert_with(|| {
                debug!(cache_key = %cache_key, "built config engine instance");
                instance
            })
            .clone();
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anvil_paths::AbsoluteSystemPathBuf;
    use anvil_repository::{LocalDirFetcher, SpecRegistry};

    use super::*;

    struct EchoEngine;

    impl ConfigEngineInstance for EchoEngine {
        fn exec(
            &self,
            _ctx: &Context,
            path: &SlashPathBuf,
            _args: &serde_json::Value,
        ) -> Result<Vec<u8>, EngineError> {
            Ok(path.as_str().as_bytes().to_vec())
        }
    }

    struct CountingBuilder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Builder for CountingBuilder {
        async fn build(
            &self,
            _fs: Arc<dyn ReadableFs>,
        ) -> Result<Arc<dyn ConfigEngineInstance>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoEngine))
        }
    }

    fn setup() -> (tempfile::TempDir, Arc<FetchCache>, anvil_repository::Spec) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("components")).unwrap();
        let base = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fetcher = Arc::new(LocalDirFetcher::new(base));
        let fetch_cache = Arc::new(FetchCache::new(fetcher));
        let registry = SpecRegistry::new();
        let spec = registry
            .parse("localdir", br#"{"dir": "components"}"#)
            .unwrap();
        (tmp, fetch_cache, spec)
    }

    #[tokio::test]
    async fn same_key_builds_once() {
        let (_tmp, fetch_cache, spec) = setup();
        let builder = Arc::new(CountingBuilder {
            calls: AtomicUsize::new(0),
        });
        let mut registry = EngineRegistry::new();
        registry.register("echo", builder.clone());
        let cache = EngineCache::new(registry, fetch_cache);
        let ctx = Context::background();

        cache.get(&ctx, "echo", &spec, "").await.unwrap();
        cache.get(&ctx, "echo", &spec, "").await.unwrap();

        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_kind_is_an_error() {
        let (_tmp, fetch_cache, spec) = setup();
        let registry = EngineRegistry::new();
        let cache = EngineCache::new(registry, fetch_cache);
        let ctx = Context::background();

        let err = cache.get(&ctx, "nope", &spec, "").await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownEngineKind(_)));
    }

    #[tokio::test]
    async fn rejects_dir_with_dotdot() {
        let (_tmp, fetch_cache, spec) = setup();
        let registry = EngineRegistry::new();
        let cache = EngineCache::new(registry, fetch_cache);
        let ctx = Context::background();

        let err = cache.get(&ctx, "echo", &spec, "../escape").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidDir(_, _)));
    }
}
