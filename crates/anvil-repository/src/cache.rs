//! The fetch cache (spec §4.3, component C): memoizes fetched filesystem
//! views per [`Spec`] and records the content hash each spec resolved to, so
//! a second `Get` for the same spec in the same run never re-fetches and
//! never silently returns content that hashes differently than before.
//! Kinds in the `local` set (e.g. `localdir`) skip integrity checking
//! entirely; everything else is verified against a caller-supplied pinned
//! checksum table, when one is given.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    sync::Mutex,
};

use anvil_context::Context;
use anvil_fs::ReadableFs;
use tracing::debug;

use crate::{errors::RepoError, fetch::Fetcher, spec::Spec};

struct Cached {
    fs: Arc<dyn ReadableFs>,
    sum: Option<String>,
}

/// Caches fetched repos by [`Spec::string`] and the content hash each one
/// resolved to. Concurrent access from multiple tasks is safe (the lock is
/// never held across an `.await`), but is not required by the spec; callers
/// needing to fetch N specs in parallel should do so themselves.
pub struct FetchCache {
    fetcher: Arc<dyn Fetcher>,
    local: HashSet<String>,
    checksums: HashMap<String, String>,
    entries: Mutex<HashMap<String, Cached>>,
}

impl FetchCache {
    /// No kinds are exempt from integrity checking and no checksums are
    /// pinned; every fetch is hashed and recorded but nothing is verified
    /// against a prior run.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_checksums(fetcher, HashSet::new(), HashMap::new())
    }

    /// `local` names the repo kinds exempt from integrity checking (spec
    /// §4.3) — typically `localdir`, whose content is already on disk rather
    /// than fetched over the network. `checksums` pins expected digests by
    /// [`Spec::string`]; a fetch for a key present in this table that doesn't
    /// verify fails with [`RepoError::InvalidCache`] instead of being cached.
    pub fn with_checksums(
        fetcher: Arc<dyn Fetcher>,
        local: HashSet<String>,
        checksums: HashMap<String, String>,
    ) -> Self {
        Self {
            fetcher,
            local,
            checksums,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the filesystem view for `spec`, fetching it on first request.
    /// Every subsequent `Get` for an equal spec returns the identical handle
    /// without touching the fetcher again.
    pub async fn get(&self, ctx: &Context, spec: &Spec) -> Result<Arc<dyn ReadableFs>, RepoError> {
        let key = spec.string();
        if let Some(cached) = self.entries.lock().unwrap().get(&key) {
            return Ok(cached.fs.clone());
        }

        let fs = self.fetcher.fetch(ctx, spec).await?;

        let sum = if self.local.contains(&spec.kind) {
            None
        } else if let Some(expected) = self.checksums.get(&key) {
            if !anvil_hash::verify(fs.as_ref(), expected)? {
                return Err(RepoError::InvalidCache(key));
            }
            Some(expected.clone())
        } else {
            Some(anvil_hash::hash(fs.as_ref())?)
        };

        let mut entries = self.entries.lock().unwrap();
        // Another task may have raced us to the same key; keep whichever
        // entry landed first so every caller observes one fetch per spec.
        let cached = entries.entry(key.clone()).or_insert_with(|| {
            debug!(spec = %key, sum = ?sum, "fetched and cached repo");
            Cached { fs, sum }
        });
        Ok(cached.fs.clone())
    }

    /// The content hash each previously-`Get`'d spec resolved to, keyed by
    /// [`Spec::string`]. Specs of a `local` kind have no entry here.
    pub fn sums(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(key, cached)| cached.sum.clone().map(|sum| (key.clone(), sum)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anvil_fs::LocalFs;
    use anvil_paths::AbsoluteSystemPathBuf;
    use async_trait::async_trait;

    use super::*;
    use crate::spec::SpecRegistry;

    struct CountingFetcher {
        root: AbsoluteSystemPathBuf,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, _ctx: &Context, _spec: &Spec) -> Result<Arc<dyn ReadableFs>, RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(LocalFs::new(self.root.clone())))
        }
    }

    #[tokio::test]
    async fn second_get_is_cached() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fetcher = Arc::new(CountingFetcher {
            root,
            calls: AtomicUsize::new(0),
        });
        let cache = FetchCache::new(fetcher.clone());
        let registry = SpecRegistry::new();
        let spec = registry.parse("localdir", br#"{"dir": "x"}"#).unwrap();
        let ctx = Context::background();

        cache.get(&ctx, &spec).await.unwrap();
        cache.get(&ctx, &spec).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sums_records_one_entry_per_spec() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fetcher = Arc::new(CountingFetcher {
            root,
            calls: AtomicUsize::new(0),
        });
        let cache = FetchCache::new(fetcher);
        let registry = SpecRegistry::new();
        let spec = registry.parse("localdir", br#"{"dir": "x"}"#).unwrap();
        let ctx = Context::background();

        cache.get(&ctx, &spec).await.unwrap();

        let sums = cache.sums();
        assert_eq!(sums.len(), 1);
        assert!(sums.contains_key(&spec.string()));
    }

    #[tokio::test]
    async fn local_kind_is_excluded_from_sums() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let fetcher = Arc::new(CountingFetcher {
            root,
            calls: AtomicUsize::new(0),
        });
        let cache = FetchCache::with_checksums(
            fetcher,
            HashSet::from(["localdir".to_owned()]),
            HashMap::new(),
        );
        let registry = SpecRegistry::new();
        let spec = registry.parse("localdir", br#"{"dir": "x"}"#).unwrap();
        let ctx = Context::background();

        cache.get(&ctx, &spec).await.unwrap();

        assert!(cache.sums().is_empty());
    }

    #[tokio::test]
    async fn matching_pinned_checksum_is_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let registry = SpecRegistry::new();
        let spec = registry.parse("localdir", br#"{"dir": "x"}"#).unwrap();

        let expected = anvil_hash::hash(&LocalFs::new(root.clone())).unwrap();
        let fetcher = Arc::new(CountingFetcher {
            root,
            calls: AtomicUsize::new(0),
        });
        let cache = FetchCache::with_checksums(
            fetcher,
            HashSet::new(),
            HashMap::from([(spec.string(), expected.clone())]),
        );
        let ctx = Context::background();

        cache.get(&ctx, &spec).await.unwrap();

        assert_eq!(cache.sums().get(&spec.string()), Some(&expected));
    }

    #[tokio::test]
    async fn mismatched_pinned_checksum_is_invalid_cache() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        let root = AbsoluteSystemPathBuf::new(tmp.path().to_path_buf()).unwrap();
        let registry = SpecRegistry::new();
        let spec = registry.parse("localdir", br#"{"dir": "x"}"#).unwrap();

        let fetcher = Arc::new(CountingFetcher {
            root,
            calls: AtomicUsize::new(0),
        });
        let wrong = format!("blake2b-{}", "0".repeat(128));
        let cache = FetchCache::with_checksums(
            fetcher,
            HashSet::new(),
            HashMap::from([(spec.string(), wrong)]),
        );
        let ctx = Context::background();

        let err = cache.get(&ctx, &spec).await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidCache(_)));
    }
}
