//! Dispatches a repo [`Spec`] to the fetcher registered for its kind (spec
//! §4.2). Neither built-in fetcher inspects `spec.kind` itself — each just
//! downcasts straight to its own spec shape — so a CLI invocation that may
//! see both a `localdir` root and `git` children needs something in front of
//! them that picks the right one first.

use std::sync::Arc;

use anvil_context::Context;
use anvil_fs::ReadableFs;
use anvil_repository::{Fetcher, GitFetcher, LocalDirFetcher, RepoError, Spec};
use async_trait::async_trait;

pub struct DispatchFetcher {
    local: LocalDirFetcher,
    git: GitFetcher,
}

impl DispatchFetcher {
    pub fn new(local: LocalDirFetcher, git: GitFetcher) -> Self {
        Self { local, git }
    }
}

#[async_trait]
impl Fetcher for DispatchFetcher {
    async fn fetch(&self, ctx: &Context, spec: &Spec) -> Result<Arc<dyn ReadableFs>, RepoError> {
        match spec.kind.as_str() {
            "git" => self.git.fetch(ctx, spec).await,
            _ => self.local.fetch(ctx, spec).await,
        }
    }
}
