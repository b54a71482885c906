//! Repo fetchers and the integrity-checked fetch cache (spec components B
//! and C): resolving a [`Spec`] to a [`anvil_fs::ReadableFs`] view, either
//! from a local directory or a pinned git checkout, and memoizing that
//! resolution per run.

mod cache;
mod errors;
mod fetch;
mod spec;

pub use cache::FetchCache;
pub use errors::{GitCmdError, RepoError};
pub use fetch::{Fetcher, GitCmd, GitFetcher, LocalDirFetcher, SystemGitCmd};
pub use spec::{GitSpec, LocalDirParser, LocalDirSpec, RepoSpecValue, Spec, SpecParser, SpecRegistry};
