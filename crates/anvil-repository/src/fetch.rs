//! Repo fetchers (spec §4.2, component B): resolve a [`Spec`] to a read-only
//! filesystem view.

use std::sync::Arc;

use anvil_context::Context;
use anvil_fs::{git_mask, LocalFs, ReadableFs};
use anvil_paths::AbsoluteSystemPathBuf;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    errors::{GitCmdError, RepoError},
    spec::{GitSpec, LocalDirSpec, Spec},
};

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, ctx: &Context, spec: &Spec) -> Result<Arc<dyn ReadableFs>, RepoError>;
}

/// `Fetch` for `localdir`: never touches the network and always succeeds if
/// the directory exists.
pub struct LocalDirFetcher {
    base_dir: AbsoluteSystemPathBuf,
}

impl LocalDirFetcher {
    pub fn new(base_dir: AbsoluteSystemPathBuf) -> Self {
        Self { base_dir }
    }
}

#[async_trait]
impl Fetcher for LocalDirFetcher {
    async fn fetch(&self, _ctx: &Context, spec: &Spec) -> Result<Arc<dyn ReadableFs>, RepoError> {
        let local = spec.downcast::<LocalDirSpec>()?;
        let dir = anvil_paths::SlashPathBuf::parse(&local.dir)
            .map_err(|e| RepoError::InvalidSpec(e.to_string()))?;
        let root = self.base_dir.join_slash(dir.as_slash_path());
        if !root.as_path().is_dir() {
            return Err(RepoError::InvalidCache(format!(
                "localdir root {} does not exist",
                root
            )));
        }
        Ok(Arc::new(LocalFs::new(root)))
    }
}

/// Capability boundary around the `git` binary, so the clone/switch state
/// machine can be driven against a mock in tests (spec §4.2).
#[async_trait]
pub trait GitCmd: Send + Sync {
    async fn clone_tag_shallow(
        &self,
        ctx: &Context,
        repo: &str,
        tag: &str,
        dest: &AbsoluteSystemPathBuf,
    ) -> Result<(), GitCmdError>;

    async fn clone_branch_no_checkout(
        &self,
        ctx: &Context,
        repo: &str,
        branch: &str,
        dest: &AbsoluteSystemPathBuf,
        shallow_since: Option<&str>,
    ) -> Result<(), GitCmdError>;

    async fn switch_detach(
        &self,
        ctx: &Context,
        dest: &AbsoluteSystemPathBuf,
        commit: &str,
    ) -> Result<(), GitCmdError>;
}

/// Shells out to the system `git` binary.
pub struct SystemGitCmd;

#[async_trait]
impl GitCmd for SystemGitCmd {
    async fn clone_tag_shallow(
        &self,
        ctx: &Context,
        repo: &str,
        tag: &str,
        dest: &AbsoluteSystemPathBuf,
    ) -> Result<(), GitCmdError> {
        run_git(
            ctx,
            None,
            [
                "clone",
                "--single-branch",
                "--branch",
                tag,
                "--depth",
                "1",
                repo,
                &dest.to_string(),
            ],
        )
        .await
    }

    async fn clone_branch_no_checkout(
        &self,
        ctx: &Context,
        repo: &str,
        branch: &str,
        dest: &AbsoluteSystemPathBuf,
        shallow_since: Option<&str>,
    ) -> Result<(), GitCmdError> {
        let mut args = vec![
            "clone".to_owned(),
            "--single-branch".to_owned(),
            "--branch".to_owned(),
            branch.to_owned(),
            "--no-checkout".to_owned(),
        ];
        if let Some(since) = shallow_since {
            args.push("--shallow-since".to_owned());
            args.push(since.to_owned());
        }
        args.push(repo.to_owned());
        args.push(dest.to_string());
        run_git(ctx, None, args).await
    }

    async fn switch_detach(
        &self,
        ctx: &Context,
        dest: &AbsoluteSystemPathBuf,
        commit: &str,
    ) -> Result<(), GitCmdError> {
        run_git(ctx, Some(dest), ["switch", "--detach", commit]).await
    }
}

async fn run_git<I, S>(ctx: &Context, cwd: Option<&AbsoluteSystemPathBuf>, args: I) -> Result<(), GitCmdError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = tokio::process::Command::new("git");
    cmd.args(args);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd.as_path());
    }
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn()?;
    let status = ctx
        .race(child.wait())
        .await
        .map_err(|_| GitCmdError::Cancelled)??;
    if !status.success() {
        return Err(GitCmdError::NonZeroExit(
            status.code().unwrap_or(-1),
            format!("{cmd:?}"),
        ));
    }
    Ok(())
}

/// `Fetch` for `git`: clones or reuses a single cached checkout per pinned
/// spec (spec §4.2 state machine).
pub struct GitFetcher {
    cache_root: AbsoluteSystemPathBuf,
    no_network: bool,
    force_fetch: bool,
    git_cmd: Arc<dyn GitCmd>,
}

impl GitFetcher {
    pub fn new(
        cache_root: AbsoluteSystemPathBuf,
        no_network: bool,
        force_fetch: bool,
        git_cmd: Arc<dyn GitCmd>,
    ) -> Self {
        Self {
            cache_root,
            no_network,
            force_fetch,
            git_cmd,
        }
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn fetch(&self, ctx: &Context, spec: &Spec) -> Result<Arc<dyn ReadableFs>, RepoError> {
        let git_spec = spec.downcast::<GitSpec>()?;
        let repodir = self.cache_root.join_component(&spec.value.key());

        let cloned = match repodir.as_path().symlink_metadata() {
            Ok(meta) if meta.is_dir() => true,
            Ok(_non_dir) => {
                return Err(RepoError::InvalidCache(format!(
                    "{repodir} exists and is not a directory"
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let need_clone = match (cloned, self.force_fetch) {
            (true, false) => false,
            (true, true) => {
                debug!(path = %repodir, "force-fetch: removing cached clone");
                std::fs::remove_dir_all(repodir.as_path())?;
                true
            }
            (false, _) => true,
        };

        if need_clone {
            if self.no_network {
                return Err(RepoError::NetworkRequired);
            }
            info!(repo = %git_spec.repo, key = %spec.value.key(), "cloning git repo");
            if let Some(tag) = &git_spec.tag {
                self.git_cmd
                    .clone_tag_shallow(ctx, &git_spec.repo, tag, &repodir)
                    .await?;
            } else {
                let branch = git_spec
                    .branch
                    .as_deref()
                    .expect("GitParser guarantees branch is set when tag is absent");
                let commit = git_spec
                    .commit
                    .as_deref()
                    .expect("GitParser guarantees commit is set when tag is absent");
                self.git_cmd
                    .clone_branch_no_checkout(
                        ctx,
                        &git_spec.repo,
                        branch,
                        &repodir,
                        git_spec.shallow_since.as_deref(),
                    )
                    .await?;
                self.git_cmd.switch_detach(ctx, &repodir, commit).await?;
            }
        }

        Ok(Arc::new(LocalFs::with_mask(repodir, git_mask())))
    }
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Records invocations and fakes a clone by creating the destination
    /// directory, so fetch-cache tests can exercise §4.2's state machine
    /// without a network.
    #[derive(Default)]
    pub struct MockGitCmd {
        pub calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GitCmd for MockGitCmd {
        async fn clone_tag_shallow(
            &self,
            _ctx: &Context,
            repo: &str,
            tag: &str,
            dest: &AbsoluteSystemPathBuf,
        ) -> Result<(), GitCmdError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("clone-tag {repo} {tag}"));
            std::fs::create_dir_all(dest.as_path())?;
            Ok(())
        }

        async fn clone_branch_no_checkout(
            &self,
            _ctx: &Context,
            repo: &str,
            branch: &str,
            dest: &AbsoluteSystemPathBuf,
            _shallow_since: Option<&str>,
        ) -> Result<(), GitCmdError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("clone-branch {repo} {branch}"));
            std::fs::create_dir_all(dest.as_path())?;
            Ok(())
        }

        async fn switch_detach(
            &self,
            _ctx: &Context,
            dest: &AbsoluteSystemPathBuf,
            commit: &str,
        ) -> Result<(), GitCmdError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("switch {dest} {commit}"));
            Ok(())
        }
    }
}
