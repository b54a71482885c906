use anvil_fs::FsError;
use anvil_hash::HashError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitCmdError {
    #[error("git exited with status {0}: {1}")]
    NonZeroExit(i32, String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid repo spec: {0}")]
    InvalidSpec(String),
    #[error("unknown repo kind {0:?}")]
    UnknownKind(String),
    #[error("invalid cache: {0}")]
    InvalidCache(String),
    #[error("fetch requires network access but none is available")]
    NetworkRequired,
    #[error(transparent)]
    GitCmd(#[from] GitCmdError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
