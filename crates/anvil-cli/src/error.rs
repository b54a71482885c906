//! The composed top-level error type (spec §7, §9): each component defines
//! its own `thiserror` enum, and this one wraps each as a transparent
//! variant so `main` reports a single coherent chain and exit code.

use thiserror::Error;

use crate::settings::SettingsError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Repo(#[from] anvil_repository::RepoError),
    #[error(transparent)]
    Engine(#[from] anvil_engine::EngineError),
    #[error(transparent)]
    Component(#[from] anvil_component::ComponentError),
    #[error(transparent)]
    Output(#[from] anvil_output::OutputError),
    #[error(transparent)]
    Hash(#[from] anvil_hash::HashError),
    #[error(transparent)]
    Workflow(#[from] anvil_workflow::WorkflowError),
    #[error(transparent)]
    Path(#[from] anvil_paths::PathError),
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
