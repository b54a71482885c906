//! Deterministic workflow execution (spec components H and I): a durable
//! event log that lets a retried attempt replay everything a previous
//! attempt already did, and a Starlark-based script interpreter that can
//! only touch the outside world through the activity boundary the log
//! replays against.
#![deny(clippy::all)]

mod activity;
mod builtins;
mod engine;
mod events;
mod retry;

pub use activity::{exec_activity, Activity, ActivityError, WorkflowError};
pub use builtins::{
    render_gotmpl, FsActivities, FsReadActivity, FsWriteActivity, HttpGetActivity,
    HttpPostActivity, RandomHexActivity, Sha256HexActivity, TmplRenderActivity, VaultClient,
    VaultReadActivity, VaultWriteActivity,
};
pub use engine::{ActivityFn, ActivityRegistry, StarlarkWorkflowEngine};
pub use events::{Event, EventHistory, EventKey, HistoryError};
pub use retry::{exec_workflow, RetryConfig, WorkflowEngine};
