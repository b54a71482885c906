//! The activity boundary (spec §4.8, §9): any operation that observes or
//! alters external state must be reached only through an [`Activity`], so
//! that replaying the recorded event log reproduces it without re-running
//! the side effect.

use anvil_context::Context;
use serde_json::Value;
use thiserror::Error;

use crate::events::{Event, EventHistory, EventKey, HistoryError};

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("replay diverged from recorded history for activity {key:?}: {detail}")]
    Determinism { key: String, detail: String },
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error("invalid workflow arguments: {0}")]
    InvalidArgs(String),
    #[error("workflow script error: {0}")]
    Script(String),
}

impl WorkflowError {
    /// Per §4.8's retry loop: `DeterminismError` and `InvalidArgs` abort
    /// immediately rather than retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            WorkflowError::Determinism { .. } | WorkflowError::InvalidArgs(_)
        )
    }
}

/// A workflow step whose execution may be recorded and replayed. `key` must
/// be stable across replays of the same logical call (e.g. derived from the
/// activity's registered name, not from any runtime address). `serialize`
/// must be a pure function of the activity's own arguments.
pub trait Activity {
    fn key(&self) -> String;
    fn serialize(&self) -> Value;
    fn exec(&self, ctx: &Context) -> Result<Value, ActivityError>;
}

/// Implements §4.8's `ExecActivity` algorithm: verify or record the call's
/// argument event, then either replay its recorded return value or execute
/// it live and record what it returned.
pub fn exec_activity(
    ctx: &Context,
    history: &mut EventHistory,
    activity: &dyn Activity,
) -> Result<Value, WorkflowError> {
    let key = activity.key();
    let args_key = EventKey::Args(key.clone());
    let args_value = activity.serialize();

    match history.next() {
        Some(Event { key: k, value: v }) => {
            if k != args_key || v != args_value {
                return Err(WorkflowError::Determinism {
                    key,
                    detail: "recorded call arguments do not match this replay's arguments".into(),
                });
            }
        }
        None => history.push(args_key, args_value)?,
    }

    match history.next() {
        Some(Event {
            key: EventKey::Return(k),
            value,
        }) if k == key => Ok(value),
        Some(_) => Err(WorkflowError::Determinism {
            key,
            detail: "expected a recorded return event at this position".into(),
        }),
        None => {
            let result = activity.exec(ctx)?;
            history.push(EventKey::Return(key), result.clone())?;
            Ok(result)
        }
    }
}
