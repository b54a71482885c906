//! The `ExecWorkflow` retry loop (spec §4.8): each attempt restarts replay
//! from the beginning of the same event history, so a retried attempt first
//! re-confirms every activity the previous attempt already recorded before
//! reaching new work.

use std::time::Duration;

use anvil_context::Context;
use rand::Rng;
use serde_json::Value;
use tracing::warn;

use crate::{activity::WorkflowError, events::EventHistory};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    /// Full-jitter: scale the computed backoff by a uniform random factor in
    /// `[0, 1)` rather than sleeping the full computed duration every time.
    pub full_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            full_jitter: true,
        }
    }
}

fn backoff_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.min_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(config.max_backoff);
    if config.full_jitter {
        let factor: f64 = rand::thread_rng().gen_range(0.0..1.0);
        Duration::from_secs_f64(capped.as_secs_f64() * factor)
    } else {
        capped
    }
}

/// Anything capable of interpreting a workflow script (component I). Kept
/// synchronous: the reference Starlark-based engine evaluates on the
/// calling thread, matching the single-threaded-cooperative model of §5.
pub trait WorkflowEngine {
    fn exec(
        &self,
        ctx: &Context,
        history: &mut EventHistory,
        name: &str,
        args: &Value,
    ) -> Result<Value, WorkflowError>;
}

/// Runs `engine.exec` up to `config.max_retries` times, restarting replay
/// from the top of `history` on each attempt. Non-retryable errors
/// (`DeterminismError`, `InvalidArgs`) abort immediately.
pub async fn exec_workflow(
    ctx: &Context,
    engine: &dyn WorkflowEngine,
    history: &mut EventHistory,
    name: &str,
    args: &Value,
    config: &RetryConfig,
) -> Result<Value, WorkflowError> {
    let mut last_err = None;
    for attempt in 0..config.max_retries {
        history.start();
        match engine.exec(ctx, history, name, args) {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                warn!(attempt, error = %err, "workflow attempt failed, will retry");
                let backoff = backoff_for_attempt(config, attempt);
                last_err = Some(err);
                if attempt + 1 < config.max_retries && ctx.sleep(backoff).await.is_err() {
                    break;
                }
            }
        }
    }
    Err(last_err.expect("loop runs at least once since max_retries >= 1 is the caller's contract"))
}
