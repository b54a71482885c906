//! `anvil workflow`: runs a single Starlark workflow script to completion
//! under the retry loop, registering every built-in activity module so
//! scripts can reach the filesystem, HTTP, templating, crypto, and Vault
//! through `workflow.execactivity` (spec §6, §4.8).

use std::{path::PathBuf, sync::Arc, time::Duration};

use anvil_context::Context;
use anvil_fs::LocalFs;
use anvil_paths::AbsoluteSystemPathBuf;
use anvil_workflow::{
    exec_workflow, Activity, ActivityError, ActivityRegistry, EventHistory, FsActivities,
    HttpGetActivity, HttpPostActivity, RandomHexActivity, RetryConfig, Sha256HexActivity,
    StarlarkWorkflowEngine, TmplRenderActivity, VaultClient,
};
use clap::Args;
use serde_json::Value;

use crate::{error::CliError, settings::Settings};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Args)]
pub struct WorkflowArgs {
    /// Path to the workflow entry script.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,
    /// JSON value passed to the script's `main`.
    #[arg(long, default_value = "null")]
    args: String,
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long)]
    min_backoff_ms: Option<u64>,
    #[arg(long)]
    max_backoff_ms: Option<u64>,
    /// Base URL of a Vault server; enables the `vault.*` activities.
    #[arg(long)]
    vault_addr: Option<String>,
    #[arg(long)]
    vault_token: Option<String>,
}

pub async fn run(ctx: &Context, settings: &Settings, args: WorkflowArgs) -> Result<(), CliError> {
    let input = std::fs::canonicalize(&args.input)?;
    let dir = input
        .parent()
        .ok_or_else(|| CliError::Usage("workflow entry has no parent directory".into()))?
        .to_path_buf();
    let entry = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::Usage("workflow entry path is not valid UTF-8".into()))?
        .to_owned();
    let fs_root = AbsoluteSystemPathBuf::new(dir)?;
    let fs = Arc::new(LocalFs::new(fs_root.clone()));

    let registry = builtin_activity_registry(
        fs_root,
        args.vault_addr.as_deref(),
        args.vault_token.as_deref(),
    );
    let engine = StarlarkWorkflowEngine::new(fs, entry, registry);

    let config = RetryConfig {
        max_retries: args.max_retries.unwrap_or(settings.retry.max_retries),
        min_backoff: Duration::from_millis(args.min_backoff_ms.unwrap_or(settings.retry.min_backoff_ms)),
        max_backoff: Duration::from_millis(args.max_backoff_ms.unwrap_or(settings.retry.max_backoff_ms)),
        full_jitter: true,
    };

    let workflow_args: Value = serde_json::from_str(&args.args)
        .map_err(|e| CliError::Usage(format!("invalid --args JSON: {e}")))?;
    let mut history = EventHistory::new();
    let result = exec_workflow(ctx, &engine, &mut history, "main", &workflow_args, &config).await?;

    let rendered =
        serde_json::to_string_pretty(&result).map_err(|e| CliError::Usage(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn arg_str(args: &Value, field: &str) -> Result<String, ActivityError> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ActivityError::Failed(format!("expected a string field {field:?}")))
}

/// Registers the reference activity set under the names a script addresses
/// via `workflow.execactivity`. `vault.*` is only registered when Vault
/// connection details are supplied, matching `secret vault`'s own gating.
fn builtin_activity_registry(
    fs_root: AbsoluteSystemPathBuf,
    vault_addr: Option<&str>,
    vault_token: Option<&str>,
) -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();

    let read_root = fs_root.clone();
    registry.register("fs.read", move |ctx, args| {
        let path = args
            .as_str()
            .ok_or_else(|| ActivityError::Failed("fs.read expects a string path".into()))?;
        FsActivities::new(read_root.clone()).read(path).exec(ctx)
    });

    let write_root = fs_root.clone();
    registry.register("fs.write", move |ctx, args| {
        let path = arg_str(args, "path")?;
        let contents = arg_str(args, "contents")?;
        FsActivities::new(write_root.clone())
            .write(&path, contents.into_bytes())
            .exec(ctx)
    });

    registry.register("http.get", |ctx, args| {
        let url = arg_str(args, "url")?;
        let timeout = args
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);
        HttpGetActivity { url, timeout }.exec(ctx)
    });

    registry.register("http.post", |ctx, args| {
        let url = arg_str(args, "url")?;
        let body = arg_str(args, "body")?;
        let timeout = args
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);
        HttpPostActivity { url, body, timeout }.exec(ctx)
    });

    registry.register("tmpl.render", |ctx, args| {
        let template = arg_str(args, "template")?;
        let render_args = args.get("args").cloned().unwrap_or(Value::Null);
        TmplRenderActivity {
            template,
            args: render_args,
        }
        .exec(ctx)
    });

    registry.register("crypto.sha256hex", |ctx, args| {
        let input = args
            .as_str()
            .ok_or_else(|| ActivityError::Failed("crypto.sha256hex expects a string".into()))?
            .to_owned();
        Sha256HexActivity { input }.exec(ctx)
    });

    registry.register("crypto.randomHex", |ctx, args| {
        let call_id = arg_str(args, "callId")?;
        let len = args
            .get("len")
            .and_then(Value::as_u64)
            .ok_or_else(|| ActivityError::Failed("crypto.randomHex expects a numeric len".into()))?
            as usize;
        RandomHexActivity { call_id, len }.exec(ctx)
    });

    if let (Some(addr), Some(token)) = (vault_addr, vault_token) {
        let addr = addr.to_owned();
        let token = token.to_owned();
        let client = Arc::new(VaultClient::new(addr, token, DEFAULT_HTTP_TIMEOUT));

        let read_client = client.clone();
        registry.register("vault.read", move |ctx, args| {
            let path = args
                .as_str()
                .ok_or_else(|| ActivityError::Failed("vault.read expects a string path".into()))?;
            read_client.read(path).exec(ctx)
        });

        let policy_client = client.clone();
        registry.register("vault.write.policy", move |ctx, args| {
            let name = arg_str(args, "name")?;
            let body = args.get("body").cloned().unwrap_or(Value::Null);
            policy_client.write_policy(&name, body).exec(ctx)
        });

        let role_client = client;
        registry.register("vault.write.role", move |ctx, args| {
            let name = arg_str(args, "name")?;
            let body = args.get("body").cloned().unwrap_or(Value::Null);
            role_client.write_role(&name, body).exec(ctx)
        });
    }

    registry
}
