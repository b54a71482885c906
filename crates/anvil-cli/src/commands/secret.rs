//! `anvil secret vault`: applies policy and role documents to a Vault server
//! (spec §6). Each `--policies`/`--roles` directory holds one `<name>.json`
//! file per document; the name becomes the Vault policy/role name.

use std::{path::PathBuf, time::Duration};

use anvil_context::Context;
use anvil_workflow::{Activity, VaultClient};
use clap::{Args, Subcommand};
use tracing::info;

use crate::error::CliError;

const VAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Subcommand)]
pub enum SecretCommand {
    /// Applies policy and role documents to Vault.
    Vault(VaultArgs),
}

#[derive(Debug, Args)]
pub struct VaultArgs {
    #[arg(long)]
    vault_addr: String,
    #[arg(long)]
    vault_token: String,
    /// Directory of `<name>.json` policy documents.
    #[arg(long)]
    policies: Option<PathBuf>,
    /// Directory of `<name>.json` role documents.
    #[arg(long)]
    roles: Option<PathBuf>,
    /// Read and validate the documents but don't write them to Vault.
    #[arg(long)]
    dry_run: bool,
}

pub async fn run(ctx: &Context, command: SecretCommand) -> Result<(), CliError> {
    let SecretCommand::Vault(args) = command;
    let client = VaultClient::new(args.vault_addr.clone(), args.vault_token.clone(), VAULT_TIMEOUT);

    if let Some(dir) = &args.policies {
        for (name, body) in read_named_documents(dir)? {
            if args.dry_run {
                info!(name = %name, "dry-run: skipping policy write");
                continue;
            }
            client
                .write_policy(&name, body)
                .exec(ctx)
                .map_err(|e| CliError::Usage(e.to_string()))?;
            info!(name = %name, "wrote vault policy");
        }
    }

    if let Some(dir) = &args.roles {
        for (name, body) in read_named_documents(dir)? {
            if args.dry_run {
                info!(name = %name, "dry-run: skipping role write");
                continue;
            }
            client
                .write_role(&name, body)
                .exec(ctx)
                .map_err(|e| CliError::Usage(e.to_string()))?;
            info!(name = %name, "wrote vault role");
        }
    }

    Ok(())
}

fn read_named_documents(dir: &std::path::Path) -> Result<Vec<(String, serde_json::Value)>, CliError> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CliError::Usage(format!("non-UTF-8 document name in {}", dir.display())))?
            .to_owned();
        let bytes = std::fs::read(&path)?;
        let body: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| CliError::Usage(format!("{}: {e}", path.display())))?;
        out.push((name, body));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}
