//! The `anvil` command-line entry point (spec §6): thin dispatch over the
//! library crates, with one subcommand per external interface the spec
//! names (`component`, `secret vault`, `workflow`, `doc`).
#![deny(clippy::all)]

mod commands;
mod engines;
mod error;
mod fetcher;
mod logging;
mod settings;

use anvil_context::Context;
use clap::{Parser, Subcommand};

pub use error::CliError;
pub use logging::LogFormat;
pub use settings::Settings;

use commands::{component::ComponentArgs, doc::DocArgs, secret::SecretCommand, workflow::WorkflowArgs};

#[derive(Debug, Parser)]
#[command(
    name = "anvil",
    about = "Compositional configuration generation and deterministic workflow execution",
    version
)]
pub struct Cli {
    /// Increase logging verbosity; may be repeated (e.g. `-vv`).
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Log output shape.
    #[arg(long = "log-format", global = true, default_value = "human")]
    log_format: String,
    /// Path to a TOML configuration file, overriding the per-OS default
    /// location.
    #[arg(long = "config", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate outputs from a root component manifest.
    Component(ComponentArgs),
    /// Manage secrets in external systems.
    Secret {
        #[command(subcommand)]
        command: SecretCommand,
    },
    /// Run a workflow script under the retry loop.
    Workflow(WorkflowArgs),
    /// Generate CLI documentation.
    Doc(DocArgs),
}

/// Parses arguments, installs logging, loads layered configuration, and
/// dispatches to the matched subcommand. Returns the error that should set
/// the process exit code; `main` is the only caller that translates it.
pub async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let log_format: LogFormat = cli.log_format.parse().map_err(CliError::Usage)?;
    logging::init(cli.verbose, log_format);

    let settings = settings::load(cli.config.as_deref(), &[])?;
    let ctx = Context::background();

    match cli.command {
        Command::Component(args) => commands::component::run(&ctx, &settings, args).await,
        Command::Secret { command } => commands::secret::run(&ctx, command).await,
        Command::Workflow(args) => commands::workflow::run(&ctx, &settings, args).await,
        Command::Doc(args) => commands::doc::run(args),
    }
}
