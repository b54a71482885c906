//! `anvil doc`: renders one markdown file per subcommand by walking the
//! `clap::Command` tree directly, so the generated docs can never drift from
//! the flags `Cli` actually parses (spec §6).

use std::path::{Path, PathBuf};

use clap::{Args, Command, CommandFactory};

use crate::{error::CliError, Cli};

#[derive(Debug, Args)]
pub struct DocArgs {
    /// Directory the generated `<command>.md` files are written into.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,
}

pub fn run(args: DocArgs) -> Result<(), CliError> {
    std::fs::create_dir_all(&args.output)?;
    render_command(&Cli::command(), &args.output)
}

fn render_command(command: &Command, dir: &Path) -> Result<(), CliError> {
    let name = command.get_name().to_owned();
    let mut rendered = command.clone();

    let mut body = format!("# {name}\n\n");
    if let Some(about) = command.get_about() {
        body.push_str(&format!("{about}\n\n"));
    }
    body.push_str("```\n");
    body.push_str(&rendered.render_long_help().to_string());
    body.push_str("\n```\n");

    std::fs::write(dir.join(format!("{name}.md")), body)?;

    for sub in command.get_subcommands() {
        render_command(sub, dir)?;
    }
    Ok(())
}
