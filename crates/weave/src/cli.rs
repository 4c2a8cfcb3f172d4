use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::args::GlobalArgs;
use crate::commands;
use crate::commands::Command;
use crate::commands::WeaveCommand;
use crate::logging;

/// Compile and render weave view templates.
#[derive(Parser)]
#[command(name = "weave")]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: WeaveCommand,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Parse CLI arguments and execute the chosen command
pub fn run(args: Vec<String>) -> Result<ExitCode> {
    let cli = Cli::try_parse_from(args).unwrap_or_else(|e| {
        e.exit();
    });

    let settings = commands::load_settings()?;
    logging::init(&cli.global, settings.debug);
    tracing::debug!(?settings, "loaded settings");
    cli.command.execute(&cli.global, &settings)
}
