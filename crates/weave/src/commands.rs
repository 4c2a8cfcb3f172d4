mod check;
mod render;
mod serialize;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use clap::Subcommand;
use weave_conf::Settings;
use weave_views::App;

use crate::args::GlobalArgs;

pub trait Command {
    fn execute(&self, args: &GlobalArgs, settings: &Settings) -> Result<ExitCode>;
}

#[derive(Debug, Subcommand)]
pub enum WeaveCommand {
    /// Render a view to HTML
    Render(self::render::Render),
    /// Print the compiled form of a view
    Serialize(self::serialize::Serialize),
    /// Parse view files and report errors
    Check(self::check::Check),
}

impl Command for WeaveCommand {
    fn execute(&self, args: &GlobalArgs, settings: &Settings) -> Result<ExitCode> {
        match self {
            WeaveCommand::Render(command) => command.execute(args, settings),
            WeaveCommand::Serialize(command) => command.execute(args, settings),
            WeaveCommand::Check(command) => command.execute(args, settings),
        }
    }
}

/// Settings for the project in the current directory.
pub fn load_settings() -> Result<Settings> {
    let project_root = std::env::current_dir().context("Failed to read the current directory")?;
    Settings::new(&project_root).context("Failed to load settings")
}

/// An app holding every view of the file at `path`.
fn load_app(path: &Path, settings: &Settings) -> Result<App> {
    let source = read_source(path)?;
    let app = App::with_settings("weave", settings.clone());
    let names = app
        .views_mut()
        .register_file(&source)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!(path = %path.display(), views = ?names, "registered views");
    Ok(app)
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
