use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use weave_conf::Settings;
use weave_templates::parse_file;
use weave_templates::serialize;
use weave_templates::DEFAULT_VIEW;

use crate::args::GlobalArgs;
use crate::commands::read_source;
use crate::commands::Command;

#[derive(Debug, Parser)]
pub struct Serialize {
    /// View file to load.
    file: PathBuf,

    /// Name of the view to print.
    #[arg(long, default_value = DEFAULT_VIEW)]
    view: String,
}

impl Command for Serialize {
    fn execute(&self, args: &GlobalArgs, _settings: &Settings) -> Result<ExitCode> {
        let source = read_source(&self.file)?;
        let views = parse_file(&source)
            .with_context(|| format!("Failed to parse {}", self.file.display()))?;
        let view = views
            .iter()
            .find(|view| view.name == self.view)
            .with_context(|| format!("No view named `{}` in {}", self.view, self.file.display()))?;
        if !args.quiet {
            println!("{}", serialize(&view.template));
        }
        Ok(ExitCode::SUCCESS)
    }
}
