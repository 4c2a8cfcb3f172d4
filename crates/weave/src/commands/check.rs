use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use weave_conf::Settings;
use weave_views::Views;

use crate::args::GlobalArgs;
use crate::commands::read_source;
use crate::commands::Command;

#[derive(Debug, Parser)]
pub struct Check {
    /// View files to check.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

impl Command for Check {
    fn execute(&self, args: &GlobalArgs, _settings: &Settings) -> Result<ExitCode> {
        let mut views = Views::new();
        let mut failed = 0usize;
        for path in &self.paths {
            let source = read_source(path)?;
            match views.register_file(&source) {
                Ok(names) => tracing::info!(path = %path.display(), views = ?names, "parsed"),
                Err(err) => {
                    failed += 1;
                    if !args.quiet {
                        eprintln!("{}: {err}", path.display());
                    }
                }
            }
        }

        // Views can come from the host app, so unknown names are only a warning.
        for name in views.missing() {
            tracing::warn!(view = name.as_str(), "view is used but never defined");
        }

        if failed > 0 {
            if !args.quiet {
                eprintln!("{failed} of {} files failed to parse", self.paths.len());
            }
            return Ok(ExitCode::FAILURE);
        }
        if !args.quiet {
            println!("All checks passed!");
        }
        Ok(ExitCode::SUCCESS)
    }
}
