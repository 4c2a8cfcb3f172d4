use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use serde_json::json;
use weave_conf::Settings;
use weave_model::Model;
use weave_templates::DEFAULT_VIEW;

use crate::args::GlobalArgs;
use crate::commands::load_app;
use crate::commands::read_source;
use crate::commands::Command;

#[derive(Debug, Parser)]
pub struct Render {
    /// View file to load.
    file: PathBuf,

    /// Name of the view to render.
    #[arg(long, default_value = DEFAULT_VIEW)]
    view: String,

    /// JSON file with the model data.
    #[arg(long)]
    data: Option<PathBuf>,
}

impl Command for Render {
    fn execute(&self, args: &GlobalArgs, settings: &Settings) -> Result<ExitCode> {
        let app = Rc::new(load_app(&self.file, settings)?);
        let data = match &self.data {
            Some(path) => serde_json::from_str(&read_source(path)?)
                .with_context(|| format!("Failed to parse {} as JSON", path.display()))?,
            None => json!({}),
        };
        let model = Model::from_json(data).context("Model data must be a JSON object")?;
        let mut page = app.create_page(model);
        let html = page
            .render(&self.view)
            .with_context(|| format!("Failed to render view `{}`", self.view))?;
        if !args.quiet {
            println!("{html}");
        }
        Ok(ExitCode::SUCCESS)
    }
}
