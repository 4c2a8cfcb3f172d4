use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::app::App;
use crate::error::ViewError;

/// The apps of one process, by name. Reloading swaps an app's templates in
/// place so pages created from it render the new views.
#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: FxHashMap<String, Rc<App>>,
}

impl AppRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `app`, replacing any app registered under the same name.
    pub fn register(&mut self, app: App) -> Rc<App> {
        let app = Rc::new(app);
        if self
            .apps
            .insert(app.name().to_string(), Rc::clone(&app))
            .is_some()
        {
            tracing::debug!(app = app.name(), "replaced app");
        }
        app
    }

    pub fn get(&self, name: &str) -> Result<Rc<App>, ViewError> {
        self.apps
            .get(name)
            .cloned()
            .ok_or_else(|| ViewError::UnknownApp(name.to_string()))
    }

    /// Replace the templates of app `name` with the views in `sources`.
    /// Components stay registered.
    ///
    /// Nothing changes when a source fails to parse.
    pub fn reload(&self, name: &str, sources: &[&str]) -> Result<Vec<String>, ViewError> {
        let app = self.get(name)?;
        let mut views = app.views().clone();
        views.clear_templates();
        let mut names = Vec::new();
        for source in sources {
            names.extend(views.register_file(source)?);
        }
        *app.views_mut() = views;
        tracing::info!(app = name, views = names.len(), "reloaded views");
        Ok(names)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.apps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Drop every app.
    pub fn teardown(&mut self) {
        tracing::debug!(apps = self.apps.len(), "tearing down app registry");
        self.apps.clear();
    }
}
