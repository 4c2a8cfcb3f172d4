use std::cell::Ref;
use std::cell::RefCell;
use std::cell::RefMut;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use weave_conf::Settings;
use weave_model::Model;

use crate::controller::Function;
use crate::controller::Handler;
use crate::error::ViewError;
use crate::page::Page;
use crate::value::Value;
use crate::views::Views;

/// Views, functions and handlers shared by every page of an application.
pub struct App {
    name: String,
    settings: Settings,
    views: RefCell<Views>,
    functions: FxHashMap<String, Function>,
    handlers: FxHashMap<String, Handler>,
}

impl App {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_settings(name, Settings::default())
    }

    #[must_use]
    pub fn with_settings(name: &str, settings: Settings) -> Self {
        Self {
            name: name.to_string(),
            settings,
            views: RefCell::new(Views::new()),
            functions: FxHashMap::default(),
            handlers: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn views(&self) -> Ref<'_, Views> {
        self.views.borrow()
    }

    pub fn views_mut(&self) -> RefMut<'_, Views> {
        self.views.borrow_mut()
    }

    /// Register a function callable from templates.
    pub fn function(
        &mut self,
        name: &str,
        function: impl Fn(&[Value]) -> Result<Value, ViewError> + 'static,
    ) -> &mut Self {
        self.functions.insert(name.to_string(), Rc::new(function));
        self
    }

    /// Register a handler callable from `on-<event>` hooks.
    pub fn handler(
        &mut self,
        name: &str,
        handler: impl Fn(&mut Page, &[Value]) -> Result<(), ViewError> + 'static,
    ) -> &mut Self {
        self.handlers.insert(name.to_string(), Rc::new(handler));
        self
    }

    #[must_use]
    pub fn find_function(&self, name: &str) -> Option<Function> {
        self.functions.get(name).cloned()
    }

    #[must_use]
    pub fn find_handler(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }

    #[must_use]
    pub fn create_page(self: &Rc<Self>, model: Model) -> Page {
        Page::new(Rc::clone(self), model)
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("name", &self.name)
            .field("views", &*self.views.borrow())
            .finish_non_exhaustive()
    }
}
