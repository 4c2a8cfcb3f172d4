use std::rc::Rc;

use rustc_hash::FxHashMap;
use weave_templates::parse;
use weave_templates::parse_file;
use weave_templates::Template;

use crate::controller::Component;
use crate::controller::ComponentFactory;
use crate::error::ViewError;

/// A registered view: its template and, when a component is attached, the
/// factory for its controllers.
#[derive(Clone)]
pub struct View {
    pub name: String,
    pub template: Rc<Template>,
    pub component: Option<ComponentFactory>,
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("component", &self.component.is_some())
            .finish_non_exhaustive()
    }
}

/// Named templates, plus the components attached to some of them.
///
/// Components may be registered before or after their template.
#[derive(Clone, Default)]
pub struct Views {
    templates: FxHashMap<String, Rc<Template>>,
    components: FxHashMap<String, ComponentFactory>,
}

impl Views {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, source: &str) -> Result<(), ViewError> {
        let template = parse(source)?;
        self.register_template(name, template);
        Ok(())
    }

    pub fn register_template(&mut self, name: &str, template: Rc<Template>) {
        tracing::debug!(view = name, "registered view");
        self.templates.insert(name.to_string(), template);
    }

    /// Register every `<Name:>` section of a view file, returning the names.
    pub fn register_file(&mut self, source: &str) -> Result<Vec<String>, ViewError> {
        let sections = parse_file(source)?;
        let mut names = Vec::with_capacity(sections.len());
        for section in sections {
            self.register_template(&section.name, section.template);
            names.push(section.name);
        }
        Ok(names)
    }

    pub fn register_component(
        &mut self,
        name: &str,
        factory: impl Fn() -> Box<dyn Component> + 'static,
    ) {
        self.components.insert(name.to_string(), Rc::new(factory));
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<View> {
        let template = self.templates.get(name)?;
        Some(View {
            name: name.to_string(),
            template: template.clone(),
            component: self.components.get(name).cloned(),
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered view names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Drop every template, keeping component registrations.
    pub fn clear_templates(&mut self) {
        self.templates.clear();
    }

    /// Views instantiated by registered templates that are not registered themselves.
    #[must_use]
    pub fn missing(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .templates
            .values()
            .flat_map(|template| template.view_names())
            .filter(|name| !self.contains(name))
            .map(str::to_string)
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }
}

impl std::fmt::Debug for Views {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Views")
            .field("templates", &self.names())
            .field("components", &self.components.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Card;

    impl Component for Card {}

    #[test]
    fn test_register_file() {
        let mut views = Views::new();
        let names = views
            .register_file("<Title:>\nHome\n\n<Body:>\n<card></card>\n")
            .unwrap();
        assert_eq!(names, vec!["Title", "Body"]);
        assert!(views.contains("Body"));
        assert_eq!(views.names(), vec!["Body", "Title"]);
    }

    #[test]
    fn test_component_registered_before_template() {
        let mut views = Views::new();
        views.register_component("card", || Box::new(Card));
        assert!(views.find("card").is_none());
        views.register("card", "<div>{{title}}</div>").unwrap();
        assert!(views.find("card").unwrap().component.is_some());
        assert!(views.find("card").is_some_and(|view| view.name == "card"));
    }

    #[test]
    fn test_missing_views() {
        let mut views = Views::new();
        views
            .register("Body", "<view is=\"card\"></view><ui:button></ui:button>")
            .unwrap();
        views.register("card", "x").unwrap();
        assert_eq!(views.missing(), vec!["ui:button".to_string()]);
    }

    #[test]
    fn test_parse_errors_propagate() {
        let mut views = Views::new();
        let err = views.register("Body", "{{if x}}").unwrap_err();
        assert!(matches!(err, ViewError::Template(_)));
    }
}
