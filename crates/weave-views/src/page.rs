use std::rc::Rc;

use rustc_hash::FxHashMap;
use weave_dom::Document;
use weave_dom::NodeId;
use weave_dom::Property;
use weave_model::JsonValue;
use weave_model::Model;
use weave_model::ModelError;
use weave_model::Mutation;
use weave_model::Path;
use weave_templates::Expression;
use weave_templates::ExpressionKind;
use weave_templates::Template;
use weave_templates::ViewInstance;

use crate::app::App;
use crate::bindings::BindingId;
use crate::bindings::BindingKind;
use crate::bindings::Bindings;
use crate::contexts::ContextId;
use crate::contexts::ContextMeta;
use crate::contexts::Contexts;
use crate::controller::Component;
use crate::controller::Controller;
use crate::controller::ControllerId;
use crate::controller::Controllers;
use crate::error::ViewError;
use crate::eval::Evaluator;
use crate::eval::PathSegment;
use crate::event_model::EventModel;
use crate::event_model::EventNodeId;
use crate::event_model::Notification;
use crate::render::Mode;
use crate::render::Writer;
use crate::value::Value;

/// A side effect deferred until the current render or patch pass completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Task {
    Create(ControllerId),
    Destroy(ControllerId),
    SetElement {
        controller: ControllerId,
        name: String,
        node: NodeId,
    },
    PushElement {
        controller: ControllerId,
        name: String,
        node: NodeId,
    },
    InsertElement {
        controller: ControllerId,
        name: String,
        key: String,
        node: NodeId,
    },
    RemoveElement {
        controller: ControllerId,
        name: String,
        node: NodeId,
    },
}

/// An `on-<event>` hook.
#[derive(Clone, Debug)]
pub(crate) struct Listener {
    pub event: String,
    pub expression: Rc<Expression>,
    pub context: ContextId,
}

/// Render state attached to a DOM node.
#[derive(Debug, Default)]
pub(crate) struct NodeMeta {
    /// Bindings that die with the node.
    pub bindings: Vec<BindingId>,
    pub listeners: Vec<Listener>,
    /// Tasks queued when the node leaves the document.
    pub destroy: Vec<Task>,
    /// Each-block item scope led by this node, with the event node tracking it.
    pub item: Option<(EventNodeId, ContextId)>,
}

/// One rendered instance of an application: its model, its document and the
/// bindings that keep the two in step.
pub struct Page {
    pub(crate) app: Rc<App>,
    pub(crate) model: Model,
    pub(crate) document: Document,
    pub(crate) contexts: Contexts,
    pub(crate) controllers: Controllers,
    pub(crate) events: EventModel,
    pub(crate) bindings: Bindings,
    pub(crate) nodes: FxHashMap<NodeId, NodeMeta>,
    pub(crate) meta: ContextMeta,
    root: ContextId,
    roots: Vec<NodeId>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("app", &self.app.name())
            .field("bindings", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

impl Page {
    #[must_use]
    pub fn new(app: Rc<App>, model: Model) -> Self {
        let mut contexts = Contexts::new();
        let root = contexts.root(ControllerId::PAGE);
        Self {
            app,
            model,
            document: Document::new(),
            contexts,
            controllers: Controllers::new(),
            events: EventModel::new(),
            bindings: Bindings::default(),
            nodes: FxHashMap::default(),
            meta: ContextMeta::default(),
            root,
            roots: Vec::new(),
        }
    }

    #[must_use]
    pub fn app(&self) -> &Rc<App> {
        &self.app
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    #[must_use]
    pub fn controller(&self, id: ControllerId) -> &Controller {
        self.controllers.get(id)
    }

    /// Live component controllers, in creation order.
    pub fn components(&self) -> impl Iterator<Item = ControllerId> + '_ {
        self.controllers.components()
    }

    /// Number of live bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// `relative` under the model scope of `controller`.
    #[must_use]
    pub fn scoped(&self, controller: ControllerId, relative: &str) -> Path {
        self.controllers
            .get(controller)
            .scope()
            .join(&Path::parse(relative))
    }

    pub(crate) fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            model: &self.model,
            contexts: &self.contexts,
            controllers: &self.controllers,
            app: &self.app,
        }
    }

    /// Parse `html` into the children of `parent`, replacing what was there.
    pub fn set_inner_html(&mut self, parent: NodeId, html: &str) -> Result<(), ViewError> {
        let fragment = self.document.parse_fragment(html)?;
        self.document.remove_children(parent);
        self.document.append_child(parent, fragment);
        Ok(())
    }

    fn top_level(view: &str) -> Rc<Template> {
        Rc::new(Template::ViewInstance(ViewInstance {
            name: view.to_string(),
            attributes: Vec::new(),
        }))
    }

    /// Render a view to HTML. No bindings are created.
    pub fn render(&mut self, view: &str) -> Result<String, ViewError> {
        let template = Self::top_level(view);
        let root = self.root;
        let mut writer = Writer::new(Mode::Html);
        self.paused(|page| page.write(&template, root, &mut writer))?;
        Ok(writer.out)
    }

    /// Render a view into the end of `parent`, binding it to the model.
    pub fn append_to(&mut self, view: &str, parent: NodeId) -> Result<(), ViewError> {
        let template = Self::top_level(view);
        let root = self.root;
        self.roots.push(parent);
        self.paused(|page| page.append(&template, root, parent))
    }

    /// Bind a view to markup it was previously rendered to, already in `parent`.
    ///
    /// A mismatch leaves `parent` without bindings and returns
    /// [`ViewError::Attach`].
    pub fn attach_to(&mut self, view: &str, parent: NodeId) -> Result<(), ViewError> {
        let template = Self::top_level(view);
        let root = self.root;
        self.meta.pause();
        let cursor = self.document.first_child(parent);
        let result = self
            .attach(&template, root, parent, cursor)
            .and_then(|rest| match rest {
                None => Ok(()),
                Some(node) => Err(ViewError::Attach {
                    expected: "end of content".to_string(),
                    found: self.describe(Some(node)),
                }),
            });
        if let Err(err) = result {
            if let Err(discard_err) = self.discard(parent) {
                tracing::warn!(%discard_err, "failed to discard partial attach");
            }
            self.meta.reset();
            return Err(err);
        }
        self.roots.push(parent);
        self.meta.unpause();
        self.flush()
    }

    /// Attach to server markup, rendering from scratch when it does not match
    /// and the `hydrate_fallback` setting allows it.
    pub fn hydrate(&mut self, view: &str, parent: NodeId) -> Result<(), ViewError> {
        match self.attach_to(view, parent) {
            Err(err) if err.is_attach() && self.app.settings().hydrate_fallback => {
                tracing::warn!(view, %err, "server markup did not match; rendering from scratch");
                self.document.remove_children(parent);
                self.append_to(view, parent)
            }
            result => result,
        }
    }

    /// The value at `path`, following component attribute references.
    #[must_use]
    pub fn get(&self, path: impl Into<Path>) -> Option<&JsonValue> {
        let path = self.dereference(path.into());
        self.model.get(&path)
    }

    pub fn set(&mut self, path: impl Into<Path>, value: JsonValue) -> Result<(), ViewError> {
        self.mutate(path.into(), |model, path| model.set(path, value))
    }

    pub fn del(&mut self, path: impl Into<Path>) -> Result<(), ViewError> {
        self.mutate(path.into(), Model::del)
    }

    pub fn insert(
        &mut self,
        path: impl Into<Path>,
        index: usize,
        values: Vec<JsonValue>,
    ) -> Result<(), ViewError> {
        self.mutate(path.into(), |model, path| model.insert(path, index, values))
    }

    pub fn push(&mut self, path: impl Into<Path>, value: JsonValue) -> Result<(), ViewError> {
        self.mutate(path.into(), |model, path| model.push(path, value))
    }

    pub fn remove(
        &mut self,
        path: impl Into<Path>,
        index: usize,
        how_many: usize,
    ) -> Result<(), ViewError> {
        self.mutate(path.into(), |model, path| model.remove(path, index, how_many))
    }

    pub fn move_items(
        &mut self,
        path: impl Into<Path>,
        from: usize,
        to: usize,
        how_many: usize,
    ) -> Result<(), ViewError> {
        self.mutate(path.into(), |model, path| {
            model.move_items(path, from, to, how_many)
        })
    }

    fn dereference(&self, path: Path) -> Path {
        let resolved = path.segments().iter().map(PathSegment::from).collect();
        let evaluator = self.evaluator();
        evaluator
            .model_path(&evaluator.dereference(resolved))
            .unwrap_or(path)
    }

    fn mutate(
        &mut self,
        path: Path,
        op: impl FnOnce(&mut Model, &Path) -> Result<Mutation, ModelError>,
    ) -> Result<(), ViewError> {
        let path = self.dereference(path);
        let mutation = op(&mut self.model, &path)?;
        self.apply(&mutation)
    }

    /// Deliver one model mutation to the bindings that depend on it.
    pub(crate) fn apply(&mut self, mutation: &Mutation) -> Result<(), ViewError> {
        let notifications = match mutation {
            Mutation::Change { path, .. } | Mutation::Load { path } | Mutation::Unload { path, .. } => {
                self.events.set(path.segments())
            }
            Mutation::Insert {
                path,
                index,
                values,
            } => self.events.insert(path.segments(), *index, values.len(), &mut self.contexts),
            Mutation::Remove {
                path,
                index,
                values,
            } => self.events.remove(path.segments(), *index, values.len(), &mut self.contexts),
            Mutation::Move {
                path,
                from,
                to,
                how_many,
            } => self.events.move_items(
                path.segments(),
                *from,
                *to,
                *how_many,
                &mut self.contexts,
            ),
        };
        tracing::debug!(
            path = %mutation.path(),
            bindings = notifications.len(),
            "dispatching mutation"
        );
        self.paused(|page| {
            notifications
                .into_iter()
                .try_for_each(|(id, notification)| page.notify(id, notification))
        })
    }

    fn notify(&mut self, id: BindingId, notification: Notification) -> Result<(), ViewError> {
        // Bindings can die earlier in the same dispatch.
        if self.bindings.get(id).is_none() {
            return Ok(());
        }
        self.update_binding(id, notification)
    }

    /// Run `f` with queued tasks held back, then run them.
    pub(crate) fn paused<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ViewError>,
    ) -> Result<T, ViewError> {
        self.meta.pause();
        let result = f(self);
        self.meta.unpause();
        let flushed = self.flush();
        let value = result?;
        flushed?;
        Ok(value)
    }

    pub(crate) fn flush(&mut self) -> Result<(), ViewError> {
        while let Some(task) = self.meta.next_task() {
            self.run(task)?;
        }
        Ok(())
    }

    fn run(&mut self, task: Task) -> Result<(), ViewError> {
        tracing::trace!(?task, "running task");
        match task {
            Task::Create(id) => {
                if self.controllers.get(id).is_destroyed() {
                    return Ok(());
                }
                self.with_component(id, |component, page| component.create(page, id))
            }
            Task::Destroy(id) => {
                if self.controllers.get(id).is_destroyed() {
                    return Ok(());
                }
                self.controllers.get_mut(id).destroyed = true;
                let result = self.with_component(id, |component, page| component.destroy(page, id));
                self.retire(id)?;
                result
            }
            Task::SetElement {
                controller,
                name,
                node,
            } => {
                self.controllers
                    .get_mut(controller)
                    .set_element(&name, node);
                Ok(())
            }
            Task::PushElement {
                controller,
                name,
                node,
            } => {
                self.controllers
                    .get_mut(controller)
                    .push_element(&name, node);
                Ok(())
            }
            Task::InsertElement {
                controller,
                name,
                key,
                node,
            } => {
                self.controllers
                    .get_mut(controller)
                    .insert_element(&name, key, node);
                Ok(())
            }
            Task::RemoveElement {
                controller,
                name,
                node,
            } => {
                self.controllers
                    .get_mut(controller)
                    .remove_element(&name, node);
                Ok(())
            }
        }
    }

    /// Mark a component destroyed and delete its model scope, without
    /// running its destroy hook or notifying bindings.
    pub(crate) fn retire(&mut self, id: ControllerId) -> Result<(), ViewError> {
        self.controllers.get_mut(id).destroyed = true;
        let scope = self.controllers.get(id).scope().clone();
        if self.model.get(&scope).is_some() {
            self.model.del(&scope)?;
        }
        Ok(())
    }

    /// Call into a component with the component taken out of its slot, so it can borrow the page.
    pub(crate) fn with_component(
        &mut self,
        id: ControllerId,
        f: impl FnOnce(&mut dyn Component, &mut Page) -> Result<(), ViewError>,
    ) -> Result<(), ViewError> {
        let Some(mut component) = self.controllers.get_mut(id).component.take() else {
            return Ok(());
        };
        let result = f(component.as_mut(), self);
        self.controllers.get_mut(id).component = Some(component);
        result
    }

    /// Deliver a DOM event to `target`: two-way bindings first, then
    /// `on-<event>` hooks on the target and each of its ancestors.
    pub fn dispatch(&mut self, target: NodeId, event: &str) -> Result<(), ViewError> {
        if matches!(event, "input" | "change") {
            self.write_back(target)?;
        }
        let mut current = Some(target);
        while let Some(node) = current {
            let listeners: Vec<Listener> = self
                .nodes
                .get(&node)
                .map(|meta| {
                    meta.listeners
                        .iter()
                        .filter(|listener| listener.event == event)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            for listener in listeners {
                self.call_listener(&listener)?;
            }
            current = self.document.parent(node);
        }
        Ok(())
    }

    fn call_listener(&mut self, listener: &Listener) -> Result<(), ViewError> {
        let ExpressionKind::Fn { name, args, .. } = &listener.expression.kind else {
            self.evaluator().get(&listener.expression, listener.context)?;
            return Ok(());
        };
        let controller = self.contexts.get(listener.context).controller;
        let handler = self
            .controllers
            .handler(controller, name)
            .or_else(|| self.app.find_handler(name))
            .ok_or_else(|| ViewError::UnknownFunction(name.clone()))?;
        let values: Vec<Value> = self.evaluator().get_all(args, listener.context)?;
        tracing::debug!(handler = name.as_str(), event = listener.event.as_str(), "calling handler");
        handler(self, &values)
    }

    /// Copy `value`/`checked` from an element back into the paths bound to them.
    fn write_back(&mut self, target: NodeId) -> Result<(), ViewError> {
        let bound: Vec<(String, Rc<Expression>, ContextId)> = self
            .nodes
            .get(&target)
            .map(|meta| meta.bindings.clone())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| {
                let binding = self.bindings.get(id)?;
                let BindingKind::Attribute { attribute, .. } = &binding.kind else {
                    return None;
                };
                let weave_templates::AttributeValue::Expression(expression) = &attribute.value
                else {
                    return None;
                };
                matches!(attribute.name.as_str(), "value" | "checked").then(|| {
                    (attribute.name.clone(), expression.clone(), binding.context)
                })
            })
            .collect();

        for (name, expression, context) in bound {
            let value = match self.document.property(target, &name) {
                Property::String(text) => JsonValue::String(text),
                Property::Bool(flag) => JsonValue::Bool(flag),
                Property::Null => JsonValue::Null,
            };
            let evaluator = self.evaluator();
            let Some(path) = evaluator
                .resolve(&expression, context)
                .and_then(|path| evaluator.model_path(&path))
            else {
                tracing::debug!(expression = expression.source(), "bound value is not settable");
                continue;
            };
            if self.model.get(&path) == Some(&value) {
                continue;
            }
            let mutation = self.model.set(&path, value)?;
            self.apply(&mutation)?;
        }
        Ok(())
    }

    /// Tear down every binding and run the destroy hooks of every component.
    /// The document is left as it is.
    pub fn destroy(&mut self) -> Result<(), ViewError> {
        let roots = std::mem::take(&mut self.roots);
        let result = self.paused(|page| {
            for root in roots {
                for child in page.document.children(root) {
                    page.destroy_tree(child);
                }
            }
            Ok(())
        });
        self.bindings.clear();
        self.events = EventModel::new();
        self.nodes.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn page(views: &[(&str, &str)], data: JsonValue) -> (Page, NodeId) {
        let app = App::new("test");
        for (name, source) in views {
            app.views_mut().register(name, source).unwrap();
        }
        let mut page = Page::new(Rc::new(app), Model::from_json(data).unwrap());
        let body = page.document_mut().create_element("body");
        (page, body)
    }

    #[test]
    fn test_unknown_view() {
        let (mut page, _) = page(&[], json!({}));
        assert_eq!(
            page.render("Missing"),
            Err(ViewError::UnknownView("Missing".to_string()))
        );
    }

    #[test]
    fn test_mutation_errors_surface() {
        let (mut page, _) = page(&[], json!({"_page": {"n": 1}}));
        let err = page.push("_page.n", json!(2)).unwrap_err();
        assert!(matches!(err, ViewError::Model(ModelError::NotAnArray { .. })));
    }

    #[test]
    fn test_get_and_set() {
        let (mut page, _) = page(&[], json!({}));
        page.set("_page.title", json!("Hi")).unwrap();
        assert_eq!(page.get("_page.title"), Some(&json!("Hi")));
    }

    #[test]
    fn test_destroy_removes_bindings() {
        let (mut page, body) = page(&[("Body", "<p>{{_page.a}}</p>")], json!({"_page": {"a": 1}}));
        page.append_to("Body", body).unwrap();
        assert_eq!(page.binding_count(), 1);
        page.destroy().unwrap();
        assert_eq!(page.binding_count(), 0);
        page.set("_page.a", json!(2)).unwrap();
        assert_eq!(page.document().inner_html(body), "<p>1</p>");
    }
}
