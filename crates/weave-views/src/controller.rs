use std::rc::Rc;

use rustc_hash::FxHashMap;
use weave_dom::NodeId;
use weave_model::Path;

use crate::error::ViewError;
use crate::eval::PathSegment;
use crate::page::Page;
use crate::value::Value;

/// A pure function callable from expressions: `{{format(price)}}`.
pub type Function = Rc<dyn Fn(&[Value]) -> Result<Value, ViewError>>;

/// An event handler named by an `on-<event>` hook.
pub type Handler = Rc<dyn Fn(&mut Page, &[Value]) -> Result<(), ViewError>>;

/// Builds a fresh component for each instance of its view.
pub type ComponentFactory = Rc<dyn Fn() -> Box<dyn Component>>;

/// Behavior attached to a view. Every instance gets its own controller and a
/// private model scope under the components path.
pub trait Component {
    /// Runs before the view renders; the attribute values are already in the model.
    fn init(&mut self, _page: &mut Page, _controller: ControllerId) -> Result<(), ViewError> {
        Ok(())
    }

    /// Runs once the whole render pass that created the component has finished.
    fn create(&mut self, _page: &mut Page, _controller: ControllerId) -> Result<(), ViewError> {
        Ok(())
    }

    fn destroy(&mut self, _page: &mut Page, _controller: ControllerId) -> Result<(), ViewError> {
        Ok(())
    }

    /// Functions visible to this component's template, looked up before the app's.
    fn function(&self, _name: &str) -> Option<Function> {
        None
    }

    fn handler(&self, _name: &str) -> Option<Handler> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(u32);

impl ControllerId {
    /// The page itself, which owns the model root.
    pub const PAGE: ControllerId = ControllerId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Elements stored by `as`, `as-array` and `as-object` hooks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementRef {
    Node(NodeId),
    Array(Vec<NodeId>),
    Object(Vec<(String, NodeId)>),
}

pub struct Controller {
    id: String,
    scope: Path,
    parent: Option<ControllerId>,
    view: Option<String>,
    pub(crate) component: Option<Box<dyn Component>>,
    pub(crate) elements: FxHashMap<String, ElementRef>,
    /// Attribute keys that alias a path outside the component.
    pub(crate) refs: Vec<(String, Vec<PathSegment>)>,
    pub(crate) destroyed: bool,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("view", &self.view)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Generated instance id, empty for the page.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Model path that relative paths in this controller's templates start from.
    #[must_use]
    pub fn scope(&self) -> &Path {
        &self.scope
    }

    #[must_use]
    pub fn parent(&self) -> Option<ControllerId> {
        self.parent
    }

    #[must_use]
    pub fn view(&self) -> Option<&str> {
        self.view.as_deref()
    }

    #[must_use]
    pub fn element(&self, name: &str) -> Option<&ElementRef> {
        self.elements.get(name)
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn set_element(&mut self, name: &str, node: NodeId) {
        self.elements.insert(name.to_string(), ElementRef::Node(node));
    }

    pub(crate) fn push_element(&mut self, name: &str, node: NodeId) {
        match self.elements.get_mut(name) {
            Some(ElementRef::Array(nodes)) => nodes.push(node),
            _ => {
                self.elements
                    .insert(name.to_string(), ElementRef::Array(vec![node]));
            }
        }
    }

    pub(crate) fn insert_element(&mut self, name: &str, key: String, node: NodeId) {
        match self.elements.get_mut(name) {
            Some(ElementRef::Object(entries)) => {
                entries.retain(|(existing, _)| *existing != key);
                entries.push((key, node));
            }
            _ => {
                self.elements
                    .insert(name.to_string(), ElementRef::Object(vec![(key, node)]));
            }
        }
    }

    /// Forget `node` wherever it is stored under `name`.
    pub(crate) fn remove_element(&mut self, name: &str, node: NodeId) {
        let empty = match self.elements.get_mut(name) {
            Some(ElementRef::Node(stored)) => *stored == node,
            Some(ElementRef::Array(nodes)) => {
                nodes.retain(|stored| *stored != node);
                false
            }
            Some(ElementRef::Object(entries)) => {
                entries.retain(|(_, stored)| *stored != node);
                false
            }
            None => false,
        };
        if empty {
            self.elements.remove(name);
        }
    }
}

#[derive(Debug)]
pub struct Controllers {
    controllers: Vec<Controller>,
    by_id: FxHashMap<String, ControllerId>,
}

impl Controllers {
    /// A set holding only the page controller, scoped at the model root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            controllers: vec![Controller {
                id: String::new(),
                scope: Path::root(),
                parent: None,
                view: None,
                component: None,
                elements: FxHashMap::default(),
                refs: Vec::new(),
                destroyed: false,
            }],
            by_id: FxHashMap::default(),
        }
    }

    pub(crate) fn add(
        &mut self,
        id: String,
        scope: Path,
        parent: ControllerId,
        view: &str,
        component: Box<dyn Component>,
    ) -> ControllerId {
        let controller_id =
            ControllerId(u32::try_from(self.controllers.len()).unwrap_or(u32::MAX));
        self.by_id.insert(id.clone(), controller_id);
        self.controllers.push(Controller {
            id,
            scope,
            parent: Some(parent),
            view: Some(view.to_string()),
            component: Some(component),
            elements: FxHashMap::default(),
            refs: Vec::new(),
            destroyed: false,
        });
        controller_id
    }

    #[must_use]
    pub fn get(&self, id: ControllerId) -> &Controller {
        &self.controllers[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: ControllerId) -> &mut Controller {
        &mut self.controllers[id.index()]
    }

    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<ControllerId> {
        self.by_id.get(id).copied()
    }

    /// Live component controllers, in creation order.
    pub fn components(&self) -> impl Iterator<Item = ControllerId> + '_ {
        self.controllers
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, controller)| !controller.destroyed)
            .filter_map(|(i, _)| u32::try_from(i).ok().map(ControllerId))
    }

    pub(crate) fn function(&self, id: ControllerId, name: &str) -> Option<Function> {
        self.get(id)
            .component
            .as_ref()
            .and_then(|component| component.function(name))
    }

    pub(crate) fn handler(&self, id: ControllerId, name: &str) -> Option<Handler> {
        self.get(id)
            .component
            .as_ref()
            .and_then(|component| component.handler(name))
    }
}

impl Default for Controllers {
    fn default() -> Self {
        Self::new()
    }
}
