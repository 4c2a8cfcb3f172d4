use std::rc::Rc;

use weave_dom::NodeId;
use weave_model::JsonValue;
use weave_templates::Attribute;
use weave_templates::Expression;
use weave_templates::Template;

use crate::contexts::ContextId;
use crate::controller::ControllerId;
use crate::eval::ResolvedPath;
use crate::event_model::EventNodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u32);

impl BindingId {
    fn index(self) -> usize {
        self.0 as usize
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// What a binding keeps up to date.
#[derive(Debug)]
pub(crate) enum BindingKind {
    /// The data of a text node.
    Text {
        node: NodeId,
        expression: Rc<Expression>,
    },
    /// The text of a `<script>` or `<style>` element, rendered from its content.
    RawText { node: NodeId, content: Rc<Template> },
    Attribute {
        element: NodeId,
        attribute: Rc<Attribute>,
    },
    /// An element whose tag name is computed; replaced when the name changes.
    Element { node: NodeId, template: Rc<Template> },
    /// Everything between two comment markers.
    Range {
        template: Rc<Template>,
        start: NodeId,
        end: NodeId,
        state: RangeState,
    },
    /// A component attribute that could not be aliased, pushed into the component model.
    ComponentAttribute {
        controller: ControllerId,
        key: String,
        expression: Rc<Expression>,
    },
}

/// What a range rendered last, used to skip re-renders that would not change anything.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RangeState {
    /// The block value; `None` for values that always count as changed.
    Value(Option<JsonValue>),
    /// The winning branch of a conditional chain.
    Branch(Option<usize>),
    Each(Vec<EachItem>),
    Empty,
}

/// One rendered each-block item: its scope and the marker its nodes start at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EachItem {
    pub context: ContextId,
    pub start: NodeId,
}

#[derive(Debug)]
pub(crate) struct Binding {
    pub kind: BindingKind,
    pub context: ContextId,
    pub dependencies: Vec<ResolvedPath>,
    /// Event model nodes this binding is stored on.
    pub registrations: Vec<EventNodeId>,
}

impl Binding {
    pub fn new(kind: BindingKind, context: ContextId) -> Self {
        Self {
            kind,
            context,
            dependencies: Vec::new(),
            registrations: Vec::new(),
        }
    }
}

/// Live bindings. A destroyed binding leaves an empty slot; ids are never reused.
#[derive(Debug, Default)]
pub(crate) struct Bindings {
    slots: Vec<Option<Binding>>,
    live: usize,
}

impl Bindings {
    pub fn insert(&mut self, binding: Binding) -> BindingId {
        let id = BindingId(u32::try_from(self.slots.len()).unwrap_or(u32::MAX));
        self.slots.push(Some(binding));
        self.live += 1;
        id
    }

    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: BindingId) -> Option<&mut Binding> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: BindingId) -> Option<Binding> {
        let binding = self.slots.get_mut(id.index()).and_then(Option::take);
        if binding.is_some() {
            self.live -= 1;
        }
        binding
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Drop every binding, keeping ids already handed out unused.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.live = 0;
    }
}
