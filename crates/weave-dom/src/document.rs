use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::DomError;

/// Stable handle to a node in a [`Document`]. Handles are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Live element state that does not round-trip through attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Property {
    String(String),
    Bool(bool),
    Null,
}

impl Property {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Property::Bool(b) => *b,
            Property::String(s) => !s.is_empty(),
            Property::Null => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElementData {
    tag_name: String,
    attributes: Vec<(String, String)>,
    properties: FxHashMap<String, Property>,
}

impl ElementData {
    #[must_use]
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    #[must_use]
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Fragment,
    Element(ElementData),
    Text(String),
    Comment(String),
    Doctype(String),
}

#[derive(Clone, Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }
}

/// Properties that are reflected to an attribute when assigned.
const REFLECTED_PROPERTIES: &[(&str, &str)] = &[
    ("className", "class"),
    ("id", "id"),
    ("htmlFor", "for"),
    ("title", "title"),
    ("disabled", "disabled"),
    ("readOnly", "readonly"),
    ("multiple", "multiple"),
];

/// An arena of DOM nodes.
#[derive(Clone, Debug, Default)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(NodeData::new(kind));
        id
    }

    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.alloc(NodeKind::Fragment)
    }

    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        self.alloc(NodeKind::Element(ElementData {
            tag_name: tag_name.to_ascii_lowercase(),
            attributes: Vec::new(),
            properties: FxHashMap::default(),
        }))
    }

    pub fn create_text(&mut self, data: &str) -> NodeId {
        self.alloc(NodeKind::Text(data.to_string()))
    }

    pub fn create_comment(&mut self, data: &str) -> NodeId {
        self.alloc(NodeKind::Comment(data.to_string()))
    }

    pub fn create_doctype(&mut self, data: &str) -> NodeId {
        self.alloc(NodeKind::Doctype(data.to_string()))
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    #[must_use]
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = Vec::new();
        let mut child = self.first_child(id);
        while let Some(node) = child {
            children.push(node);
            child = self.next_sibling(node);
        }
        children
    }

    #[must_use]
    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text(_))
    }

    #[must_use]
    pub fn is_comment(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Comment(_))
    }

    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Element(_))
    }

    #[must_use]
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element(element) => Some(&element.tag_name),
            _ => None,
        }
    }

    /// Character data of a text, comment or doctype node.
    #[must_use]
    pub fn data(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Text(data) | NodeKind::Comment(data) | NodeKind::Doctype(data) => Some(data),
            _ => None,
        }
    }

    pub fn set_data(&mut self, id: NodeId, value: &str) {
        if let NodeKind::Text(data) | NodeKind::Comment(data) = &mut self.node_mut(id).kind {
            value.clone_into(data);
        }
    }

    /// Split a text node at a byte offset, returning the new trailing node.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, DomError> {
        let NodeKind::Text(data) = &mut self.node_mut(id).kind else {
            return Err(DomError::NotText(id));
        };
        if offset > data.len() || !data.is_char_boundary(offset) {
            return Err(DomError::InvalidOffset { node: id, offset });
        }
        let tail = data.split_off(offset);
        let next = self.create_text(&tail);
        if let Some(parent) = self.parent(id) {
            let reference = self.next_sibling(id);
            self.insert_before(parent, next, reference);
        }
        Ok(next)
    }

    /// Append `child` to `parent`. Appending a fragment moves its children.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` before `reference`, or at the end when `reference` is `None`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if matches!(self.kind(child), NodeKind::Fragment) {
            for grandchild in self.children(child) {
                self.insert_before(parent, grandchild, reference);
            }
            return;
        }
        if reference == Some(child) {
            return;
        }
        self.detach(child);

        let prev = match reference {
            Some(reference) => self.node(reference).prev_sibling,
            None => self.node(parent).last_child,
        };
        {
            let node = self.node_mut(child);
            node.parent = Some(parent);
            node.prev_sibling = prev;
            node.next_sibling = reference;
        }
        match prev {
            Some(prev) => self.node_mut(prev).next_sibling = Some(child),
            None => self.node_mut(parent).first_child = Some(child),
        }
        match reference {
            Some(reference) => self.node_mut(reference).prev_sibling = Some(child),
            None => self.node_mut(parent).last_child = Some(child),
        }
    }

    /// Unlink a node from its parent, keeping its own subtree intact.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        let prev = self.node(id).prev_sibling;
        let next = self.node(id).next_sibling;
        match prev {
            Some(prev) => self.node_mut(prev).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    pub fn remove_children(&mut self, parent: NodeId) {
        for child in self.children(parent) {
            self.detach(child);
        }
    }

    #[must_use]
    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.kind(id) {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.node_mut(id).kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(element) = self.element_mut(id) else {
            return;
        };
        match element.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => value.clone_into(existing),
            None => element
                .attributes
                .push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(element) = self.element_mut(id) {
            element.attributes.retain(|(key, _)| key != name);
        }
    }

    /// Read a DOM property, falling back to the attribute that seeds it.
    #[must_use]
    pub fn property(&self, id: NodeId, name: &str) -> Property {
        if let Some(attribute) = reflected_attribute(name) {
            return match self.attribute(id, attribute) {
                Some(_) if is_boolean_property(name) => Property::Bool(true),
                Some(value) => Property::String(value.to_string()),
                None if is_boolean_property(name) => Property::Bool(false),
                None => Property::String(String::new()),
            };
        }
        if let Some(property) = self.element(id).and_then(|e| e.properties.get(name)) {
            return property.clone();
        }
        match name {
            "checked" | "selected" => Property::Bool(self.has_attribute(id, name)),
            "indeterminate" => Property::Bool(false),
            "value" => Property::String(self.attribute(id, "value").unwrap_or_default().to_string()),
            _ => Property::Null,
        }
    }

    pub fn set_property(&mut self, id: NodeId, name: &str, value: Property) {
        if let Some(attribute) = reflected_attribute(name) {
            match value {
                Property::Null | Property::Bool(false) => self.remove_attribute(id, attribute),
                Property::Bool(true) => self.set_attribute(id, attribute, ""),
                Property::String(value) if is_boolean_property(name) => {
                    if value.is_empty() {
                        self.remove_attribute(id, attribute);
                    } else {
                        self.set_attribute(id, attribute, "");
                    }
                }
                Property::String(value) => self.set_attribute(id, attribute, &value),
            }
            return;
        }
        if let Some(element) = self.element_mut(id) {
            element.properties.insert(name.to_string(), value);
        }
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Text(data) => out.push_str(data),
            NodeKind::Element(_) | NodeKind::Fragment => {
                for child in self.children(id) {
                    self.collect_text(child, out);
                }
            }
            NodeKind::Comment(_) | NodeKind::Doctype(_) => {}
        }
    }
}

fn reflected_attribute(property: &str) -> Option<&'static str> {
    REFLECTED_PROPERTIES
        .iter()
        .find(|(name, _)| *name == property)
        .map(|(_, attribute)| *attribute)
}

fn is_boolean_property(property: &str) -> bool {
    matches!(property, "disabled" | "readOnly" | "multiple")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(doc: &mut Document) -> (NodeId, [NodeId; 3]) {
        let parent = doc.create_element("ul");
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        let c = doc.create_text("c");
        doc.append_child(parent, a);
        doc.append_child(parent, b);
        doc.append_child(parent, c);
        (parent, [a, b, c])
    }

    mod tree {
        use super::*;

        #[test]
        fn test_insert_before_and_detach_keep_links_consistent() {
            let mut doc = Document::new();
            let (parent, [a, b, c]) = list(&mut doc);
            doc.insert_before(parent, c, Some(a));
            assert_eq!(doc.children(parent), vec![c, a, b]);
            doc.detach(a);
            assert_eq!(doc.children(parent), vec![c, b]);
            assert_eq!(doc.previous_sibling(b), Some(c));
            assert_eq!(doc.parent(a), None);
        }

        #[test]
        fn test_appending_a_fragment_moves_its_children() {
            let mut doc = Document::new();
            let (parent, [a, ..]) = list(&mut doc);
            let fragment = doc.create_fragment();
            let x = doc.create_text("x");
            let y = doc.create_text("y");
            doc.append_child(fragment, x);
            doc.append_child(fragment, y);
            doc.insert_before(parent, fragment, Some(a));
            assert_eq!(doc.text_content(parent), "xyabc");
            assert_eq!(doc.first_child(fragment), None);
        }

        #[test]
        fn test_split_text_inserts_trailing_node() {
            let mut doc = Document::new();
            let parent = doc.create_element("p");
            let text = doc.create_text("hello world");
            doc.append_child(parent, text);
            let tail = doc.split_text(text, 5).unwrap();
            assert_eq!(doc.data(text), Some("hello"));
            assert_eq!(doc.data(tail), Some(" world"));
            assert_eq!(doc.next_sibling(text), Some(tail));
        }
    }

    mod properties {
        use super::*;

        #[test]
        fn test_value_property_does_not_touch_attribute() {
            let mut doc = Document::new();
            let input = doc.create_element("input");
            doc.set_attribute(input, "value", "initial");
            assert_eq!(doc.property(input, "value"), Property::String("initial".into()));
            doc.set_property(input, "value", Property::String("typed".into()));
            assert_eq!(doc.property(input, "value"), Property::String("typed".into()));
            assert_eq!(doc.attribute(input, "value"), Some("initial"));
        }

        #[test]
        fn test_class_name_reflects_to_class_attribute() {
            let mut doc = Document::new();
            let div = doc.create_element("div");
            doc.set_property(div, "className", Property::String("a b".into()));
            assert_eq!(doc.attribute(div, "class"), Some("a b"));
            doc.set_property(div, "className", Property::Null);
            assert!(!doc.has_attribute(div, "class"));
        }

        #[test]
        fn test_checked_defaults_to_attribute_presence() {
            let mut doc = Document::new();
            let input = doc.create_element("input");
            assert_eq!(doc.property(input, "checked"), Property::Bool(false));
            doc.set_attribute(input, "checked", "");
            assert_eq!(doc.property(input, "checked"), Property::Bool(true));
        }
    }
}
