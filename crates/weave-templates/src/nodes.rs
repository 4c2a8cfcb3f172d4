use std::rc::Rc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::expressions::Expression;

/// A sequence of sibling template nodes.
pub type Content = Vec<Rc<Template>>;

/// A compiled template node.
///
/// Trees are immutable and shared (`Rc`) between every render of a view; the
/// render state lives in contexts and bindings, never in the tree.
#[derive(Debug, PartialEq, Serialize)]
pub enum Template {
    Fragment(Content),
    Doctype(String),
    Text(String),
    DynamicText(Rc<Expression>),
    Comment(String),
    /// Literal markup emitted without escaping.
    Html(String),
    DynamicHtml(Rc<Expression>),
    Element(Element),
    DynamicElement(DynamicElement),
    Block(Block),
    ConditionalBlock(ConditionalBlock),
    EachBlock(EachBlock),
    ViewInstance(ViewInstance),
    /// Content passed into a view, evaluated in the scope outside the view.
    ViewParent(Rc<Template>),
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Element {
    pub tag_name: String,
    pub attributes: Vec<Rc<Attribute>>,
    pub hooks: Vec<MarkupHook>,
    pub content: Content,
}

impl Element {
    #[must_use]
    pub fn is_void(&self) -> bool {
        weave_dom::is_void_element(&self.tag_name)
    }
}

/// An element whose tag name is computed (`<tag is="{{expr}}">`).
#[derive(Debug, PartialEq, Serialize)]
pub struct DynamicElement {
    pub tag_name: Rc<Expression>,
    pub attributes: Vec<Rc<Attribute>>,
    pub hooks: Vec<MarkupHook>,
    pub content: Content,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

#[derive(Debug, PartialEq, Serialize)]
pub enum AttributeValue {
    Static(String),
    /// A value that is exactly one `{{expr}}`.
    Expression(Rc<Expression>),
    /// Text mixed with tags, rendered to a string.
    Template(Rc<Template>),
}

impl Attribute {
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        !matches!(self.value, AttributeValue::Static(_))
    }
}

/// Behavior attached to an element rather than rendered into it.
#[derive(Debug, PartialEq, Serialize)]
pub enum MarkupHook {
    /// `on-<event>="handler(args)"`
    On {
        event: String,
        expression: Rc<Expression>,
    },
    /// `as="name"`: store the element under `name` on the controller.
    As { name: String },
    /// `as-array="name"`: collect elements into a list under `name`.
    AsArray { name: String },
    /// `as-object="name, key"`: collect elements into a map under `name`.
    AsObject {
        name: String,
        key: Rc<Expression>,
    },
}

/// `with`, `on`, `unbound` and `bound` blocks: content rendered in a child scope.
#[derive(Debug, PartialEq, Serialize)]
pub struct Block {
    pub expression: Rc<Expression>,
    pub content: Content,
}

/// `if` / `unless` / `else if` / `else` chains.
#[derive(Debug, PartialEq, Serialize)]
pub struct ConditionalBlock {
    pub expressions: Vec<Rc<Expression>>,
    pub contents: Vec<Content>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct EachBlock {
    pub expression: Rc<Expression>,
    pub content: Content,
    pub else_content: Option<Content>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ViewInstance {
    pub name: String,
    pub attributes: Vec<(String, ViewAttribute)>,
}

impl ViewInstance {
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&ViewAttribute> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// An attribute passed to a view instance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ViewAttribute {
    /// Copied once into the view.
    Literal(JsonValue),
    /// Evaluated in the caller's scope.
    Expression(Rc<Expression>),
    /// Rendered lazily, in the caller's scope.
    Template(Rc<Template>),
}

impl Template {
    #[must_use]
    pub fn fragment(content: Content) -> Rc<Self> {
        Rc::new(Template::Fragment(content))
    }

    /// Name of the node kind, as used by the serialized form.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Template::Fragment(_) => "Fragment",
            Template::Doctype(_) => "Doctype",
            Template::Text(_) => "Text",
            Template::DynamicText(_) => "DynamicText",
            Template::Comment(_) => "Comment",
            Template::Html(_) => "Html",
            Template::DynamicHtml(_) => "DynamicHtml",
            Template::Element(_) => "Element",
            Template::DynamicElement(_) => "DynamicElement",
            Template::Block(_) => "Block",
            Template::ConditionalBlock(_) => "ConditionalBlock",
            Template::EachBlock(_) => "EachBlock",
            Template::ViewInstance(_) => "ViewInstance",
            Template::ViewParent(_) => "ViewParent",
        }
    }

    /// Whether rendering this node can depend on model data.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            Template::Doctype(_) | Template::Text(_) | Template::Comment(_) | Template::Html(_) => {
                false
            }
            Template::Fragment(content) => content.iter().any(|node| node.is_dynamic()),
            Template::Element(element) => {
                element.attributes.iter().any(|a| a.is_dynamic())
                    || !element.hooks.is_empty()
                    || element.content.iter().any(|node| node.is_dynamic())
            }
            Template::ViewParent(inner) => inner.is_dynamic(),
            _ => true,
        }
    }

    /// Names of every view this template instantiates, in document order.
    #[must_use]
    pub fn view_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_view_names(&mut names);
        names
    }

    fn collect_view_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        let visit = |content: &'a Content, names: &mut Vec<&'a str>| {
            for node in content {
                node.collect_view_names(names);
            }
        };
        match self {
            Template::Fragment(content) => visit(content, names),
            Template::Element(Element { content, .. })
            | Template::DynamicElement(DynamicElement { content, .. })
            | Template::Block(Block { content, .. }) => visit(content, names),
            Template::ConditionalBlock(block) => {
                for content in &block.contents {
                    visit(content, names);
                }
            }
            Template::EachBlock(block) => {
                visit(&block.content, names);
                if let Some(else_content) = &block.else_content {
                    visit(else_content, names);
                }
            }
            Template::ViewInstance(instance) => {
                names.push(&instance.name);
                for (_, attribute) in &instance.attributes {
                    if let ViewAttribute::Template(template) = attribute {
                        template.collect_view_names(names);
                    }
                }
            }
            Template::ViewParent(inner) => inner.collect_view_names(names),
            Template::Doctype(_)
            | Template::Text(_)
            | Template::DynamicText(_)
            | Template::Comment(_)
            | Template::Html(_)
            | Template::DynamicHtml(_) => {}
        }
    }
}
