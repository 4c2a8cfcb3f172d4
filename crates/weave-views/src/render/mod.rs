//! Rendering of template trees: to strings, to fresh DOM, onto existing DOM,
//! and the incremental patches that keep bound DOM current.

mod attach;
mod dom;
mod instance;
mod string;
mod update;

use weave_dom::NodeId;
use weave_dom::Property;
use weave_model::JsonValue;
use weave_templates::Attribute;
use weave_templates::AttributeValue;
use weave_templates::BindType;
use weave_templates::BlockType;
use weave_templates::ConditionalBlock;
use weave_templates::EachBlock;
use weave_templates::Expression;
use weave_templates::Template;

pub(crate) use self::string::Mode;
pub(crate) use self::string::Writer;
use crate::bindings::Binding;
use crate::bindings::BindingId;
use crate::bindings::BindingKind;
use crate::contexts::ContextId;
use crate::error::ViewError;
use crate::eval::ResolvedPath;
use crate::page::NodeMeta;
use crate::page::Page;
use crate::page::Task;
use crate::value::Value;

const END_MARKER: &str = "{{/}}";
const ITEM_MARKER: &str = "{{item}}";

/// Data of the comment that opens the range `template` renders into.
fn start_marker(template: &Template) -> String {
    let keyword = match template {
        Template::Block(block) => block
            .expression
            .block_type()
            .map_or("with", BlockType::as_str),
        Template::ConditionalBlock(block) => block
            .expressions
            .first()
            .and_then(|expression| expression.block_type())
            .map_or("if", BlockType::as_str),
        Template::EachBlock(_) => "each",
        Template::DynamicHtml(_) => "unescaped",
        Template::DynamicText(expression) if expression.is_unescaped() => "unescaped",
        _ => "view",
    };
    format!("{{{{{keyword}}}}}")
}

/// Attributes set as DOM properties, since the attribute only seeds their live state.
fn property_name(attribute: &str) -> Option<&'static str> {
    Some(match attribute {
        "value" => "value",
        "checked" => "checked",
        "selected" => "selected",
        "indeterminate" => "indeterminate",
        "disabled" => "disabled",
        "readonly" => "readOnly",
        "class" => "className",
        _ => return None,
    })
}

fn property_value(property: &str, value: &Value) -> Property {
    match property {
        "value" => Property::String(value.to_text()),
        "className" => match value {
            Value::Json(JsonValue::Bool(false)) => Property::Null,
            value if value.is_nullish() => Property::Null,
            value => Property::String(value.to_text()),
        },
        _ => Property::Bool(value.is_truthy()),
    }
}

/// Value of a block expression as remembered by its range. Objects and arrays
/// always count as changed.
fn block_value(value: &Value) -> Option<JsonValue> {
    match value {
        Value::Json(JsonValue::Array(_) | JsonValue::Object(_))
        | Value::Template(_)
        | Value::Node(_)
        | Value::NonFinite(_) => None,
        Value::Undefined => Some(JsonValue::Null),
        Value::Json(value) => Some(value.clone()),
    }
}

impl Page {
    /// Whether `expression` in `context` gets a live binding.
    pub(crate) fn should_bind(&self, context: ContextId, expression: &Expression) -> bool {
        match expression.bind_type() {
            Some(BindType::Bound) => true,
            Some(BindType::Unbound) => false,
            None => !self.contexts.get(context).unbound,
        }
    }

    pub(crate) fn node_meta(&mut self, node: NodeId) -> &mut NodeMeta {
        self.nodes.entry(node).or_default()
    }

    /// Create a binding owned by `owner`. Nothing is created when there is
    /// nothing to depend on.
    pub(crate) fn bind(
        &mut self,
        kind: BindingKind,
        context: ContextId,
        owner: NodeId,
        dependencies: Vec<ResolvedPath>,
    ) -> Option<BindingId> {
        if dependencies.is_empty() {
            return None;
        }
        let id = self.bindings.insert(Binding::new(kind, context));
        tracing::trace!(binding = %id, node = %owner, "created binding");
        self.set_dependencies(id, dependencies);
        self.node_meta(owner).bindings.push(id);
        Some(id)
    }

    /// Re-register `id` when its dependencies changed.
    pub(crate) fn set_dependencies(&mut self, id: BindingId, dependencies: Vec<ResolvedPath>) {
        let Some(binding) = self.bindings.get_mut(id) else {
            return;
        };
        if binding.dependencies == dependencies && !binding.registrations.is_empty() {
            return;
        }
        let previous = std::mem::take(&mut binding.registrations);
        for node in previous {
            self.events.remove_binding(node, id);
        }
        let registrations: Vec<_> = dependencies
            .iter()
            .filter_map(|path| self.events.add_binding(path, id, &self.contexts))
            .collect();
        if let Some(binding) = self.bindings.get_mut(id) {
            binding.dependencies = dependencies;
            binding.registrations = registrations;
        }
    }

    pub(crate) fn unbind(&mut self, id: BindingId) {
        let Some(binding) = self.bindings.remove(id) else {
            return;
        };
        for node in binding.registrations {
            self.events.remove_binding(node, id);
        }
    }

    fn release(&mut self, meta: &NodeMeta) {
        for id in &meta.bindings {
            self.unbind(*id);
        }
        if let Some((node, item)) = meta.item {
            self.events.remove_item(node, item);
        }
    }

    /// Forget the render state of `node` and everything under it, queueing its destroy tasks.
    pub(crate) fn destroy_tree(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            if let Some(meta) = self.nodes.remove(&node) {
                self.release(&meta);
                for task in meta.destroy {
                    self.meta.queue(task);
                }
            }
            stack.extend(self.document.children(node));
        }
    }

    /// Drop the render state under `parent` without running any hooks.
    pub(crate) fn discard(&mut self, parent: NodeId) -> Result<(), ViewError> {
        let mut stack = self.document.children(parent);
        while let Some(node) = stack.pop() {
            if let Some(meta) = self.nodes.remove(&node) {
                self.release(&meta);
                for task in meta.destroy {
                    if let Task::Destroy(controller) = task {
                        self.retire(controller)?;
                    }
                }
            }
            stack.extend(self.document.children(node));
        }
        Ok(())
    }

    /// Detach and destroy the nodes strictly between `start` and `end`.
    pub(crate) fn clear_range(&mut self, start: NodeId, end: NodeId) {
        while let Some(node) = self.document.next_sibling(start) {
            if node == end {
                break;
            }
            self.document.detach(node);
            self.destroy_tree(node);
        }
    }

    /// Index of the first branch whose guard passes.
    pub(crate) fn branch(
        &self,
        block: &ConditionalBlock,
        context: ContextId,
    ) -> Result<Option<usize>, ViewError> {
        for (i, expression) in block.expressions.iter().enumerate() {
            let truthy = self
                .evaluator()
                .get(expression, context)?
                .is_template_truthy();
            let passes = if expression.block_type() == Some(BlockType::Unless) {
                !truthy
            } else {
                truthy
            };
            if passes {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// What the range rendered for `template` depends on; empty when it is not bound.
    pub(crate) fn range_dependencies(
        &self,
        template: &Template,
        context: ContextId,
    ) -> Vec<ResolvedPath> {
        let expressions: Vec<&Expression> = match template {
            Template::Block(block) => vec![&*block.expression],
            Template::EachBlock(block) => vec![&*block.expression],
            Template::ConditionalBlock(block) => {
                block.expressions.iter().map(|expression| &**expression).collect()
            }
            Template::DynamicText(expression) | Template::DynamicHtml(expression) => {
                vec![&**expression]
            }
            _ => Vec::new(),
        };
        expressions
            .into_iter()
            .filter(|expression| self.should_bind(context, expression))
            .flat_map(|expression| self.evaluator().dependencies(expression, context))
            .collect()
    }

    /// Scope of item `index` of an each block, led by the marker `start`.
    /// Bound items are tracked by the event model so list changes move them.
    pub(crate) fn item_context(
        &mut self,
        block: &EachBlock,
        context: ContextId,
        index: usize,
        start: NodeId,
    ) -> ContextId {
        let item = self
            .contexts
            .each_child(context, block.expression.clone(), index);
        if !self.should_bind(context, &block.expression) {
            return item;
        }
        let Some(path) = self.evaluator().resolve(&block.expression, context) else {
            return item;
        };
        if let Some(node) = self.events.add_item(&path, item, &self.contexts) {
            self.node_meta(start).item = Some((node, item));
        }
        item
    }

    /// Number of items an each block renders; anything but an array has none.
    pub(crate) fn each_length(
        &self,
        expression: &Expression,
        context: ContextId,
    ) -> Result<usize, ViewError> {
        let value = self.evaluator().get(expression, context)?;
        Ok(value.as_array().map_or(0, Vec::len))
    }

    /// Value of an attribute expression as text, `None` when the attribute is omitted.
    pub(crate) fn attribute_text(
        &mut self,
        expression: &Expression,
        context: ContextId,
    ) -> Result<Option<String>, ViewError> {
        let value = self.evaluator().get(expression, context)?;
        Ok(match value {
            Value::Json(JsonValue::Bool(true)) => Some(String::new()),
            Value::Json(JsonValue::Bool(false)) => None,
            Value::Template(template) => {
                let mut writer = Writer::new(Mode::Attribute);
                self.write_template_value(&template, context, &mut writer)?;
                Some(writer.out)
            }
            value if value.is_nullish() => None,
            value => Some(value.to_text()),
        })
    }

    /// Apply an attribute value to an element, through a property where one exists.
    pub(crate) fn apply_attribute(&mut self, element: NodeId, name: &str, value: &Value) {
        if let Some(property) = property_name(name) {
            let property_value = property_value(property, value);
            self.document.set_property(element, property, property_value);
            return;
        }
        match value {
            Value::Json(JsonValue::Bool(true)) => self.document.set_attribute(element, name, ""),
            Value::Json(JsonValue::Bool(false)) => self.document.remove_attribute(element, name),
            value if value.is_nullish() => self.document.remove_attribute(element, name),
            value => self
                .document
                .set_attribute(element, name, &value.to_text()),
        }
    }

    /// Current value of a dynamic attribute, with what it depends on when bound.
    pub(crate) fn evaluate_attribute(
        &mut self,
        attribute: &Attribute,
        context: ContextId,
    ) -> Result<(Value, Vec<ResolvedPath>), ViewError> {
        match &attribute.value {
            AttributeValue::Static(text) => Ok((Value::from(text.as_str()), Vec::new())),
            AttributeValue::Expression(expression) => {
                let mut dependencies = self
                    .should_bind(context, expression)
                    .then(|| self.evaluator().dependencies(expression, context));
                let value = match self.evaluator().get(expression, context)? {
                    Value::Template(template) => {
                        let context = self.template_context(template.closure, context);
                        let text = self.render_attribute(&template.template, context, &mut dependencies)?;
                        Value::from(text.as_str())
                    }
                    value => value,
                };
                Ok((value, dependencies.unwrap_or_default()))
            }
            AttributeValue::Template(template) => {
                let mut dependencies = Some(Vec::new());
                let text = self.render_attribute(template, context, &mut dependencies)?;
                Ok((Value::from(text.as_str()), dependencies.unwrap_or_default()))
            }
        }
    }

    /// The scope a passed-in template renders in.
    pub(crate) fn template_context(
        &mut self,
        closure: Option<ContextId>,
        context: ContextId,
    ) -> ContextId {
        match closure {
            Some(closure) => self.contexts.closure_child(context, closure),
            None => context,
        }
    }
}
