use std::rc::Rc;

use weave_dom::is_raw_text_element;
use weave_dom::is_void_element;
use weave_dom::NodeId;
use weave_templates::Attribute;
use weave_templates::AttributeValue;
use weave_templates::Content;
use weave_templates::EachBlock;
use weave_templates::MarkupHook;
use weave_templates::Template;
use weave_templates::ViewInstance;

use super::block_value;
use super::start_marker;
use super::Mode;
use super::Writer;
use super::END_MARKER;
use super::ITEM_MARKER;
use crate::bindings::BindingKind;
use crate::bindings::EachItem;
use crate::bindings::RangeState;
use crate::contexts::ContextId;
use crate::error::ViewError;
use crate::eval::ResolvedPath;
use crate::page::Listener;
use crate::page::Page;
use crate::page::Task;
use crate::value::Value;

impl Page {
    pub(crate) fn append_content(
        &mut self,
        content: &Content,
        context: ContextId,
        parent: NodeId,
    ) -> Result<(), ViewError> {
        for node in content {
            self.append(node, context, parent)?;
        }
        Ok(())
    }

    /// Render `template` into new nodes at the end of `parent`, binding them.
    pub(crate) fn append(
        &mut self,
        template: &Rc<Template>,
        context: ContextId,
        parent: NodeId,
    ) -> Result<(), ViewError> {
        match &**template {
            Template::Fragment(content) => self.append_content(content, context, parent)?,
            Template::Doctype(doctype) => {
                let node = self.document.create_doctype(doctype);
                self.document.append_child(parent, node);
            }
            Template::Text(text) => {
                let node = self.document.create_text(text);
                self.document.append_child(parent, node);
            }
            Template::DynamicText(expression) if !expression.is_unescaped() => {
                let value = self.evaluator().get(expression, context)?;
                if matches!(value, Value::Template(_)) {
                    return self.append_range(template, context, parent);
                }
                let node = self.document.create_text(&value.to_text());
                self.document.append_child(parent, node);
                if self.should_bind(context, expression) {
                    let dependencies = self.evaluator().dependencies(expression, context);
                    let kind = BindingKind::Text {
                        node,
                        expression: expression.clone(),
                    };
                    self.bind(kind, context, node, dependencies);
                }
            }
            Template::Comment(comment) => {
                let node = self.document.create_comment(comment);
                self.document.append_child(parent, node);
            }
            Template::Html(html) => {
                let fragment = self.document.parse_fragment(html)?;
                self.document.append_child(parent, fragment);
            }
            Template::DynamicText(_)
            | Template::DynamicHtml(_)
            | Template::Block(_)
            | Template::ConditionalBlock(_)
            | Template::EachBlock(_) => self.append_range(template, context, parent)?,
            Template::Element(element) => {
                let node = self.append_element(&element.tag_name, &element.attributes, context, parent)?;
                self.apply_hooks(node, &element.hooks, context)?;
                self.append_children(node, &element.tag_name, &element.content, context)?;
            }
            Template::DynamicElement(element) => {
                let tag_name = self.evaluator().get(&element.tag_name, context)?.to_text();
                let node = self.append_element(&tag_name, &element.attributes, context, parent)?;
                self.apply_hooks(node, &element.hooks, context)?;
                self.append_children(node, &tag_name, &element.content, context)?;
                if self.should_bind(context, &element.tag_name) {
                    let dependencies = self.evaluator().dependencies(&element.tag_name, context);
                    let kind = BindingKind::Element {
                        node,
                        template: template.clone(),
                    };
                    self.bind(kind, context, node, dependencies);
                }
            }
            Template::ViewInstance(instance) => self.append_instance(instance, context, parent)?,
            Template::ViewParent(inner) => {
                let outer = self.contexts.for_view_parent(context).unwrap_or(context);
                self.append(inner, outer, parent)?;
            }
        }
        Ok(())
    }

    /// Render `template` into `parent` just before `reference`.
    pub(crate) fn insert_template(
        &mut self,
        template: &Rc<Template>,
        context: ContextId,
        parent: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), ViewError> {
        let fragment = self.document.create_fragment();
        self.append(template, context, fragment)?;
        self.document.insert_before(parent, fragment, reference);
        Ok(())
    }

    fn append_range(
        &mut self,
        template: &Rc<Template>,
        context: ContextId,
        parent: NodeId,
    ) -> Result<(), ViewError> {
        let start = self.document.create_comment(&start_marker(template));
        self.document.append_child(parent, start);
        let state = self.fill_range(template, context, parent)?;
        let end = self.document.create_comment(END_MARKER);
        self.document.append_child(parent, end);

        let dependencies = self.range_dependencies(template, context);
        let kind = BindingKind::Range {
            template: template.clone(),
            start,
            end,
            state,
        };
        self.bind(kind, context, start, dependencies);
        Ok(())
    }

    /// Render what goes between the markers of a range, returning what was rendered.
    pub(crate) fn fill_range(
        &mut self,
        template: &Rc<Template>,
        context: ContextId,
        parent: NodeId,
    ) -> Result<RangeState, ViewError> {
        match &**template {
            Template::Block(block) => {
                let value = self.evaluator().get(&block.expression, context)?;
                let child = self.contexts.child(context, block.expression.clone());
                self.append_content(&block.content, child, parent)?;
                Ok(RangeState::Value(block_value(&value)))
            }
            Template::ConditionalBlock(block) => {
                let branch = self.branch(block, context)?;
                if let Some(i) = branch {
                    let child = self.contexts.child(context, block.expressions[i].clone());
                    self.append_content(&block.contents[i], child, parent)?;
                }
                Ok(RangeState::Branch(branch))
            }
            Template::EachBlock(block) => {
                let len = self.each_length(&block.expression, context)?;
                if len == 0 {
                    if let Some(else_content) = &block.else_content {
                        self.append_content(else_content, context, parent)?;
                    }
                }
                let items = (0..len)
                    .map(|index| self.append_item(block, context, index, parent))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RangeState::Each(items))
            }
            Template::DynamicText(expression) | Template::DynamicHtml(expression) => {
                let value = self.evaluator().get(expression, context)?;
                match value {
                    Value::Template(value) => {
                        let inner = self.template_context(value.closure, context);
                        self.append(&value.template, inner, parent)?;
                        Ok(RangeState::Value(None))
                    }
                    value => {
                        let raw = matches!(&**template, Template::DynamicHtml(_))
                            || expression.is_unescaped();
                        if raw {
                            let fragment = self.document.parse_fragment(&value.to_text())?;
                            self.document.append_child(parent, fragment);
                        } else {
                            let node = self.document.create_text(&value.to_text());
                            self.document.append_child(parent, node);
                        }
                        Ok(RangeState::Value(block_value(&value)))
                    }
                }
            }
            _ => Ok(RangeState::Empty),
        }
    }

    /// Render one each-block item, led by its item marker.
    pub(crate) fn append_item(
        &mut self,
        block: &EachBlock,
        context: ContextId,
        index: usize,
        parent: NodeId,
    ) -> Result<EachItem, ViewError> {
        let start = self.document.create_comment(ITEM_MARKER);
        self.document.append_child(parent, start);
        let item = self.item_context(block, context, index, start);
        self.append_content(&block.content, item, parent)?;
        Ok(EachItem {
            context: item,
            start,
        })
    }

    fn append_element(
        &mut self,
        tag_name: &str,
        attributes: &[Rc<Attribute>],
        context: ContextId,
        parent: NodeId,
    ) -> Result<NodeId, ViewError> {
        let element = self.document.create_element(tag_name);
        for attribute in attributes {
            if let AttributeValue::Static(text) = &attribute.value {
                self.document.set_attribute(element, &attribute.name, text);
                continue;
            }
            let (value, dependencies) = self.evaluate_attribute(attribute, context)?;
            self.apply_attribute(element, &attribute.name, &value);
            self.bind_attribute(element, attribute, context, dependencies);
        }
        self.document.append_child(parent, element);
        Ok(element)
    }

    pub(crate) fn bind_attribute(
        &mut self,
        element: NodeId,
        attribute: &Rc<Attribute>,
        context: ContextId,
        dependencies: Vec<ResolvedPath>,
    ) {
        let kind = BindingKind::Attribute {
            element,
            attribute: attribute.clone(),
        };
        self.bind(kind, context, element, dependencies);
    }

    fn append_children(
        &mut self,
        element: NodeId,
        tag_name: &str,
        content: &Content,
        context: ContextId,
    ) -> Result<(), ViewError> {
        if is_void_element(tag_name) {
            return Ok(());
        }
        if !is_raw_text_element(tag_name) {
            return self.append_content(content, context, element);
        }
        let content = Template::fragment(content.clone());
        let (text, dependencies) = self.render_raw_text(&content, context)?;
        let node = self.document.create_text(&text);
        self.document.append_child(element, node);
        self.bind(BindingKind::RawText { node, content }, context, node, dependencies);
        Ok(())
    }

    /// Text of a `<script>` or `<style>` element.
    pub(crate) fn render_raw_text(
        &mut self,
        content: &Template,
        context: ContextId,
    ) -> Result<(String, Vec<ResolvedPath>), ViewError> {
        let mut writer = Writer::tracking(Mode::RawText);
        self.write(content, context, &mut writer)?;
        Ok((writer.out, writer.dependencies.unwrap_or_default()))
    }

    /// Register the listeners and element refs of `element`.
    pub(crate) fn apply_hooks(
        &mut self,
        element: NodeId,
        hooks: &[MarkupHook],
        context: ContextId,
    ) -> Result<(), ViewError> {
        let controller = self.contexts.get(context).controller;
        for hook in hooks {
            let (task, name) = match hook {
                MarkupHook::On { event, expression } => {
                    self.node_meta(element).listeners.push(Listener {
                        event: event.clone(),
                        expression: expression.clone(),
                        context,
                    });
                    continue;
                }
                MarkupHook::As { name } => (
                    Task::SetElement {
                        controller,
                        name: name.clone(),
                        node: element,
                    },
                    name,
                ),
                MarkupHook::AsArray { name } => (
                    Task::PushElement {
                        controller,
                        name: name.clone(),
                        node: element,
                    },
                    name,
                ),
                MarkupHook::AsObject { name, key } => {
                    let key = self.evaluator().get(key, context)?.to_text();
                    (
                        Task::InsertElement {
                            controller,
                            name: name.clone(),
                            key,
                            node: element,
                        },
                        name,
                    )
                }
            };
            self.meta.queue(task);
            self.node_meta(element).destroy.push(Task::RemoveElement {
                controller,
                name: name.clone(),
                node: element,
            });
        }
        Ok(())
    }

    fn append_instance(
        &mut self,
        instance: &ViewInstance,
        context: ContextId,
        parent: NodeId,
    ) -> Result<(), ViewError> {
        let view = self.find_view(&instance.name)?;
        let anchor = view.component.is_some().then(|| {
            let anchor = self.document.create_text("");
            self.document.append_child(parent, anchor);
            anchor
        });
        let child = self.instantiate(&view, instance, context, anchor)?;
        self.append(&view.template, child, parent)
    }
}
