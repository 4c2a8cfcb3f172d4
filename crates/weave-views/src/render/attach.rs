//! Binding templates to markup rendered earlier, usually on a server.
//!
//! Attaching walks the template and the existing nodes together with a
//! cursor. Text that the browser would have merged is split back apart, and
//! empty dynamic text, which leaves no trace in markup, gets a fresh node.
//! Anything else that does not line up is an [`ViewError::Attach`].

use std::rc::Rc;

use weave_dom::is_raw_text_element;
use weave_dom::is_void_element;
use weave_dom::NodeId;
use weave_dom::NodeKind;
use weave_templates::Attribute;
use weave_templates::Content;
use weave_templates::MarkupHook;
use weave_templates::Template;
use weave_templates::ViewInstance;

use super::block_value;
use super::start_marker;
use super::END_MARKER;
use super::ITEM_MARKER;
use crate::bindings::BindingKind;
use crate::bindings::EachItem;
use crate::bindings::RangeState;
use crate::contexts::ContextId;
use crate::error::ViewError;
use crate::page::Page;
use crate::value::Value;

type Cursor = Option<NodeId>;

impl Page {
    /// Describe `node` for error messages.
    pub(crate) fn describe(&self, node: Cursor) -> String {
        let Some(node) = node else {
            return "end of content".to_string();
        };
        match self.document.kind(node) {
            NodeKind::Fragment => "fragment".to_string(),
            NodeKind::Element(element) => format!("<{}>", element.tag_name()),
            NodeKind::Text(data) => format!("text {data:?}"),
            NodeKind::Comment(data) => format!("comment {data:?}"),
            NodeKind::Doctype(data) => format!("doctype {data:?}"),
        }
    }

    fn mismatch(&self, expected: impl Into<String>, found: Cursor) -> ViewError {
        ViewError::Attach {
            expected: expected.into(),
            found: self.describe(found),
        }
    }

    fn attach_content(
        &mut self,
        content: &Content,
        context: ContextId,
        parent: NodeId,
        mut cursor: Cursor,
    ) -> Result<Cursor, ViewError> {
        for node in content {
            cursor = self.attach(node, context, parent, cursor)?;
        }
        Ok(cursor)
    }

    /// Bind `template` to the children of `parent` starting at `cursor`,
    /// returning the first node it did not consume.
    pub(crate) fn attach(
        &mut self,
        template: &Rc<Template>,
        context: ContextId,
        parent: NodeId,
        cursor: Cursor,
    ) -> Result<Cursor, ViewError> {
        match &**template {
            Template::Fragment(content) => self.attach_content(content, context, parent, cursor),
            Template::Doctype(_) => match cursor {
                Some(node) if matches!(self.document.kind(node), NodeKind::Doctype(_)) => {
                    Ok(self.document.next_sibling(node))
                }
                _ => Err(self.mismatch("doctype", cursor)),
            },
            Template::Text(text) => Ok(self.attach_text(text, parent, cursor)?.1),
            Template::DynamicText(expression) if !expression.is_unescaped() => {
                let value = self.evaluator().get(expression, context)?;
                if matches!(value, Value::Template(_)) {
                    return self.attach_range(template, context, parent, cursor);
                }
                let (node, next) = self.attach_text(&value.to_text(), parent, cursor)?;
                if self.should_bind(context, expression) {
                    let dependencies = self.evaluator().dependencies(expression, context);
                    let kind = BindingKind::Text {
                        node,
                        expression: expression.clone(),
                    };
                    self.bind(kind, context, node, dependencies);
                }
                Ok(next)
            }
            Template::Comment(comment) => self.attach_comment(comment, cursor),
            Template::Html(html) => self.attach_html(html, parent, cursor),
            Template::DynamicText(_)
            | Template::DynamicHtml(_)
            | Template::Block(_)
            | Template::ConditionalBlock(_)
            | Template::EachBlock(_) => self.attach_range(template, context, parent, cursor),
            Template::Element(element) => {
                let node = self.expect_element(&element.tag_name, cursor)?;
                self.attach_element(
                    node,
                    &element.tag_name,
                    &element.attributes,
                    &element.hooks,
                    &element.content,
                    context,
                )?;
                Ok(self.document.next_sibling(node))
            }
            Template::DynamicElement(element) => {
                let tag_name = self.evaluator().get(&element.tag_name, context)?.to_text();
                let node = self.expect_element(&tag_name, cursor)?;
                self.attach_element(
                    node,
                    &tag_name,
                    &element.attributes,
                    &element.hooks,
                    &element.content,
                    context,
                )?;
                if self.should_bind(context, &element.tag_name) {
                    let dependencies = self.evaluator().dependencies(&element.tag_name, context);
                    let kind = BindingKind::Element {
                        node,
                        template: template.clone(),
                    };
                    self.bind(kind, context, node, dependencies);
                }
                Ok(self.document.next_sibling(node))
            }
            Template::ViewInstance(instance) => {
                self.attach_instance(instance, context, parent, cursor)
            }
            Template::ViewParent(inner) => {
                let outer = self.contexts.for_view_parent(context).unwrap_or(context);
                self.attach(inner, outer, parent, cursor)
            }
        }
    }

    /// Consume `text` from the text node at `cursor`, splitting it when the
    /// node holds more.
    fn attach_text(
        &mut self,
        text: &str,
        parent: NodeId,
        cursor: Cursor,
    ) -> Result<(NodeId, Cursor), ViewError> {
        if text.is_empty() {
            let node = self.document.create_text("");
            self.document.insert_before(parent, node, cursor);
            return Ok((node, cursor));
        }
        let Some(node) = cursor.filter(|node| self.document.is_text(*node)) else {
            return Err(self.mismatch(format!("text {text:?}"), cursor));
        };
        let data = self.document.data(node).unwrap_or_default();
        if data == text {
            return Ok((node, self.document.next_sibling(node)));
        }
        if data.starts_with(text) {
            let rest = self.document.split_text(node, text.len())?;
            return Ok((node, Some(rest)));
        }
        Err(self.mismatch(format!("text {text:?}"), cursor))
    }

    fn attach_comment(&mut self, data: &str, cursor: Cursor) -> Result<Cursor, ViewError> {
        self.expect_comment(data, cursor)
            .map(|node| self.document.next_sibling(node))
    }

    fn expect_comment(&self, data: &str, cursor: Cursor) -> Result<NodeId, ViewError> {
        match cursor {
            Some(node) if self.document.is_comment(node) && self.document.data(node) == Some(data) => {
                Ok(node)
            }
            _ => Err(self.mismatch(format!("comment {data:?}"), cursor)),
        }
    }

    fn expect_element(&self, tag_name: &str, cursor: Cursor) -> Result<NodeId, ViewError> {
        match cursor {
            Some(node)
                if self
                    .document
                    .tag_name(node)
                    .is_some_and(|found| found.eq_ignore_ascii_case(tag_name)) =>
            {
                Ok(node)
            }
            _ => Err(self.mismatch(format!("<{tag_name}>"), cursor)),
        }
    }

    /// Match literal markup node by node against what it parses to.
    fn attach_html(&mut self, html: &str, parent: NodeId, mut cursor: Cursor) -> Result<Cursor, ViewError> {
        let scratch = self.document.parse_fragment(html)?;
        for node in self.document.children(scratch) {
            cursor = match self.document.kind(node).clone() {
                NodeKind::Text(text) => self.attach_text(&text, parent, cursor)?.1,
                NodeKind::Comment(data) => self.attach_comment(&data, cursor)?,
                NodeKind::Element(element) => {
                    let found = self.expect_element(element.tag_name(), cursor)?;
                    self.document.next_sibling(found)
                }
                NodeKind::Doctype(_) | NodeKind::Fragment => match cursor {
                    Some(found) => self.document.next_sibling(found),
                    None => return Err(self.mismatch("doctype", cursor)),
                },
            };
        }
        Ok(cursor)
    }

    fn attach_range(
        &mut self,
        template: &Rc<Template>,
        context: ContextId,
        parent: NodeId,
        cursor: Cursor,
    ) -> Result<Cursor, ViewError> {
        let start = self.expect_comment(&start_marker(template), cursor)?;
        let cursor = self.document.next_sibling(start);
        let (state, cursor) = self.attach_range_content(template, context, parent, cursor)?;
        let end = self.expect_comment(END_MARKER, cursor)?;

        let dependencies = self.range_dependencies(template, context);
        let kind = BindingKind::Range {
            template: template.clone(),
            start,
            end,
            state,
        };
        self.bind(kind, context, start, dependencies);
        Ok(self.document.next_sibling(end))
    }

    fn attach_range_content(
        &mut self,
        template: &Rc<Template>,
        context: ContextId,
        parent: NodeId,
        mut cursor: Cursor,
    ) -> Result<(RangeState, Cursor), ViewError> {
        match &**template {
            Template::Block(block) => {
                let value = self.evaluator().get(&block.expression, context)?;
                let child = self.contexts.child(context, block.expression.clone());
                let cursor = self.attach_content(&block.content, child, parent, cursor)?;
                Ok((RangeState::Value(block_value(&value)), cursor))
            }
            Template::ConditionalBlock(block) => {
                let branch = self.branch(block, context)?;
                if let Some(i) = branch {
                    let child = self.contexts.child(context, block.expressions[i].clone());
                    cursor = self.attach_content(&block.contents[i], child, parent, cursor)?;
                }
                Ok((RangeState::Branch(branch), cursor))
            }
            Template::EachBlock(block) => {
                let len = self.each_length(&block.expression, context)?;
                if len == 0 {
                    if let Some(else_content) = &block.else_content {
                        cursor = self.attach_content(else_content, context, parent, cursor)?;
                    }
                }
                let mut items = Vec::with_capacity(len);
                for index in 0..len {
                    let start = self.expect_comment(ITEM_MARKER, cursor)?;
                    let item = self.item_context(block, context, index, start);
                    cursor = self.document.next_sibling(start);
                    cursor = self.attach_content(&block.content, item, parent, cursor)?;
                    items.push(EachItem {
                        context: item,
                        start,
                    });
                }
                Ok((RangeState::Each(items), cursor))
            }
            Template::DynamicText(expression) | Template::DynamicHtml(expression) => {
                match self.evaluator().get(expression, context)? {
                    Value::Template(value) => {
                        let inner = self.template_context(value.closure, context);
                        let cursor = self.attach(&value.template, inner, parent, cursor)?;
                        Ok((RangeState::Value(None), cursor))
                    }
                    value => {
                        let raw = matches!(&**template, Template::DynamicHtml(_))
                            || expression.is_unescaped();
                        let text = value.to_text();
                        let cursor = if raw {
                            self.attach_html(&text, parent, cursor)?
                        } else {
                            self.attach_text(&text, parent, cursor)?.1
                        };
                        Ok((RangeState::Value(block_value(&value)), cursor))
                    }
                }
            }
            _ => Ok((RangeState::Empty, cursor)),
        }
    }

    fn attach_element(
        &mut self,
        element: NodeId,
        tag_name: &str,
        attributes: &[Rc<Attribute>],
        hooks: &[MarkupHook],
        content: &Content,
        context: ContextId,
    ) -> Result<(), ViewError> {
        for attribute in attributes.iter().filter(|attribute| attribute.is_dynamic()) {
            let (_, dependencies) = self.evaluate_attribute(attribute, context)?;
            self.bind_attribute(element, attribute, context, dependencies);
        }
        self.apply_hooks(element, hooks, context)?;
        if is_void_element(tag_name) {
            return Ok(());
        }

        let first = self.document.first_child(element);
        if is_raw_text_element(tag_name) {
            let content = Template::fragment(content.clone());
            let (text, dependencies) = self.render_raw_text(&content, context)?;
            let (node, rest) = self.attach_text(&text, element, first)?;
            if rest.is_some() {
                return Err(self.mismatch(format!("end of <{tag_name}>"), rest));
            }
            self.bind(BindingKind::RawText { node, content }, context, node, dependencies);
            return Ok(());
        }

        let rest = self.attach_content(content, context, element, first)?;
        if rest.is_some() {
            return Err(self.mismatch(format!("end of <{tag_name}>"), rest));
        }
        Ok(())
    }

    fn attach_instance(
        &mut self,
        instance: &ViewInstance,
        context: ContextId,
        parent: NodeId,
        cursor: Cursor,
    ) -> Result<Cursor, ViewError> {
        let view = self.find_view(&instance.name)?;
        let anchor = view.component.is_some().then(|| {
            let anchor = self.document.create_text("");
            self.document.insert_before(parent, anchor, cursor);
            anchor
        });
        let child = self.instantiate(&view, instance, context, anchor)?;
        self.attach(&view.template, child, parent, cursor)
    }
}
