use weave_dom::escape_attribute;
use weave_dom::escape_html;
use weave_dom::is_raw_text_element;
use weave_dom::is_void_element;
use weave_templates::Attribute;
use weave_templates::AttributeValue;
use weave_templates::Content;
use weave_templates::Expression;
use weave_templates::Template;

use super::start_marker;
use super::END_MARKER;
use super::ITEM_MARKER;
use crate::contexts::ContextId;
use crate::error::ViewError;
use crate::eval::ResolvedPath;
use crate::page::Page;
use crate::value::TemplateValue;
use crate::value::Value;

/// Where rendered text ends up, which decides escaping and block markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    Html,
    /// Content of `<script>` and `<style>`.
    RawText,
    /// An attribute value; escaped once the whole value is known.
    Attribute,
}

pub(crate) struct Writer {
    pub out: String,
    pub mode: Mode,
    /// Collected dependencies of everything written, when tracking.
    pub dependencies: Option<Vec<ResolvedPath>>,
}

impl Writer {
    pub fn new(mode: Mode) -> Self {
        Self {
            out: String::new(),
            mode,
            dependencies: None,
        }
    }

    pub fn tracking(mode: Mode) -> Self {
        Self {
            dependencies: Some(Vec::new()),
            ..Self::new(mode)
        }
    }

    fn text(&mut self, text: &str) {
        match self.mode {
            Mode::Html => self.out.push_str(&escape_html(text)),
            Mode::RawText | Mode::Attribute => self.out.push_str(text),
        }
    }

    fn marker(&mut self, data: &str) {
        if self.mode == Mode::Html {
            self.out.push_str("<!--");
            self.out.push_str(data);
            self.out.push_str("-->");
        }
    }
}

impl Page {
    fn track(&self, writer: &mut Writer, expression: &Expression, context: ContextId) {
        if writer.dependencies.is_none() || !self.should_bind(context, expression) {
            return;
        }
        let dependencies = self.evaluator().dependencies(expression, context);
        if let Some(tracked) = &mut writer.dependencies {
            tracked.extend(dependencies);
        }
    }

    pub(crate) fn write_content(
        &mut self,
        content: &Content,
        context: ContextId,
        writer: &mut Writer,
    ) -> Result<(), ViewError> {
        for node in content {
            self.write(node, context, writer)?;
        }
        Ok(())
    }

    /// Render `template` as text.
    pub(crate) fn write(
        &mut self,
        template: &Template,
        context: ContextId,
        writer: &mut Writer,
    ) -> Result<(), ViewError> {
        match template {
            Template::Fragment(content) => self.write_content(content, context, writer)?,
            Template::Doctype(doctype) => {
                writer.out.push_str("<!DOCTYPE ");
                writer.out.push_str(doctype);
                writer.out.push('>');
            }
            Template::Text(text) => writer.text(text),
            Template::DynamicText(expression) if expression.is_unescaped() => {
                self.write_html(template, expression, context, writer)?;
            }
            Template::DynamicText(expression) => {
                self.track(writer, expression, context);
                match self.evaluator().get(expression, context)? {
                    Value::Template(value) => {
                        writer.marker(&start_marker(template));
                        self.write_template_value(&value, context, writer)?;
                        writer.marker(END_MARKER);
                    }
                    value => writer.text(&value.to_text()),
                }
            }
            Template::Comment(comment) => writer.marker(comment),
            Template::Html(html) => writer.out.push_str(html),
            Template::DynamicHtml(expression) => {
                self.write_html(template, expression, context, writer)?;
            }
            Template::Element(element) => {
                self.write_element(
                    &element.tag_name,
                    &element.attributes,
                    &element.content,
                    context,
                    writer,
                )?;
            }
            Template::DynamicElement(element) => {
                self.track(writer, &element.tag_name, context);
                let tag_name = self.evaluator().get(&element.tag_name, context)?.to_text();
                self.write_element(
                    &tag_name,
                    &element.attributes,
                    &element.content,
                    context,
                    writer,
                )?;
            }
            Template::Block(block) => {
                self.track(writer, &block.expression, context);
                writer.marker(&start_marker(template));
                let child = self.contexts.child(context, block.expression.clone());
                self.write_content(&block.content, child, writer)?;
                writer.marker(END_MARKER);
            }
            Template::ConditionalBlock(block) => {
                for expression in &block.expressions {
                    self.track(writer, expression, context);
                }
                writer.marker(&start_marker(template));
                if let Some(i) = self.branch(block, context)? {
                    let child = self.contexts.child(context, block.expressions[i].clone());
                    self.write_content(&block.contents[i], child, writer)?;
                }
                writer.marker(END_MARKER);
            }
            Template::EachBlock(block) => {
                self.track(writer, &block.expression, context);
                writer.marker(&start_marker(template));
                let len = self.each_length(&block.expression, context)?;
                if len == 0 {
                    if let Some(else_content) = &block.else_content {
                        self.write_content(else_content, context, writer)?;
                    }
                }
                for index in 0..len {
                    let item = self
                        .contexts
                        .each_child(context, block.expression.clone(), index);
                    writer.marker(ITEM_MARKER);
                    self.write_content(&block.content, item, writer)?;
                }
                writer.marker(END_MARKER);
            }
            Template::ViewInstance(instance) => {
                let view = self.find_view(&instance.name)?;
                let scope = self.instantiate(&view, instance, context, None)?;
                let result = self.write(&view.template, scope, writer);
                // A component rendered to a string does not outlive the write.
                if view.component.is_some() {
                    let controller = self.contexts.get(scope).controller;
                    self.retire(controller)?;
                }
                result?;
            }
            Template::ViewParent(inner) => {
                let outer = self.contexts.for_view_parent(context).unwrap_or(context);
                self.write(inner, outer, writer)?;
            }
        }
        Ok(())
    }

    fn write_html(
        &mut self,
        template: &Template,
        expression: &Expression,
        context: ContextId,
        writer: &mut Writer,
    ) -> Result<(), ViewError> {
        self.track(writer, expression, context);
        let html = self.evaluator().get(expression, context)?.to_text();
        writer.marker(&start_marker(template));
        writer.out.push_str(&html);
        writer.marker(END_MARKER);
        Ok(())
    }

    /// Render a template passed in as a value, in the scope it was captured in.
    pub(crate) fn write_template_value(
        &mut self,
        value: &TemplateValue,
        context: ContextId,
        writer: &mut Writer,
    ) -> Result<(), ViewError> {
        let context = self.template_context(value.closure, context);
        self.write(&value.template, context, writer)
    }

    fn write_element(
        &mut self,
        tag_name: &str,
        attributes: &[std::rc::Rc<Attribute>],
        content: &Content,
        context: ContextId,
        writer: &mut Writer,
    ) -> Result<(), ViewError> {
        writer.out.push('<');
        writer.out.push_str(tag_name);
        for attribute in attributes {
            self.write_attribute(attribute, context, writer)?;
        }
        writer.out.push('>');
        if is_void_element(tag_name) {
            return Ok(());
        }

        let mode = if is_raw_text_element(tag_name) {
            Mode::RawText
        } else {
            writer.mode
        };
        let outer = std::mem::replace(&mut writer.mode, mode);
        let result = self.write_content(content, context, writer);
        writer.mode = outer;
        result?;

        writer.out.push_str("</");
        writer.out.push_str(tag_name);
        writer.out.push('>');
        Ok(())
    }

    fn write_attribute(
        &mut self,
        attribute: &Attribute,
        context: ContextId,
        writer: &mut Writer,
    ) -> Result<(), ViewError> {
        let text = match &attribute.value {
            AttributeValue::Static(text) => Some(text.clone()),
            AttributeValue::Expression(expression) => {
                self.track(writer, expression, context);
                self.attribute_text(expression, context)?
            }
            AttributeValue::Template(template) => Some(self.render_attribute(
                template,
                context,
                &mut writer.dependencies,
            )?),
        };
        match text {
            None => {}
            Some(text) if text.is_empty() => {
                writer.out.push(' ');
                writer.out.push_str(&attribute.name);
            }
            Some(text) => {
                writer.out.push(' ');
                writer.out.push_str(&attribute.name);
                writer.out.push_str("=\"");
                writer.out.push_str(&escape_attribute(&text));
                writer.out.push('"');
            }
        }
        Ok(())
    }

    /// Render a template-valued attribute, adding its dependencies to `dependencies` when tracking.
    pub(crate) fn render_attribute(
        &mut self,
        template: &Template,
        context: ContextId,
        dependencies: &mut Option<Vec<ResolvedPath>>,
    ) -> Result<String, ViewError> {
        let mut inner = Writer {
            out: String::new(),
            mode: Mode::Attribute,
            dependencies: dependencies.take(),
        };
        let result = self.write(template, context, &mut inner);
        *dependencies = inner.dependencies;
        result?;
        Ok(inner.out)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde_json::json;
    use weave_model::JsonValue;
    use weave_model::Model;

    use crate::app::App;
    use crate::page::Page;

    fn render(source: &str, data: JsonValue) -> String {
        let mut app = App::new("test");
        app.function("upper", |args| {
            let text = args.first().map(|value| value.to_text()).unwrap_or_default();
            Ok(text.to_uppercase().as_str().into())
        });
        app.views_mut().register("Body", source).unwrap();
        let mut page = Page::new(Rc::new(app), Model::from_json(data).unwrap());
        page.render("Body").unwrap()
    }

    mod text {
        use super::*;

        #[test]
        fn test_dynamic_text() {
            let html = render("{{_page.key}}", json!({"_page": {"key": "green"}}));
            insta::assert_snapshot!(html, @"green");
        }

        #[test]
        fn test_brackets() {
            let html = render(
                "{{_page.colors[_page.key].name}}",
                json!({"_page": {"key": "green", "colors": {"green": {"name": "Green"}}}}),
            );
            insta::assert_snapshot!(html, @"Green");
        }

        #[test]
        fn test_escaping() {
            let html = render(
                "<p>{{_page.a}}</p>{{unescaped _page.a}}",
                json!({"_page": {"a": "<b>&</b>"}}),
            );
            insta::assert_snapshot!(html, @"<p>&lt;b&gt;&amp;&lt;/b&gt;</p><!--{{unescaped}}--><b>&</b><!--{{/}}-->");
        }

        #[test]
        fn test_missing_values_render_empty() {
            let html = render("<p>{{_page.nope}}|{{null}}</p>", json!({}));
            insta::assert_snapshot!(html, @"<p>|</p>");
        }

        #[test]
        fn test_function_call() {
            let html = render("{{upper(_page.name)}}", json!({"_page": {"name": "ann"}}));
            insta::assert_snapshot!(html, @"ANN");
        }

        #[test]
        fn test_script_content_is_raw() {
            let html = render("<script>a < b</script>", json!({}));
            insta::assert_snapshot!(html, @"<script>a < b</script>");
        }
    }

    mod attributes {
        use super::*;

        #[test]
        fn test_boolean_and_missing_attributes() {
            let html = render(
                "<input disabled=\"{{_page.yes}}\" checked=\"{{_page.no}}\" title=\"{{_page.none}}\">",
                json!({"_page": {"yes": true, "no": false}}),
            );
            insta::assert_snapshot!(html, @"<input disabled>");
        }

        #[test]
        fn test_template_valued_attribute() {
            let html = render(
                "<div class=\"item {{if _page.active}}active{{/if}}\"></div>",
                json!({"_page": {"active": true}}),
            );
            insta::assert_snapshot!(html, @r#"<div class="item active"></div>"#);
        }

        #[test]
        fn test_attribute_escaping() {
            let html = render("<a title=\"{{_page.t}}\"></a>", json!({"_page": {"t": "\"x\""}}));
            insta::assert_snapshot!(html, @r#"<a title="&quot;x&quot;"></a>"#);
        }
    }

    mod blocks {
        use super::*;

        #[test]
        fn test_each_with_else() {
            let source = "{{each _page.items}}{{this}}:{{else}}Nada{{/each}}";
            let empty = render(source, json!({"_page": {"items": []}}));
            insta::assert_snapshot!(empty, @"<!--{{each}}-->Nada<!--{{/}}-->");
            let full = render(source, json!({"_page": {"items": ["A", "B"]}}));
            insta::assert_snapshot!(full, @"<!--{{each}}--><!--{{item}}-->A:<!--{{item}}-->B:<!--{{/}}-->");
        }

        #[test]
        fn test_conditional_chain() {
            let source = "{{if _page.n > 1}}many{{else if _page.n}}one{{else}}none{{/if}}";
            let data = |n: i64| json!({"_page": {"n": n}});
            insta::assert_snapshot!(render(source, data(3)), @"<!--{{if}}-->many<!--{{/}}-->");
            insta::assert_snapshot!(render(source, data(1)), @"<!--{{if}}-->one<!--{{/}}-->");
            insta::assert_snapshot!(render(source, data(0)), @"<!--{{if}}-->none<!--{{/}}-->");
        }

        #[test]
        fn test_unless_and_empty_array() {
            let source = "{{unless _page.items}}empty{{/unless}}";
            let html = render(source, json!({"_page": {"items": []}}));
            insta::assert_snapshot!(html, @"<!--{{unless}}-->empty<!--{{/}}-->");
        }

        #[test]
        fn test_alias_shadowing() {
            let source = "{{with _page.a as #x}}{{#x.n}}{{with _page.b as #x}}{{#x.n}}{{/with}}{{#x.n}}{{/with}}";
            let html = render(source, json!({"_page": {"a": {"n": 1}, "b": {"n": 2}}}));
            insta::assert_snapshot!(html, @"<!--{{with}}-->1<!--{{with}}-->2<!--{{/}}-->1<!--{{/}}-->");
        }

        #[test]
        fn test_each_aliases() {
            let source = "{{each _page.items as #item, #i}}{{#i}}={{#item.name}} {{/each}}";
            let html = render(source, json!({"_page": {"items": [{"name": "a"}, {"name": "b"}]}}));
            insta::assert_snapshot!(html, @"<!--{{each}}--><!--{{item}}-->0=a <!--{{item}}-->1=b <!--{{/}}-->");
        }
    }

    #[test]
    fn test_render_is_idempotent() {
        let source = "<ul>{{each _page.items}}<li>{{this}}</li>{{/each}}</ul>";
        let data = json!({"_page": {"items": ["a", "b"]}});
        let app = App::new("test");
        app.views_mut().register("Body", source).unwrap();
        let mut page = Page::new(Rc::new(app), Model::from_json(data).unwrap());
        let first = page.render("Body").unwrap();
        let second = page.render("Body").unwrap();
        assert_eq!(first, second);
    }
}
