use std::rc::Rc;

use weave_dom::NodeId;
use weave_templates::EachBlock;
use weave_templates::Template;

use super::block_value;
use crate::bindings::BindingId;
use crate::bindings::BindingKind;
use crate::bindings::EachItem;
use crate::bindings::RangeState;
use crate::contexts::ContextId;
use crate::error::ViewError;
use crate::event_model::ListChange;
use crate::event_model::Notification;
use crate::page::Page;
use crate::value::Value;

impl Page {
    /// Bring the DOM owned by binding `id` up to date with the model.
    pub(crate) fn update_binding(
        &mut self,
        id: BindingId,
        notification: Notification,
    ) -> Result<(), ViewError> {
        let Some(binding) = self.bindings.get(id) else {
            return Ok(());
        };
        let context = binding.context;
        tracing::trace!(binding = %id, ?notification, "updating binding");

        match &binding.kind {
            BindingKind::Text { node, expression } => {
                let (node, expression) = (*node, expression.clone());
                let value = self.evaluator().get(&expression, context)?;
                if matches!(value, Value::Template(_)) {
                    // Templates render into a range, which takes over from this binding.
                    let template = Rc::new(Template::DynamicText(expression));
                    return self.replace_node(node, &template, context);
                }
                self.document.set_data(node, &value.to_text());
                let dependencies = self.evaluator().dependencies(&expression, context);
                self.set_dependencies(id, dependencies);
            }
            BindingKind::RawText { node, content } => {
                let (node, content) = (*node, content.clone());
                let (text, dependencies) = self.render_raw_text(&content, context)?;
                self.document.set_data(node, &text);
                self.set_dependencies(id, dependencies);
            }
            BindingKind::Attribute { element, attribute } => {
                let (element, attribute) = (*element, attribute.clone());
                let (value, dependencies) = self.evaluate_attribute(&attribute, context)?;
                self.apply_attribute(element, &attribute.name, &value);
                self.set_dependencies(id, dependencies);
            }
            BindingKind::Element { node, template } => {
                let (node, template) = (*node, template.clone());
                self.update_element(id, node, &template, context)?;
            }
            BindingKind::ComponentAttribute {
                controller,
                key,
                expression,
            } => {
                if self.controllers.get(*controller).is_destroyed() {
                    return Ok(());
                }
                let path = self.controllers.get(*controller).scope().child(key.as_str());
                let expression = expression.clone();
                let value = self.evaluator().get(&expression, context)?.into_json();
                let mutation = self.model.set(&path, value)?;
                self.apply(&mutation)?;
                let dependencies = self.evaluator().dependencies(&expression, context);
                self.set_dependencies(id, dependencies);
            }
            BindingKind::Range { .. } => self.update_range(id, notification)?,
        }
        Ok(())
    }

    /// Replace an element whose computed tag name changed.
    fn update_element(
        &mut self,
        id: BindingId,
        node: NodeId,
        template: &Rc<Template>,
        context: ContextId,
    ) -> Result<(), ViewError> {
        let Template::DynamicElement(element) = &**template else {
            return Ok(());
        };
        let tag_name = self.evaluator().get(&element.tag_name, context)?.to_text();
        if self.document.tag_name(node) == Some(tag_name.as_str()) {
            return Ok(());
        }
        tracing::trace!(binding = %id, tag_name, "replacing element");
        self.replace_node(node, template, context)
    }

    /// Render `template` in place of `node`. The replacement binds itself.
    fn replace_node(
        &mut self,
        node: NodeId,
        template: &Rc<Template>,
        context: ContextId,
    ) -> Result<(), ViewError> {
        let Some(parent) = self.document.parent(node) else {
            return Ok(());
        };
        let next = self.document.next_sibling(node);
        self.document.detach(node);
        self.destroy_tree(node);
        self.insert_template(template, context, parent, next)
    }

    fn update_range(&mut self, id: BindingId, notification: Notification) -> Result<(), ViewError> {
        let Some(binding) = self.bindings.get(id) else {
            return Ok(());
        };
        let BindingKind::Range {
            template,
            start,
            end,
            state,
        } = &binding.kind
        else {
            return Ok(());
        };
        let (template, start, end, context) = (template.clone(), *start, *end, binding.context);
        let previous = state.clone();

        if let (Template::EachBlock(block), Notification::List(change), RangeState::Each(items)) =
            (&*template, notification, &previous)
        {
            if let Some(items) = self.update_items(block, context, end, items.clone(), change)? {
                self.set_range_state(id, RangeState::Each(items));
                let dependencies = self.range_dependencies(&template, context);
                self.set_dependencies(id, dependencies);
                return Ok(());
            }
        }

        if let Some(current) = self.range_state(&template, context)? {
            if current == previous {
                let dependencies = self.range_dependencies(&template, context);
                self.set_dependencies(id, dependencies);
                return Ok(());
            }
        }

        let Some(parent) = self.document.parent(end) else {
            return Ok(());
        };
        self.clear_range(start, end);
        let fragment = self.document.create_fragment();
        let state = self.fill_range(&template, context, fragment)?;
        self.document.insert_before(parent, fragment, Some(end));
        self.set_range_state(id, state);
        let dependencies = self.range_dependencies(&template, context);
        self.set_dependencies(id, dependencies);
        Ok(())
    }

    /// What a range would render now, when that can be told without rendering it.
    fn range_state(
        &self,
        template: &Template,
        context: ContextId,
    ) -> Result<Option<RangeState>, ViewError> {
        Ok(match template {
            Template::Block(block) => {
                let value = self.evaluator().get(&block.expression, context)?;
                block_value(&value).map(|value| RangeState::Value(Some(value)))
            }
            Template::DynamicText(expression) | Template::DynamicHtml(expression) => {
                let value = self.evaluator().get(expression, context)?;
                block_value(&value).map(|value| RangeState::Value(Some(value)))
            }
            Template::ConditionalBlock(block) => Some(RangeState::Branch(self.branch(block, context)?)),
            _ => None,
        })
    }

    fn set_range_state(&mut self, id: BindingId, next: RangeState) {
        if let Some(binding) = self.bindings.get_mut(id) {
            if let BindingKind::Range { state, .. } = &mut binding.kind {
                *state = next;
            }
        }
    }

    /// Apply a list change to rendered each items. `None` asks for a full
    /// re-render, needed whenever the else content comes or goes.
    fn update_items(
        &mut self,
        block: &EachBlock,
        context: ContextId,
        end: NodeId,
        mut items: Vec<EachItem>,
        change: ListChange,
    ) -> Result<Option<Vec<EachItem>>, ViewError> {
        let Some(parent) = self.document.parent(end) else {
            return Ok(None);
        };
        match change {
            ListChange::Insert { index, how_many } => {
                if items.is_empty() || index > items.len() {
                    return Ok(None);
                }
                let reference = items.get(index).map_or(end, |item| item.start);
                let fragment = self.document.create_fragment();
                let inserted = (index..index + how_many)
                    .map(|i| self.append_item(block, context, i, fragment))
                    .collect::<Result<Vec<_>, _>>()?;
                self.document.insert_before(parent, fragment, Some(reference));
                items.splice(index..index, inserted);
            }
            ListChange::Remove { index, how_many } => {
                let stop = index + how_many;
                if stop > items.len() || stop - index == items.len() {
                    return Ok(None);
                }
                for i in index..stop {
                    let until = items.get(i + 1).map_or(end, |item| item.start);
                    for node in self.item_nodes(items[i].start, until) {
                        self.document.detach(node);
                        self.destroy_tree(node);
                    }
                }
                items.drain(index..stop);
            }
            ListChange::Move { from, to, how_many } => {
                if from + how_many > items.len() || to + how_many > items.len() {
                    return Ok(None);
                }
                let until = items.get(from + how_many).map_or(end, |item| item.start);
                let fragment = self.document.create_fragment();
                for node in self.item_nodes(items[from].start, until) {
                    self.document.append_child(fragment, node);
                }
                let moved: Vec<EachItem> = items.drain(from..from + how_many).collect();
                let reference = items.get(to).map_or(end, |item| item.start);
                self.document.insert_before(parent, fragment, Some(reference));
                items.splice(to..to, moved);
            }
        }
        Ok(Some(items))
    }

    /// Nodes from `start` up to, not including, `until`.
    fn item_nodes(&self, start: NodeId, until: NodeId) -> Vec<NodeId> {
        std::iter::successors(Some(start), |node| self.document.next_sibling(*node))
            .take_while(|node| *node != until)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use serde_json::json;
    use weave_dom::NodeId;
    use weave_model::JsonValue;
    use weave_model::Model;

    use crate::app::App;
    use crate::page::Page;

    fn page(source: &str, data: JsonValue) -> (Page, NodeId) {
        let app = App::new("test");
        app.views_mut().register("Body", source).unwrap();
        let mut page = Page::new(Rc::new(app), Model::from_json(data).unwrap());
        let body = page.document_mut().create_element("body");
        page.append_to("Body", body).unwrap();
        (page, body)
    }

    fn html(page: &Page, body: NodeId) -> String {
        page.document().inner_html(body)
    }

    mod text {
        use super::*;

        #[test]
        fn test_text_follows_model() {
            let (mut page, body) = page("<p>{{_page.a}}</p>", json!({"_page": {"a": 1}}));
            page.set("_page.a", json!(2)).unwrap();
            insta::assert_snapshot!(html(&page, body), @"<p>2</p>");
        }

        #[test]
        fn test_bracket_key_change_rebinds() {
            let data = json!({"_page": {"key": "a", "colors": {"a": "red", "b": "blue"}}});
            let (mut page, body) = page("{{_page.colors[_page.key]}}", data);
            page.set("_page.key", json!("b")).unwrap();
            assert_eq!(html(&page, body), "blue");
            page.set("_page.colors.b", json!("navy")).unwrap();
            assert_eq!(html(&page, body), "navy");
            page.set("_page.colors.a", json!("pink")).unwrap();
            assert_eq!(html(&page, body), "navy");
        }

        #[test]
        fn test_unbound_text_stays() {
            let (mut page, body) = page("{{unbound _page.a}}|{{_page.a}}", json!({"_page": {"a": 1}}));
            page.set("_page.a", json!(2)).unwrap();
            assert_eq!(html(&page, body), "1|2");
        }

        #[test]
        fn test_raw_text_element() {
            let (mut page, body) = page("<style>p { color: {{_page.c}} }</style>", json!({"_page": {"c": "red"}}));
            page.set("_page.c", json!("blue")).unwrap();
            assert_eq!(html(&page, body), "<style>p { color: blue }</style>");
        }
    }

    mod attributes {
        use super::*;

        #[test]
        fn test_attribute_removed_when_false() {
            let (mut page, body) = page("<a title=\"{{_page.t}}\"></a>", json!({"_page": {"t": "x"}}));
            page.set("_page.t", json!(false)).unwrap();
            assert_eq!(html(&page, body), "<a></a>");
        }

        #[test]
        fn test_template_attribute() {
            let (mut page, body) = page(
                "<div class=\"a {{_page.b}}\"></div>",
                json!({"_page": {"b": "b"}}),
            );
            page.set("_page.b", json!("c")).unwrap();
            assert_eq!(html(&page, body), r#"<div class="a c"></div>"#);
        }
    }

    mod ranges {
        use super::*;

        #[test]
        fn test_each_else_transitions() {
            let source = "{{each _page.items}}{{this}}:{{else}}Nada{{/each}}";
            let (mut page, body) = page(source, json!({"_page": {"items": []}}));
            insta::assert_snapshot!(html(&page, body), @"<!--{{each}}-->Nada<!--{{/}}-->");
            page.push("_page.items", json!("A")).unwrap();
            page.push("_page.items", json!("B")).unwrap();
            insta::assert_snapshot!(html(&page, body), @"<!--{{each}}--><!--{{item}}-->A:<!--{{item}}-->B:<!--{{/}}-->");
            page.remove("_page.items", 0, 2).unwrap();
            insta::assert_snapshot!(html(&page, body), @"<!--{{each}}-->Nada<!--{{/}}-->");
        }

        #[test]
        fn test_each_matches_fresh_render() {
            let source = "{{each _page.items as #item, #i}}<b>{{#i}}{{#item}}</b>{{/each}}";
            let (mut page, body) = page(source, json!({"_page": {"items": ["a", "b", "c", "d"]}}));
            page.insert("_page.items", 1, vec![json!("x"), json!("y")]).unwrap();
            page.remove("_page.items", 4, 1).unwrap();
            page.move_items("_page.items", 0, 3, 2).unwrap();
            page.set("_page.items.0", json!("z")).unwrap();
            assert_eq!(html(&page, body), page.render("Body").unwrap());
        }

        #[test]
        fn test_item_indexes_shift_on_insert() {
            let source = "{{each _page.items as #item, #i}}{{#i}}{{#item}} {{/each}}";
            let (mut page, body) = page(source, json!({"_page": {"items": ["a", "b"]}}));
            page.insert("_page.items", 0, vec![json!("x")]).unwrap();
            insta::assert_snapshot!(
                html(&page, body),
                @"<!--{{each}}--><!--{{item}}-->0x <!--{{item}}-->1a <!--{{item}}-->2b <!--{{/}}-->"
            );
            page.move_items("_page.items", 2, 0, 1).unwrap();
            page.remove("_page.items", 1, 1).unwrap();
            assert_eq!(html(&page, body), page.render("Body").unwrap());
            insta::assert_snapshot!(
                html(&page, body),
                @"<!--{{each}}--><!--{{item}}-->0b <!--{{item}}-->1a <!--{{/}}-->"
            );
        }

        #[test]
        fn test_conditional_switches_branch() {
            let source = "{{if _page.on}}<b>on</b>{{else}}<i>off</i>{{/if}}";
            let (mut page, body) = page(source, json!({"_page": {"on": true}}));
            page.set("_page.on", json!(false)).unwrap();
            insta::assert_snapshot!(html(&page, body), @"<!--{{if}}--><i>off</i><!--{{/}}-->");
        }

        #[test]
        fn test_unchanged_branch_keeps_nodes() {
            let source = "{{if _page.n}}<b>{{_page.n}}</b>{{/if}}";
            let (mut page, body) = page(source, json!({"_page": {"n": 1}}));
            let bold = page.document().children(body)[1];
            page.set("_page.n", json!(2)).unwrap();
            assert_eq!(page.document().children(body)[1], bold);
            assert_eq!(html(&page, body), "<!--{{if}}--><b>2</b><!--{{/}}-->");
        }

        #[test]
        fn test_with_block_rescopes_this() {
            let source = "{{with _page.user}}{{this.name}}{{/with}}";
            let (mut page, body) = page(source, json!({"_page": {"user": {"name": "Ann"}}}));
            page.set("_page.user", json!({"name": "Bo"})).unwrap();
            assert_eq!(html(&page, body), "<!--{{with}}-->Bo<!--{{/}}-->");
        }

        #[test]
        fn test_dynamic_html() {
            let (mut page, body) = page("{{unescaped _page.h}}", json!({"_page": {"h": "<b>1</b>"}}));
            page.set("_page.h", json!("<i>2</i>")).unwrap();
            assert_eq!(html(&page, body), "<!--{{unescaped}}--><i>2</i><!--{{/}}-->");
        }

        #[test]
        fn test_dynamic_element() {
            let source = "<tag is=\"{{_page.tag}}\">x</tag>";
            let (mut page, body) = page(source, json!({"_page": {"tag": "b"}}));
            page.set("_page.tag", json!("i")).unwrap();
            assert_eq!(html(&page, body), "<i>x</i>");
            assert_eq!(page.binding_count(), 1);
        }
    }
}
