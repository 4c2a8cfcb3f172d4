use std::rc::Rc;

use serde_json::Value as JsonValue;
use weave_dom::is_void_element;
use weave_dom::unescape;

use crate::error::ExpressionError;
use crate::error::SourceContext;
use crate::error::TemplateError;
use crate::expression_parser::parse_expression;
use crate::expression_parser::parse_tag;
use crate::expression_parser::unknown_block_keyword;
use crate::expression_parser::TagContent;
use crate::expressions::BlockType;
use crate::expressions::Expression;
use crate::expressions::ExpressionKind;
use crate::lexer::LexError;
use crate::lexer::Lexer;
use crate::nodes::Attribute;
use crate::nodes::AttributeValue;
use crate::nodes::Block;
use crate::nodes::ConditionalBlock;
use crate::nodes::Content;
use crate::nodes::DynamicElement;
use crate::nodes::EachBlock;
use crate::nodes::Element;
use crate::nodes::MarkupHook;
use crate::nodes::Template;
use crate::nodes::ViewAttribute;
use crate::nodes::ViewInstance;
use crate::tokens::RawAttribute;
use crate::tokens::Token;

/// Why [`Parser::parse_content`] stopped.
#[derive(Debug)]
enum Stop {
    Eof,
    EndTag { name: String, offset: usize },
    Else { expression: Expression, offset: usize },
    Close { name: Option<String>, offset: usize },
}

pub struct Parser<'a> {
    context: SourceContext<'a>,
    tokens: Vec<Token>,
    current: usize,
}

impl<'a> Parser<'a> {
    /// Lex `source[start..end]` of a larger file so errors report positions in
    /// the whole file.
    pub(crate) fn for_range(
        context: SourceContext<'a>,
        start: usize,
        end: usize,
    ) -> Result<Self, TemplateError> {
        let text = context.source.get(start..end).unwrap_or_default();
        let tokens = Lexer::with_base(text, start)
            .tokenize()
            .map_err(|err| lex_error(context, &err))?;
        Ok(Self {
            context,
            tokens,
            current: 0,
        })
    }

    fn with_tokens(&self, tokens: Vec<Token>) -> Self {
        Self {
            context: self.context,
            tokens,
            current: 0,
        }
    }

    pub fn parse(mut self) -> Result<Rc<Template>, TemplateError> {
        let (content, stop) = self.parse_content()?;
        match stop {
            Stop::Eof => Ok(Template::fragment(content)),
            Stop::EndTag { name, offset } => {
                Err(self.parse_error(format!("unexpected end tag `</{name}>`"), offset))
            }
            Stop::Else { offset, .. } => Err(self.parse_error("`{{else}}` outside a block", offset)),
            Stop::Close { offset, .. } => {
                Err(self.parse_error("closing tag without an open block", offset))
            }
        }
    }

    fn next(&mut self) -> Token {
        let token = self
            .tokens
            .get(self.current)
            .cloned()
            .unwrap_or(Token::Eof { offset: 0 });
        self.current += 1;
        token
    }

    fn parse_content(&mut self) -> Result<(Content, Stop), TemplateError> {
        let mut content = Vec::new();
        loop {
            let node = match self.next() {
                Token::Text { content: text, .. } => Template::Text(unescape(&text)),
                Token::Comment { content: text, .. } => Template::Comment(text),
                Token::Doctype { content: text, .. } => Template::Doctype(text),
                Token::Tag {
                    content: text,
                    offset,
                } => match self.tag(&text, offset)? {
                    TagContent::Expression(expression) if expression.is_unescaped() => {
                        Template::DynamicHtml(Rc::new(expression))
                    }
                    TagContent::Expression(expression) => {
                        Template::DynamicText(Rc::new(expression))
                    }
                    TagContent::Open(expression) => self.parse_block(expression, offset)?,
                    TagContent::Else(expression) => {
                        return Ok((content, Stop::Else { expression, offset }))
                    }
                    TagContent::Close(name) => return Ok((content, Stop::Close { name, offset })),
                },
                Token::StartTag {
                    name,
                    attributes,
                    self_closing,
                    offset,
                } => self.parse_element(name, attributes, self_closing, offset)?,
                Token::EndTag { name, offset } => {
                    return Ok((content, Stop::EndTag { name, offset }))
                }
                Token::Eof { .. } => return Ok((content, Stop::Eof)),
            };
            content.push(Rc::new(node));
        }
    }

    fn tag(&self, text: &str, offset: usize) -> Result<TagContent, TemplateError> {
        parse_tag(text).map_err(|err| match unknown_block_keyword(text) {
            Some(keyword) => TemplateError::UnknownBlock {
                keyword: keyword.to_string(),
                context: self.context.describe(offset),
            },
            None => self.expression_error(text, &err, offset),
        })
    }

    fn parse_block(
        &mut self,
        expression: Expression,
        offset: usize,
    ) -> Result<Template, TemplateError> {
        let block_type = expression.block_type().unwrap_or(BlockType::With);
        let keyword = block_type.as_str();
        let expression = Rc::new(expression);

        match block_type {
            BlockType::If | BlockType::Unless => {
                let mut expressions = vec![expression];
                let mut contents = Vec::new();
                loop {
                    let (content, stop) = self.parse_content()?;
                    contents.push(content);
                    match stop {
                        Stop::Else {
                            expression: guard,
                            offset: else_offset,
                        } => {
                            if expressions
                                .last()
                                .is_some_and(|last| matches!(last.kind, ExpressionKind::Else))
                            {
                                return Err(
                                    self.parse_error("`{{else}}` after a final `{{else}}`", else_offset)
                                );
                            }
                            expressions.push(Rc::new(guard));
                        }
                        stop => {
                            self.close_block(keyword, offset, stop)?;
                            break;
                        }
                    }
                }
                Ok(Template::ConditionalBlock(ConditionalBlock {
                    expressions,
                    contents,
                }))
            }
            BlockType::Each => {
                let (content, stop) = self.parse_content()?;
                let (else_content, stop) = match stop {
                    Stop::Else {
                        expression: guard,
                        offset: else_offset,
                    } => {
                        if !matches!(guard.kind, ExpressionKind::Else) {
                            return Err(self.parse_error(
                                "`each` blocks only take a bare `{{else}}`",
                                else_offset,
                            ));
                        }
                        let (else_content, stop) = self.parse_content()?;
                        (Some(else_content), stop)
                    }
                    stop => (None, stop),
                };
                self.close_block(keyword, offset, stop)?;
                Ok(Template::EachBlock(EachBlock {
                    expression,
                    content,
                    else_content,
                }))
            }
            _ => {
                let (content, stop) = self.parse_content()?;
                if let Stop::Else { offset, .. } = stop {
                    return Err(self.parse_error(format!("`{keyword}` blocks have no `{{{{else}}}}`"), offset));
                }
                self.close_block(keyword, offset, stop)?;
                Ok(Template::Block(Block {
                    expression,
                    content,
                }))
            }
        }
    }

    fn close_block(&self, keyword: &str, opened_at: usize, stop: Stop) -> Result<(), TemplateError> {
        match stop {
            Stop::Close { name: None, .. } => Ok(()),
            Stop::Close {
                name: Some(name), ..
            } if name == keyword => Ok(()),
            Stop::Close {
                name: Some(name),
                offset,
            } => Err(TemplateError::MismatchedBlock {
                expected: keyword.to_string(),
                found: name,
                context: self.context.describe(offset),
            }),
            Stop::Eof | Stop::EndTag { .. } | Stop::Else { .. } => {
                Err(TemplateError::UnclosedBlock {
                    block: keyword.to_string(),
                    context: self.context.describe(opened_at),
                })
            }
        }
    }

    fn parse_element(
        &mut self,
        tag_name: String,
        raw_attributes: Vec<RawAttribute>,
        self_closing: bool,
        offset: usize,
    ) -> Result<Template, TemplateError> {
        if tag_name == "view" || tag_name.contains(':') {
            return self.parse_view_instance(tag_name, raw_attributes, self_closing, offset);
        }

        let mut attributes = Vec::new();
        let mut hooks = Vec::new();
        let mut dynamic_tag = None;
        for raw in raw_attributes {
            let value = raw.value.as_deref().unwrap_or_default();
            if let Some(event) = raw.name.strip_prefix("on-") {
                hooks.push(MarkupHook::On {
                    event: event.to_string(),
                    expression: Rc::new(self.hook_expression(value, raw.offset)?),
                });
                continue;
            }
            match raw.name.as_str() {
                "as" => hooks.push(MarkupHook::As {
                    name: value.trim().to_string(),
                }),
                "as-array" => hooks.push(MarkupHook::AsArray {
                    name: value.trim().to_string(),
                }),
                "as-object" => {
                    let (name, key) = value.split_once(',').ok_or_else(|| {
                        self.parse_error("`as-object` needs a name and a key expression", raw.offset)
                    })?;
                    hooks.push(MarkupHook::AsObject {
                        name: name.trim().to_string(),
                        key: Rc::new(self.hook_expression(key, raw.offset)?),
                    });
                }
                _ => {
                    let value = self.attribute_value(&raw)?;
                    match value {
                        AttributeValue::Expression(expression) if raw.name == "is" => {
                            dynamic_tag = Some(expression);
                        }
                        value => attributes.push(Rc::new(Attribute {
                            name: raw.name,
                            value,
                        })),
                    }
                }
            }
        }

        let content = if self_closing || is_void_element(&tag_name) {
            Vec::new()
        } else {
            self.element_content(&tag_name, offset)?
        };

        Ok(match dynamic_tag {
            Some(tag_name) => Template::DynamicElement(DynamicElement {
                tag_name,
                attributes,
                hooks,
                content,
            }),
            None => Template::Element(Element {
                tag_name,
                attributes,
                hooks,
                content,
            }),
        })
    }

    fn element_content(&mut self, tag_name: &str, offset: usize) -> Result<Content, TemplateError> {
        let (content, stop) = self.parse_content()?;
        match stop {
            Stop::EndTag { name, .. } if name.eq_ignore_ascii_case(tag_name) => Ok(content),
            _ => Err(TemplateError::UnclosedElement {
                tag: tag_name.to_string(),
                context: self.context.describe(offset),
            }),
        }
    }

    fn parse_view_instance(
        &mut self,
        tag_name: String,
        raw_attributes: Vec<RawAttribute>,
        self_closing: bool,
        offset: usize,
    ) -> Result<Template, TemplateError> {
        let mut name = (tag_name != "view").then(|| tag_name.clone());
        let mut attributes = Vec::new();
        for raw in raw_attributes {
            if tag_name == "view" && raw.name == "is" {
                name = raw.value.clone();
                continue;
            }
            let value = match raw.value.as_deref() {
                None => ViewAttribute::Literal(JsonValue::Bool(true)),
                Some(_) => match self.attribute_value(&raw)? {
                    AttributeValue::Static(text) => ViewAttribute::Literal(JsonValue::String(text)),
                    AttributeValue::Expression(expression) => match &expression.kind {
                        ExpressionKind::Literal(value) => ViewAttribute::Literal(value.clone()),
                        _ => ViewAttribute::Expression(expression),
                    },
                    AttributeValue::Template(template) => {
                        ViewAttribute::Template(Rc::new(Template::ViewParent(template)))
                    }
                },
            };
            attributes.push((dash_to_camel(&raw.name), value));
        }
        let name = name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| self.parse_error("`<view>` needs an `is` attribute", offset))?;

        if !self_closing {
            let content = self.element_content(&tag_name, offset)?;
            let blank = content
                .iter()
                .all(|node| matches!(&**node, Template::Text(text) if text.trim().is_empty()));
            if !blank && !attributes.iter().any(|(key, _)| key == "content") {
                let template = Template::fragment(content);
                attributes.push((
                    "content".to_string(),
                    ViewAttribute::Template(Rc::new(Template::ViewParent(template))),
                ));
            }
        }

        Ok(Template::ViewInstance(ViewInstance { name, attributes }))
    }

    fn attribute_value(&self, raw: &RawAttribute) -> Result<AttributeValue, TemplateError> {
        let Some(value) = raw.value.as_deref() else {
            return Ok(AttributeValue::Static(String::new()));
        };
        if !value.contains("{{") {
            return Ok(AttributeValue::Static(unescape(value)));
        }
        let tokens = Lexer::attribute_value(value, raw.offset)
            .tokenize()
            .map_err(|err| lex_error(self.context, &err))?;
        if let [Token::Tag { content, offset }, Token::Eof { .. }] = tokens.as_slice() {
            if let TagContent::Expression(expression) = self.tag(content, *offset)? {
                return Ok(AttributeValue::Expression(Rc::new(expression)));
            }
        }
        let template = self.with_tokens(tokens).parse()?;
        Ok(AttributeValue::Template(template))
    }

    /// Handler expressions may be written bare (`on-click="save()"`) or wrapped.
    fn hook_expression(&self, value: &str, offset: usize) -> Result<Expression, TemplateError> {
        let trimmed = value.trim();
        let source = trimmed
            .strip_prefix("{{")
            .and_then(|inner| inner.strip_suffix("}}"))
            .unwrap_or(trimmed)
            .trim();
        parse_expression(source).map_err(|err| self.expression_error(source, &err, offset))
    }

    fn expression_error(&self, source: &str, err: &ExpressionError, offset: usize) -> TemplateError {
        TemplateError::Expression {
            expression: source.to_string(),
            message: err.to_string(),
            context: self.context.describe(offset),
        }
    }

    fn parse_error(&self, message: impl Into<String>, offset: usize) -> TemplateError {
        TemplateError::Parse {
            message: message.into(),
            context: self.context.describe(offset),
        }
    }
}

fn lex_error(context: SourceContext<'_>, err: &LexError) -> TemplateError {
    TemplateError::Parse {
        message: err.message.clone(),
        context: context.describe(err.offset),
    }
}

/// View attributes are read as `@camelCase`.
fn dash_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '-' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use weave_model::Segment;

    use super::*;
    use crate::parse;

    fn single(source: &str) -> Rc<Template> {
        let template = parse(source).unwrap();
        let Template::Fragment(content) = &*template else {
            panic!("expected a fragment");
        };
        assert_eq!(content.len(), 1, "expected one node in {content:?}");
        content[0].clone()
    }

    mod markup {
        use super::*;

        #[test]
        fn test_text_is_unescaped() {
            assert_eq!(*single("a &amp; b"), Template::Text("a & b".to_string()));
        }

        #[test]
        fn test_element_with_attributes() {
            let node = single(r#"<input type="text" value="{{_page.text}}" disabled>"#);
            let Template::Element(element) = &*node else {
                panic!("expected an element");
            };
            assert_eq!(element.tag_name, "input");
            assert!(element.content.is_empty());
            assert_eq!(element.attributes.len(), 3);
            assert_eq!(element.attributes[0].value, AttributeValue::Static("text".to_string()));
            assert!(matches!(element.attributes[1].value, AttributeValue::Expression(_)));
            assert_eq!(element.attributes[2].value, AttributeValue::Static(String::new()));
        }

        #[test]
        fn test_mixed_attribute_is_a_template() {
            let node = single(r#"<div class="item {{if active}}active{{/if}}"></div>"#);
            let Template::Element(element) = &*node else {
                panic!("expected an element");
            };
            let AttributeValue::Template(template) = &element.attributes[0].value else {
                panic!("expected a template attribute");
            };
            let Template::Fragment(parts) = &**template else {
                panic!("expected a fragment");
            };
            assert_eq!(*parts[0], Template::Text("item ".to_string()));
            assert!(matches!(*parts[1], Template::ConditionalBlock(_)));
        }

        #[test]
        fn test_hooks() {
            let node = single(
                r#"<li on-click="select(#item)" as="row" as-object="rows, #item.id"></li>"#,
            );
            let Template::Element(element) = &*node else {
                panic!("expected an element");
            };
            assert!(element.attributes.is_empty());
            assert!(matches!(&element.hooks[0], MarkupHook::On { event, .. } if event == "click"));
            assert_eq!(
                element.hooks[1],
                MarkupHook::As {
                    name: "row".to_string()
                }
            );
            assert!(matches!(&element.hooks[2], MarkupHook::AsObject { name, .. } if name == "rows"));
        }

        #[test]
        fn test_dynamic_element() {
            let node = single(r#"<tag is="{{_page.tag}}">x</tag>"#);
            assert!(matches!(*node, Template::DynamicElement(_)));
        }

        #[test]
        fn test_comment_is_literal() {
            assert_eq!(
                *single("<!-- {{_page.x}} -->"),
                Template::Comment(" {{_page.x}} ".to_string())
            );
        }

        #[test]
        fn test_unclosed_element() {
            let err = parse("<div><p>text</div>").unwrap_err();
            assert!(matches!(err, TemplateError::UnclosedElement { ref tag, .. } if tag == "p"));
        }

        #[test]
        fn test_stray_end_tag() {
            assert!(matches!(
                parse("text</p>").unwrap_err(),
                TemplateError::Parse { .. }
            ));
        }
    }

    mod blocks {
        use super::*;

        #[test]
        fn test_if_else_chain() {
            let node = single("{{if a}}A{{else if b}}B{{else}}C{{/if}}");
            let Template::ConditionalBlock(block) = &*node else {
                panic!("expected a conditional block");
            };
            assert_eq!(block.expressions.len(), 3);
            assert_eq!(block.contents.len(), 3);
            assert!(matches!(block.expressions[2].kind, ExpressionKind::Else));
            assert_eq!(*block.contents[1][0], Template::Text("B".to_string()));
        }

        #[test]
        fn test_each_with_else() {
            let node = single("{{each _page.items as #item}}{{#item}}{{else}}Nada{{/each}}");
            let Template::EachBlock(block) = &*node else {
                panic!("expected an each block");
            };
            assert_eq!(block.expression.alias(), Some("#item"));
            assert_eq!(
                block.else_content.as_deref().map(<[_]>::len),
                Some(1)
            );
        }

        #[test]
        fn test_with_block() {
            let node = single("{{with _page.user as #user}}{{#user.name}}{{/}}");
            let Template::Block(block) = &*node else {
                panic!("expected a block");
            };
            assert_eq!(block.expression.block_type(), Some(BlockType::With));
            let Template::DynamicText(expression) = &*block.content[0] else {
                panic!("expected dynamic text");
            };
            assert_eq!(
                expression.kind,
                ExpressionKind::Alias {
                    alias: "#user".to_string(),
                    segments: vec![Segment::from("name")],
                }
            );
        }

        #[test]
        fn test_unescaped_is_dynamic_html() {
            assert!(matches!(*single("{{unescaped _page.html}}"), Template::DynamicHtml(_)));
        }

        #[test]
        fn test_mismatched_close() {
            let err = parse("{{if a}}x{{/each}}").unwrap_err();
            assert_eq!(
                err,
                TemplateError::MismatchedBlock {
                    expected: "if".to_string(),
                    found: "each".to_string(),
                    context: "line 1, column 10: {{if a}}x{{/each}}".to_string(),
                }
            );
        }

        #[test]
        fn test_unclosed_block_reports_opening_line() {
            let err = parse("<p>\n  {{each items}}\n</p>").unwrap_err();
            assert_eq!(
                err,
                TemplateError::UnclosedBlock {
                    block: "each".to_string(),
                    context: "line 2, column 3: {{each items}}".to_string(),
                }
            );
        }

        #[test]
        fn test_unknown_block() {
            let err = parse("{{loop items}}{{/loop}}").unwrap_err();
            assert!(matches!(err, TemplateError::UnknownBlock { ref keyword, .. } if keyword == "loop"));
        }

        #[test]
        fn test_else_outside_block() {
            assert!(parse("a{{else}}b").is_err());
            assert!(parse("{{with a}}x{{else}}y{{/with}}").is_err());
        }
    }

    mod views {
        use super::*;

        #[test]
        fn test_view_instance_attributes() {
            let node = single(
                r#"<view is="user-card" user="{{_page.user}}" title="Hi" count="{{3}}" show-avatar inherit>Body {{x}}</view>"#,
            );
            let Template::ViewInstance(instance) = &*node else {
                panic!("expected a view instance");
            };
            assert_eq!(instance.name, "user-card");
            assert!(matches!(instance.attribute("user"), Some(ViewAttribute::Expression(_))));
            assert_eq!(
                instance.attribute("title"),
                Some(&ViewAttribute::Literal(JsonValue::String("Hi".to_string())))
            );
            assert_eq!(
                instance.attribute("count"),
                Some(&ViewAttribute::Literal(serde_json::json!(3)))
            );
            assert_eq!(
                instance.attribute("showAvatar"),
                Some(&ViewAttribute::Literal(JsonValue::Bool(true)))
            );
            assert!(instance.attribute("inherit").is_some());
            assert!(matches!(
                instance.attribute("content"),
                Some(ViewAttribute::Template(template)) if matches!(**template, Template::ViewParent(_))
            ));
        }

        #[test]
        fn test_namespaced_tag() {
            let node = single("<lib:tabs selected=\"{{_page.tab}}\"/>");
            let Template::ViewInstance(instance) = &*node else {
                panic!("expected a view instance");
            };
            assert_eq!(instance.name, "lib:tabs");
            assert!(instance.attribute("content").is_none());
        }

        #[test]
        fn test_view_needs_a_name() {
            assert!(matches!(
                parse("<view></view>").unwrap_err(),
                TemplateError::Parse { .. }
            ));
        }

        #[test]
        fn test_dash_to_camel() {
            assert_eq!(dash_to_camel("show-avatar-now"), "showAvatarNow");
            assert_eq!(dash_to_camel("plain"), "plain");
        }
    }
}
