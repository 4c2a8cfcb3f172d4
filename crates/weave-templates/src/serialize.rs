//! The constructor-call text form of templates.
//!
//! `serialize` writes a tree as nested calls such as
//! `Element("div", [], [], [Text("hi")])`, which a client can rebuild without
//! the template parser. `deserialize` reads the same text back.

use std::rc::Rc;

use serde_json::Map;
use serde_json::Value as JsonValue;
use weave_model::Segment;

use crate::error::TemplateError;
use crate::expressions::BindType;
use crate::expressions::BlockType;
use crate::expressions::Expression;
use crate::expressions::ExpressionKind;
use crate::expressions::ExpressionMeta;
use crate::expressions::Operator;
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

#[must_use]
pub fn serialize(template: &Template) -> String {
    let mut out = String::new();
    write_template(template, &mut out);
    out
}

#[must_use]
pub fn serialize_expression(expression: &Expression) -> String {
    let mut out = String::new();
    write_expression(expression, &mut out);
    out
}

pub fn deserialize(text: &str) -> Result<Rc<Template>, TemplateError> {
    let serial = Reader::new(text).read_all()?;
    template(&serial)
}

pub fn deserialize_expression(text: &str) -> Result<Expression, TemplateError> {
    let serial = Reader::new(text).read_all()?;
    expression(&serial)
}

fn json(value: &JsonValue, out: &mut String) {
    out.push_str(&value.to_string());
}

fn string(value: &str, out: &mut String) {
    json(&JsonValue::String(value.to_string()), out);
}

fn list<T>(items: &[T], out: &mut String, mut write: impl FnMut(&T, &mut String)) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write(item, out);
    }
    out.push(']');
}

fn content(content: &Content, out: &mut String) {
    list(content, out, |node, out| write_template(node, out));
}

fn segments(segments: &[Segment], out: &mut String) {
    let values: Vec<JsonValue> = segments
        .iter()
        .map(|segment| match segment {
            Segment::Key(key) => JsonValue::String(key.clone()),
            Segment::Index(index) => JsonValue::from(*index),
        })
        .collect();
    json(&JsonValue::Array(values), out);
}

fn write_template(template: &Template, out: &mut String) {
    out.push_str(template.kind_name());
    out.push('(');
    match template {
        Template::Fragment(nodes) => content(nodes, out),
        Template::Doctype(text) | Template::Text(text) | Template::Comment(text) | Template::Html(text) => {
            string(text, out);
        }
        Template::DynamicText(expression) | Template::DynamicHtml(expression) => {
            write_expression(expression, out);
        }
        Template::Element(Element {
            tag_name,
            attributes,
            hooks,
            content: nodes,
        }) => {
            string(tag_name, out);
            write_element_parts(attributes, hooks, nodes, out);
        }
        Template::DynamicElement(DynamicElement {
            tag_name,
            attributes,
            hooks,
            content: nodes,
        }) => {
            write_expression(tag_name, out);
            write_element_parts(attributes, hooks, nodes, out);
        }
        Template::Block(Block {
            expression,
            content: nodes,
        }) => {
            write_expression(expression, out);
            out.push_str(", ");
            content(nodes, out);
        }
        Template::ConditionalBlock(ConditionalBlock {
            expressions,
            contents,
        }) => {
            list(expressions, out, |expression, out| write_expression(expression, out));
            out.push_str(", ");
            list(contents, out, content);
        }
        Template::EachBlock(EachBlock {
            expression,
            content: nodes,
            else_content,
        }) => {
            write_expression(expression, out);
            out.push_str(", ");
            content(nodes, out);
            out.push_str(", ");
            match else_content {
                Some(nodes) => content(nodes, out),
                None => out.push_str("null"),
            }
        }
        Template::ViewInstance(ViewInstance { name, attributes }) => {
            string(name, out);
            out.push_str(", {");
            for (i, (key, value)) in attributes.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                string(key, out);
                out.push_str(": ");
                match value {
                    ViewAttribute::Literal(value) => json(value, out),
                    ViewAttribute::Expression(expression) => write_expression(expression, out),
                    ViewAttribute::Template(template) => write_template(template, out),
                }
            }
            out.push('}');
        }
        Template::ViewParent(inner) => write_template(inner, out),
    }
    out.push(')');
}

fn write_element_parts(
    attributes: &[Rc<Attribute>],
    hooks: &[MarkupHook],
    nodes: &Content,
    out: &mut String,
) {
    out.push_str(", ");
    list(attributes, out, |attribute, out| {
        match &attribute.value {
            AttributeValue::Static(value) => {
                out.push_str("Attribute(");
                string(&attribute.name, out);
                out.push_str(", ");
                string(value, out);
            }
            AttributeValue::Expression(expression) => {
                out.push_str("DynamicAttribute(");
                string(&attribute.name, out);
                out.push_str(", ");
                write_expression(expression, out);
            }
            AttributeValue::Template(template) => {
                out.push_str("DynamicAttribute(");
                string(&attribute.name, out);
                out.push_str(", ");
                write_template(template, out);
            }
        }
        out.push(')');
    });
    out.push_str(", ");
    list(hooks, out, |hook, out| match hook {
        MarkupHook::On { event, expression } => {
            out.push_str("On(");
            string(event, out);
            out.push_str(", ");
            write_expression(expression, out);
            out.push(')');
        }
        MarkupHook::As { name } => {
            out.push_str("As(");
            string(name, out);
            out.push(')');
        }
        MarkupHook::AsArray { name } => {
            out.push_str("AsArray(");
            string(name, out);
            out.push(')');
        }
        MarkupHook::AsObject { name, key } => {
            out.push_str("AsObject(");
            string(name, out);
            out.push_str(", ");
            write_expression(key, out);
            out.push(')');
        }
    });
    out.push_str(", ");
    content(nodes, out);
}

fn expression_name(kind: &ExpressionKind) -> &'static str {
    match kind {
        ExpressionKind::Literal(_) => "LiteralExpression",
        ExpressionKind::Path(_) => "PathExpression",
        ExpressionKind::Relative(_) => "RelativePathExpression",
        ExpressionKind::Alias { .. } => "AliasPathExpression",
        ExpressionKind::Attribute { .. } => "AttributePathExpression",
        ExpressionKind::Brackets { .. } => "BracketsExpression",
        ExpressionKind::Array(_) => "ArrayExpression",
        ExpressionKind::Object(_) => "ObjectExpression",
        ExpressionKind::Fn { .. } => "FnExpression",
        ExpressionKind::Operator { .. } => "OperatorExpression",
        ExpressionKind::Sequence(_) => "SequenceExpression",
        ExpressionKind::Else => "ElseExpression",
    }
}

fn write_expression(expression: &Expression, out: &mut String) {
    out.push_str(expression_name(&expression.kind));
    out.push('(');
    let mut first = true;
    let mut separate = |out: &mut String| {
        if !std::mem::take(&mut first) {
            out.push_str(", ");
        }
    };
    match &expression.kind {
        ExpressionKind::Literal(value) => {
            separate(out);
            json(value, out);
        }
        ExpressionKind::Path(path) | ExpressionKind::Relative(path) => {
            separate(out);
            segments(path, out);
        }
        ExpressionKind::Alias {
            alias: name,
            segments: path,
        }
        | ExpressionKind::Attribute {
            attribute: name,
            segments: path,
        } => {
            separate(out);
            string(name, out);
            separate(out);
            segments(path, out);
        }
        ExpressionKind::Brackets {
            before,
            inside,
            after,
        } => {
            separate(out);
            write_expression(before, out);
            separate(out);
            write_expression(inside, out);
            separate(out);
            segments(after, out);
        }
        ExpressionKind::Array(items) | ExpressionKind::Sequence(items) => {
            separate(out);
            list(items, out, write_expression);
        }
        ExpressionKind::Object(properties) => {
            separate(out);
            out.push('{');
            for (i, (key, value)) in properties.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                string(key, out);
                out.push_str(": ");
                write_expression(value, out);
            }
            out.push('}');
        }
        ExpressionKind::Fn { name, args, after } => {
            separate(out);
            string(name, out);
            separate(out);
            list(args, out, write_expression);
            separate(out);
            segments(after, out);
        }
        ExpressionKind::Operator { op, args } => {
            separate(out);
            string(op.symbol(), out);
            separate(out);
            list(args, out, write_expression);
        }
        ExpressionKind::Else => {}
    }
    if let Some(meta) = &expression.meta {
        separate(out);
        out.push_str("Meta(");
        json(&meta_json(meta), out);
        out.push(')');
    }
    out.push(')');
}

fn meta_json(meta: &ExpressionMeta) -> JsonValue {
    let mut map = Map::new();
    map.insert("source".to_string(), JsonValue::String(meta.source.clone()));
    if let Some(block_type) = meta.block_type {
        map.insert("blockType".to_string(), block_type.as_str().into());
    }
    if let Some(bind_type) = meta.bind_type {
        let name = match bind_type {
            BindType::Bound => "bound",
            BindType::Unbound => "unbound",
        };
        map.insert("bindType".to_string(), name.into());
    }
    if let Some(alias) = &meta.alias {
        map.insert("as".to_string(), alias.as_str().into());
    }
    if let Some(key_alias) = &meta.key_alias {
        map.insert("keyAs".to_string(), key_alias.as_str().into());
    }
    if meta.unescaped {
        map.insert("unescaped".to_string(), true.into());
    }
    JsonValue::Object(map)
}

#[derive(Debug)]
struct Serial {
    offset: usize,
    value: SerialValue,
}

#[derive(Debug)]
enum SerialValue {
    Call { name: String, args: Vec<Serial> },
    Array(Vec<Serial>),
    Object(Vec<(String, Serial)>),
    Json(JsonValue),
}

struct Reader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::Deserialize {
            message: message.into(),
            offset: self.pos,
        }
    }

    fn read_all(mut self) -> Result<Serial, TemplateError> {
        let value = self.read()?;
        self.skip_whitespace();
        if self.pos < self.text.len() {
            return Err(self.error("trailing characters"));
        }
        Ok(value)
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.text[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), TemplateError> {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", char::from(byte))))
        }
    }

    /// Read `open item, item close`, with `item` read by `read_item`.
    fn read_sequence<T>(
        &mut self,
        close: u8,
        mut read_item: impl FnMut(&mut Self) -> Result<T, TemplateError>,
    ) -> Result<Vec<T>, TemplateError> {
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(read_item(self)?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(byte) if byte == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                _ => return Err(self.error(format!("expected `,` or `{}`", char::from(close)))),
            }
        }
    }

    fn read(&mut self) -> Result<Serial, TemplateError> {
        self.skip_whitespace();
        let offset = self.pos;
        let value = match self.peek() {
            Some(b'"') => SerialValue::Json(JsonValue::String(self.read_string()?)),
            Some(b'[') => {
                self.pos += 1;
                SerialValue::Array(self.read_sequence(b']', Self::read)?)
            }
            Some(b'{') => {
                self.pos += 1;
                SerialValue::Object(self.read_sequence(b'}', |reader| {
                    reader.skip_whitespace();
                    let key = reader.read_string()?;
                    reader.expect(b':')?;
                    Ok((key, reader.read()?))
                })?)
            }
            Some(b'-' | b'0'..=b'9') => {
                let rest = &self.text[self.pos..];
                let len = rest
                    .find(|c: char| !matches!(c, '0'..='9' | '-' | '+' | '.' | 'e' | 'E'))
                    .unwrap_or(rest.len());
                let number = serde_json::from_str::<JsonValue>(&rest[..len])
                    .map_err(|err| self.error(format!("invalid number: {err}")))?;
                self.pos += len;
                SerialValue::Json(number)
            }
            Some(byte) if byte.is_ascii_alphabetic() => {
                let rest = &self.text[self.pos..];
                let len = rest
                    .find(|c: char| !c.is_ascii_alphanumeric())
                    .unwrap_or(rest.len());
                let name = rest[..len].to_string();
                self.pos += len;
                self.skip_whitespace();
                match (name.as_str(), self.peek()) {
                    (_, Some(b'(')) => {
                        self.pos += 1;
                        let args = self.read_sequence(b')', Self::read)?;
                        SerialValue::Call { name, args }
                    }
                    ("true", _) => SerialValue::Json(JsonValue::Bool(true)),
                    ("false", _) => SerialValue::Json(JsonValue::Bool(false)),
                    ("null", _) => SerialValue::Json(JsonValue::Null),
                    _ => return Err(self.error(format!("expected `(` after `{name}`"))),
                }
            }
            _ => return Err(self.error("expected a value")),
        };
        Ok(Serial { offset, value })
    }

    fn read_string(&mut self) -> Result<String, TemplateError> {
        let bytes = self.text.as_bytes();
        if bytes.get(self.pos) != Some(&b'"') {
            return Err(self.error("expected a string"));
        }
        let mut end = self.pos + 1;
        loop {
            match bytes.get(end) {
                None => return Err(self.error("unterminated string")),
                Some(b'\\') => end += 2,
                Some(b'"') => break,
                Some(_) => end += 1,
            }
        }
        let value = serde_json::from_str::<String>(&self.text[self.pos..=end])
            .map_err(|err| self.error(format!("invalid string: {err}")))?;
        self.pos = end + 1;
        Ok(value)
    }
}

fn fail<T>(serial: &Serial, message: impl Into<String>) -> Result<T, TemplateError> {
    Err(TemplateError::Deserialize {
        message: message.into(),
        offset: serial.offset,
    })
}

fn call<'s>(serial: &'s Serial) -> Result<(&'s str, &'s [Serial]), TemplateError> {
    match &serial.value {
        SerialValue::Call { name, args } => Ok((name.as_str(), args.as_slice())),
        _ => fail(serial, "expected a constructor call"),
    }
}

fn arity<'s>(serial: &Serial, args: &'s [Serial], count: usize) -> Result<&'s [Serial], TemplateError> {
    if args.len() == count {
        Ok(args)
    } else {
        fail(
            serial,
            format!("expected {count} arguments, found {}", args.len()),
        )
    }
}

fn as_string(serial: &Serial) -> Result<String, TemplateError> {
    match &serial.value {
        SerialValue::Json(JsonValue::String(value)) => Ok(value.clone()),
        _ => fail(serial, "expected a string"),
    }
}

fn as_array(serial: &Serial) -> Result<&[Serial], TemplateError> {
    match &serial.value {
        SerialValue::Array(items) => Ok(items.as_slice()),
        _ => fail(serial, "expected an array"),
    }
}

fn to_json(serial: &Serial) -> Result<JsonValue, TemplateError> {
    Ok(match &serial.value {
        SerialValue::Json(value) => value.clone(),
        SerialValue::Array(items) => {
            JsonValue::Array(items.iter().map(to_json).collect::<Result<_, _>>()?)
        }
        SerialValue::Object(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), to_json(value)?)))
                .collect::<Result<_, TemplateError>>()?,
        ),
        SerialValue::Call { .. } => return fail(serial, "expected a literal value"),
    })
}

fn to_segments(serial: &Serial) -> Result<Vec<Segment>, TemplateError> {
    as_array(serial)?
        .iter()
        .map(|item| match &item.value {
            SerialValue::Json(JsonValue::String(key)) => Ok(Segment::Key(key.clone())),
            SerialValue::Json(JsonValue::Number(number)) => number
                .as_u64()
                .and_then(|index| usize::try_from(index).ok())
                .map(Segment::Index)
                .map_or_else(|| fail(item, "expected an index"), Ok),
            _ => fail(item, "expected a path segment"),
        })
        .collect()
}

fn to_content(serial: &Serial) -> Result<Content, TemplateError> {
    as_array(serial)?.iter().map(template).collect()
}

fn template(serial: &Serial) -> Result<Rc<Template>, TemplateError> {
    let (name, args) = call(serial)?;
    let node = match name {
        "Fragment" => Template::Fragment(to_content(&arity(serial, args, 1)?[0])?),
        "Doctype" => Template::Doctype(as_string(&arity(serial, args, 1)?[0])?),
        "Text" => Template::Text(as_string(&arity(serial, args, 1)?[0])?),
        "Comment" => Template::Comment(as_string(&arity(serial, args, 1)?[0])?),
        "Html" => Template::Html(as_string(&arity(serial, args, 1)?[0])?),
        "DynamicText" => Template::DynamicText(Rc::new(expression(&arity(serial, args, 1)?[0])?)),
        "DynamicHtml" => Template::DynamicHtml(Rc::new(expression(&arity(serial, args, 1)?[0])?)),
        "Element" => {
            let args = arity(serial, args, 4)?;
            Template::Element(Element {
                tag_name: as_string(&args[0])?,
                attributes: to_attributes(&args[1])?,
                hooks: to_hooks(&args[2])?,
                content: to_content(&args[3])?,
            })
        }
        "DynamicElement" => {
            let args = arity(serial, args, 4)?;
            Template::DynamicElement(DynamicElement {
                tag_name: Rc::new(expression(&args[0])?),
                attributes: to_attributes(&args[1])?,
                hooks: to_hooks(&args[2])?,
                content: to_content(&args[3])?,
            })
        }
        "Block" => {
            let args = arity(serial, args, 2)?;
            Template::Block(Block {
                expression: Rc::new(expression(&args[0])?),
                content: to_content(&args[1])?,
            })
        }
        "ConditionalBlock" => {
            let args = arity(serial, args, 2)?;
            Template::ConditionalBlock(ConditionalBlock {
                expressions: as_array(&args[0])?
                    .iter()
                    .map(|item| expression(item).map(Rc::new))
                    .collect::<Result<_, _>>()?,
                contents: as_array(&args[1])?
                    .iter()
                    .map(to_content)
                    .collect::<Result<_, _>>()?,
            })
        }
        "EachBlock" => {
            let args = arity(serial, args, 3)?;
            let else_content = match &args[2].value {
                SerialValue::Json(JsonValue::Null) => None,
                _ => Some(to_content(&args[2])?),
            };
            Template::EachBlock(EachBlock {
                expression: Rc::new(expression(&args[0])?),
                content: to_content(&args[1])?,
                else_content,
            })
        }
        "ViewInstance" => {
            let args = arity(serial, args, 2)?;
            let SerialValue::Object(entries) = &args[1].value else {
                return fail(&args[1], "expected an attribute object");
            };
            let attributes = entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), to_view_attribute(value)?)))
                .collect::<Result<_, TemplateError>>()?;
            Template::ViewInstance(ViewInstance {
                name: as_string(&args[0])?,
                attributes,
            })
        }
        "ViewParent" => Template::ViewParent(template(&arity(serial, args, 1)?[0])?),
        other => return fail(serial, format!("unknown template node `{other}`")),
    };
    Ok(Rc::new(node))
}

fn to_view_attribute(serial: &Serial) -> Result<ViewAttribute, TemplateError> {
    match &serial.value {
        SerialValue::Call { name, .. } if name.ends_with("Expression") => {
            Ok(ViewAttribute::Expression(Rc::new(expression(serial)?)))
        }
        SerialValue::Call { .. } => Ok(ViewAttribute::Template(template(serial)?)),
        _ => Ok(ViewAttribute::Literal(to_json(serial)?)),
    }
}

fn to_attributes(serial: &Serial) -> Result<Vec<Rc<Attribute>>, TemplateError> {
    as_array(serial)?
        .iter()
        .map(|item| {
            let (name, args) = call(item)?;
            let args = arity(item, args, 2)?;
            let value = match (name, &args[1].value) {
                ("Attribute", _) => AttributeValue::Static(as_string(&args[1])?),
                ("DynamicAttribute", SerialValue::Call { name, .. }) if name.ends_with("Expression") => {
                    AttributeValue::Expression(Rc::new(expression(&args[1])?))
                }
                ("DynamicAttribute", _) => AttributeValue::Template(template(&args[1])?),
                (other, _) => return fail(item, format!("unknown attribute `{other}`")),
            };
            Ok(Rc::new(Attribute {
                name: as_string(&args[0])?,
                value,
            }))
        })
        .collect()
}

fn to_hooks(serial: &Serial) -> Result<Vec<MarkupHook>, TemplateError> {
    as_array(serial)?
        .iter()
        .map(|item| {
            let (name, args) = call(item)?;
            Ok(match name {
                "On" => {
                    let args = arity(item, args, 2)?;
                    MarkupHook::On {
                        event: as_string(&args[0])?,
                        expression: Rc::new(expression(&args[1])?),
                    }
                }
                "As" => MarkupHook::As {
                    name: as_string(&arity(item, args, 1)?[0])?,
                },
                "AsArray" => MarkupHook::AsArray {
                    name: as_string(&arity(item, args, 1)?[0])?,
                },
                "AsObject" => {
                    let args = arity(item, args, 2)?;
                    MarkupHook::AsObject {
                        name: as_string(&args[0])?,
                        key: Rc::new(expression(&args[1])?),
                    }
                }
                other => return fail(item, format!("unknown hook `{other}`")),
            })
        })
        .collect()
}

fn to_meta(serial: &Serial) -> Result<ExpressionMeta, TemplateError> {
    let (_, args) = call(serial)?;
    let JsonValue::Object(map) = to_json(&arity(serial, args, 1)?[0])? else {
        return fail(serial, "expected a meta object");
    };
    let text = |key: &str| map.get(key).and_then(JsonValue::as_str).map(str::to_string);
    let block_type = match text("blockType") {
        Some(keyword) => Some(
            BlockType::from_keyword(&keyword)
                .map_or_else(|| fail(serial, format!("unknown block type `{keyword}`")), Ok)?,
        ),
        None => None,
    };
    let bind_type = match text("bindType").as_deref() {
        Some("bound") => Some(BindType::Bound),
        Some("unbound") => Some(BindType::Unbound),
        Some(other) => return fail(serial, format!("unknown bind type `{other}`")),
        None => None,
    };
    Ok(ExpressionMeta {
        source: text("source").unwrap_or_default(),
        block_type,
        bind_type,
        alias: text("as"),
        key_alias: text("keyAs"),
        unescaped: map
            .get("unescaped")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false),
    })
}

fn expression(serial: &Serial) -> Result<Expression, TemplateError> {
    let (name, all_args) = call(serial)?;
    let (args, meta) = match all_args.split_last() {
        Some((last, rest)) if matches!(&last.value, SerialValue::Call { name, .. } if name == "Meta") => {
            (rest, Some(to_meta(last)?))
        }
        _ => (all_args, None),
    };

    let kind = match name {
        "LiteralExpression" => ExpressionKind::Literal(to_json(&arity(serial, args, 1)?[0])?),
        "PathExpression" => ExpressionKind::Path(to_segments(&arity(serial, args, 1)?[0])?),
        "RelativePathExpression" => {
            ExpressionKind::Relative(to_segments(&arity(serial, args, 1)?[0])?)
        }
        "AliasPathExpression" => {
            let args = arity(serial, args, 2)?;
            ExpressionKind::Alias {
                alias: as_string(&args[0])?,
                segments: to_segments(&args[1])?,
            }
        }
        "AttributePathExpression" => {
            let args = arity(serial, args, 2)?;
            ExpressionKind::Attribute {
                attribute: as_string(&args[0])?,
                segments: to_segments(&args[1])?,
            }
        }
        "BracketsExpression" => {
            let args = arity(serial, args, 3)?;
            ExpressionKind::Brackets {
                before: Box::new(expression(&args[0])?),
                inside: Box::new(expression(&args[1])?),
                after: to_segments(&args[2])?,
            }
        }
        "ArrayExpression" => ExpressionKind::Array(expressions(&arity(serial, args, 1)?[0])?),
        "SequenceExpression" => {
            ExpressionKind::Sequence(expressions(&arity(serial, args, 1)?[0])?)
        }
        "ObjectExpression" => {
            let args = arity(serial, args, 1)?;
            let SerialValue::Object(entries) = &args[0].value else {
                return fail(&args[0], "expected an object");
            };
            ExpressionKind::Object(
                entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), expression(value)?)))
                    .collect::<Result<_, TemplateError>>()?,
            )
        }
        "FnExpression" => {
            let args = arity(serial, args, 3)?;
            ExpressionKind::Fn {
                name: as_string(&args[0])?,
                args: expressions(&args[1])?,
                after: to_segments(&args[2])?,
            }
        }
        "OperatorExpression" => {
            let args = arity(serial, args, 2)?;
            let symbol = as_string(&args[0])?;
            let operands = expressions(&args[1])?;
            let op = Operator::from_symbol(&symbol, operands.len()).map_or_else(
                || fail(serial, format!("unknown operator `{symbol}`")),
                Ok,
            )?;
            ExpressionKind::Operator { op, args: operands }
        }
        "ElseExpression" => {
            arity(serial, args, 0)?;
            ExpressionKind::Else
        }
        other => return fail(serial, format!("unknown expression `{other}`")),
    };
    Ok(Expression { kind, meta })
}

fn expressions(serial: &Serial) -> Result<Vec<Expression>, TemplateError> {
    as_array(serial)?.iter().map(expression).collect()
}
