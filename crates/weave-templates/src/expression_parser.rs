//! Parser for the expression language inside `{{ }}`.
//!
//! Member chains are folded while parsing: literal keys and indices become
//! path segments (`a.b[0]` is one path), a computed key starts a
//! [`ExpressionKind::Brackets`] node, and a call on a plain name becomes
//! [`ExpressionKind::Fn`].

use serde_json::Number;
use serde_json::Value as JsonValue;
use weave_model::Segment;

use crate::error::ExpressionError;
use crate::expressions::BindType;
use crate::expressions::BlockType;
use crate::expressions::Expression;
use crate::expressions::ExpressionKind;
use crate::expressions::ExpressionMeta;
use crate::expressions::Operator;

#[derive(Clone, Debug, PartialEq)]
enum Lexeme {
    Number(f64),
    String(String),
    Ident(String),
    /// `#name`, kept with its `#`.
    Alias(String),
    /// `@name`, without the `@`.
    Attribute(String),
    Punct(&'static str),
    Eof,
}

const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "!", "<", ">", "+", "-", "*", "/", "%", "?",
    ":", ",", ".", "(", ")", "[", "]", "{", "}",
];

fn tokenize(source: &str) -> Result<Vec<(Lexeme, usize)>, ExpressionError> {
    let mut lexemes = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        let rest = &source[start..];

        if ch.is_ascii_digit() {
            let len = number_len(rest);
            let text = &rest[..len];
            let number = text
                .parse::<f64>()
                .map_err(|_| ExpressionError::new(format!("invalid number `{text}`"), start))?;
            lexemes.push((Lexeme::Number(number), start));
            advance(&mut chars, start + len);
        } else if ch == '"' || ch == '\'' {
            let (value, len) = lex_string(rest, ch)
                .ok_or_else(|| ExpressionError::new("unterminated string", start))?;
            lexemes.push((Lexeme::String(value), start));
            advance(&mut chars, start + len);
        } else if is_ident_start(ch) || ch == '#' || ch == '@' {
            let body = if ch == '#' || ch == '@' { &rest[1..] } else { rest };
            let len = body.find(|c: char| !is_ident_char(c)).unwrap_or(body.len());
            if len == 0 {
                return Err(ExpressionError::new(format!("expected a name after `{ch}`"), start));
            }
            let name = body[..len].to_string();
            let lexeme = match ch {
                '#' => Lexeme::Alias(format!("#{name}")),
                '@' => Lexeme::Attribute(name),
                _ => Lexeme::Ident(name),
            };
            let consumed = if ch == '#' || ch == '@' { len + 1 } else { len };
            lexemes.push((lexeme, start));
            advance(&mut chars, start + consumed);
        } else if let Some(punct) = PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
            lexemes.push((Lexeme::Punct(*punct), start));
            advance(&mut chars, start + punct.len());
        } else {
            return Err(ExpressionError::new(format!("unexpected character `{ch}`"), start));
        }
    }

    lexemes.push((Lexeme::Eof, source.len()));
    Ok(lexemes)
}

/// Digits, an optional fraction and an optional exponent. A `.` not
/// followed by a digit ends the number, so `items.0.name` stays a path.
fn number_len(source: &str) -> usize {
    let bytes = source.as_bytes();
    let digits = |mut pos: usize| {
        while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            pos += 1;
        }
        pos
    };
    let mut len = digits(0);
    if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit) {
        len = digits(len + 1);
    }
    if matches!(bytes.get(len), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(len + 1), Some(b'+' | b'-')));
        if bytes.get(len + 1 + sign).is_some_and(u8::is_ascii_digit) {
            len = digits(len + 1 + sign);
        }
    }
    len
}

fn advance(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, to: usize) {
    while chars.peek().is_some_and(|(i, _)| *i < to) {
        chars.next();
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Returns the unescaped string and the byte length including quotes.
fn lex_string(source: &str, quote: char) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut chars = source.char_indices().skip(1);
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => {
                let (_, escaped) = chars.next()?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            }
            c if c == quote => return Some((value, i + 1)),
            c => value.push(c),
        }
    }
    None
}

struct ExpressionParser {
    lexemes: Vec<(Lexeme, usize)>,
    current: usize,
}

impl ExpressionParser {
    fn new(source: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            lexemes: tokenize(source)?,
            current: 0,
        })
    }

    fn peek(&self) -> &Lexeme {
        self.lexemes
            .get(self.current)
            .map_or(&Lexeme::Eof, |(lexeme, _)| lexeme)
    }

    fn position(&self) -> usize {
        self.lexemes.get(self.current).map_or(0, |(_, pos)| *pos)
    }

    fn next(&mut self) -> Lexeme {
        let lexeme = self.peek().clone();
        if self.current < self.lexemes.len() {
            self.current += 1;
        }
        lexeme
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Lexeme::Punct(p) if *p == punct) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), ExpressionError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{punct}`")))
        }
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::new(message, self.position())
    }

    fn finish(&mut self) -> Result<(), ExpressionError> {
        match self.peek() {
            Lexeme::Eof => Ok(()),
            other => Err(self.error(format!("unexpected {}", describe(other)))),
        }
    }

    fn parse_expression(&mut self) -> Result<Expression, ExpressionError> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> Result<Expression, ExpressionError> {
        let test = self.parse_binary(0)?;
        if !self.eat("?") {
            return Ok(test);
        }
        let consequent = self.parse_conditional()?;
        self.expect(":")?;
        let alternate = self.parse_conditional()?;
        Ok(Expression::new(ExpressionKind::Operator {
            op: Operator::Conditional,
            args: vec![test, consequent, alternate],
        }))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expression, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let Lexeme::Punct(symbol) = *self.peek() else {
                break;
            };
            let Some(precedence) = binary_precedence(symbol) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.current += 1;
            let right = self.parse_binary(precedence + 1)?;
            let op = Operator::from_symbol(symbol, 2)
                .ok_or_else(|| self.error(format!("unknown operator `{symbol}`")))?;
            left = Expression::new(ExpressionKind::Operator {
                op,
                args: vec![left, right],
            });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ExpressionError> {
        if let Lexeme::Punct(symbol @ ("!" | "-" | "+")) = *self.peek() {
            self.current += 1;
            let operand = self.parse_unary()?;
            if let (Some(number), "-") = (literal_number(&operand), symbol) {
                return Ok(Expression::literal(json_number(-number)));
            }
            let op = Operator::from_symbol(symbol, 1)
                .ok_or_else(|| self.error(format!("unknown operator `{symbol}`")))?;
            return Ok(Expression::new(ExpressionKind::Operator {
                op,
                args: vec![operand],
            }));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ExpressionError> {
        let mut expression = self.parse_primary()?;
        loop {
            if self.eat(".") {
                let position = self.position();
                let segment = match self.next() {
                    Lexeme::Ident(name) => Segment::Key(name),
                    Lexeme::Number(number) if number >= 0.0 && number.fract() == 0.0 => {
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let index = number as usize;
                        Segment::Index(index)
                    }
                    _ => return Err(ExpressionError::new("expected a name after `.`", position)),
                };
                expression = append_segment(expression, segment)
                    .map_err(|message| ExpressionError::new(message, position))?;
            } else if self.eat("[") {
                let position = self.position();
                let inside = self.parse_expression()?;
                self.expect("]")?;
                expression = match literal_segment(&inside) {
                    Some(segment) => append_segment(expression, segment)
                        .map_err(|message| ExpressionError::new(message, position))?,
                    None if is_member_base(&expression) => {
                        Expression::new(ExpressionKind::Brackets {
                            before: Box::new(expression),
                            inside: Box::new(inside),
                            after: Vec::new(),
                        })
                    }
                    None => {
                        return Err(ExpressionError::new(
                            "computed member access needs a path",
                            position,
                        ))
                    }
                };
            } else if matches!(self.peek(), Lexeme::Punct("(")) {
                let position = self.position();
                let name = function_name(&expression)
                    .ok_or_else(|| ExpressionError::new("only named functions can be called", position))?;
                self.current += 1;
                let args = self.parse_list(")")?;
                expression = Expression::new(ExpressionKind::Fn {
                    name,
                    args,
                    after: Vec::new(),
                });
            } else {
                return Ok(expression);
            }
        }
    }

    fn parse_list(&mut self, close: &str) -> Result<Vec<Expression>, ExpressionError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expression()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(",")?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ExpressionError> {
        let position = self.position();
        match self.next() {
            Lexeme::Number(number) => Ok(Expression::literal(json_number(number))),
            Lexeme::String(value) => Ok(Expression::literal(JsonValue::String(value))),
            Lexeme::Ident(name) => Ok(match name.as_str() {
                "true" => Expression::literal(JsonValue::Bool(true)),
                "false" => Expression::literal(JsonValue::Bool(false)),
                "null" | "undefined" => Expression::literal(JsonValue::Null),
                "this" => Expression::new(ExpressionKind::Relative(Vec::new())),
                _ => Expression::path(vec![Segment::Key(name)]),
            }),
            Lexeme::Alias(alias) => Ok(Expression::new(ExpressionKind::Alias {
                alias,
                segments: Vec::new(),
            })),
            Lexeme::Attribute(attribute) => Ok(Expression::new(ExpressionKind::Attribute {
                attribute,
                segments: Vec::new(),
            })),
            Lexeme::Punct("(") => {
                let mut items = self.parse_list(")")?;
                match items.len() {
                    0 => Err(ExpressionError::new("empty parentheses", position)),
                    1 => Ok(items.remove(0)),
                    _ => Ok(Expression::new(ExpressionKind::Sequence(items))),
                }
            }
            Lexeme::Punct("[") => {
                let items = self.parse_list("]")?;
                Ok(fold_array(items))
            }
            Lexeme::Punct("{") => self.parse_object(),
            other => Err(ExpressionError::new(
                format!("unexpected {}", describe(&other)),
                position,
            )),
        }
    }

    fn parse_object(&mut self) -> Result<Expression, ExpressionError> {
        let mut properties = Vec::new();
        if !self.eat("}") {
            loop {
                let position = self.position();
                let key = match self.next() {
                    Lexeme::Ident(name) | Lexeme::String(name) => name,
                    Lexeme::Number(number) => json_number(number).to_string(),
                    other => {
                        return Err(ExpressionError::new(
                            format!("expected an object key, found {}", describe(&other)),
                            position,
                        ))
                    }
                };
                self.expect(":")?;
                properties.push((key, self.parse_expression()?));
                if self.eat("}") {
                    break;
                }
                self.expect(",")?;
            }
        }
        if properties
            .iter()
            .all(|(_, value)| matches!(value.kind, ExpressionKind::Literal(_)))
        {
            let object = properties
                .into_iter()
                .filter_map(|(key, value)| match value.kind {
                    ExpressionKind::Literal(value) => Some((key, value)),
                    _ => None,
                })
                .collect();
            return Ok(Expression::literal(JsonValue::Object(object)));
        }
        Ok(Expression::new(ExpressionKind::Object(properties)))
    }
}

/// Array literals made only of literals collapse into one literal value.
fn fold_array(items: Vec<Expression>) -> Expression {
    if items
        .iter()
        .all(|item| matches!(item.kind, ExpressionKind::Literal(_)))
    {
        let values = items
            .into_iter()
            .filter_map(|item| match item.kind {
                ExpressionKind::Literal(value) => Some(value),
                _ => None,
            })
            .collect();
        return Expression::literal(JsonValue::Array(values));
    }
    Expression::new(ExpressionKind::Array(items))
}

fn binary_precedence(symbol: &str) -> Option<u8> {
    Some(match symbol {
        "||" => 1,
        "&&" => 2,
        "==" | "!=" | "===" | "!==" => 3,
        "<" | ">" | "<=" | ">=" => 4,
        "+" | "-" => 5,
        "*" | "/" | "%" => 6,
        _ => return None,
    })
}

fn describe(lexeme: &Lexeme) -> String {
    match lexeme {
        Lexeme::Number(number) => format!("number `{number}`"),
        Lexeme::String(value) => format!("string {value:?}"),
        Lexeme::Ident(name) => format!("`{name}`"),
        Lexeme::Alias(alias) => format!("`{alias}`"),
        Lexeme::Attribute(attribute) => format!("`@{attribute}`"),
        Lexeme::Punct(punct) => format!("`{punct}`"),
        Lexeme::Eof => "end of expression".to_string(),
    }
}

fn json_number(number: f64) -> JsonValue {
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        #[allow(clippy::cast_possible_truncation)]
        let integer = number as i64;
        return JsonValue::Number(integer.into());
    }
    Number::from_f64(number).map_or(JsonValue::Null, JsonValue::Number)
}

fn literal_number(expression: &Expression) -> Option<f64> {
    match &expression.kind {
        ExpressionKind::Literal(JsonValue::Number(number)) => number.as_f64(),
        _ => None,
    }
}

/// A literal key or index used in brackets becomes a plain segment.
fn literal_segment(expression: &Expression) -> Option<Segment> {
    match &expression.kind {
        ExpressionKind::Literal(JsonValue::String(key)) => Some(Segment::from(key.as_str())),
        ExpressionKind::Literal(JsonValue::Number(number)) => number
            .as_u64()
            .and_then(|index| usize::try_from(index).ok())
            .map(Segment::Index),
        _ => None,
    }
}

fn is_member_base(expression: &Expression) -> bool {
    matches!(
        expression.kind,
        ExpressionKind::Path(_)
            | ExpressionKind::Relative(_)
            | ExpressionKind::Alias { .. }
            | ExpressionKind::Attribute { .. }
            | ExpressionKind::Brackets { .. }
            | ExpressionKind::Fn { .. }
    )
}

fn append_segment(mut expression: Expression, segment: Segment) -> Result<Expression, String> {
    match &mut expression.kind {
        ExpressionKind::Path(segments)
        | ExpressionKind::Relative(segments)
        | ExpressionKind::Alias { segments, .. }
        | ExpressionKind::Attribute { segments, .. }
        | ExpressionKind::Brackets {
            after: segments, ..
        }
        | ExpressionKind::Fn {
            after: segments, ..
        } => {
            segments.push(segment);
            Ok(expression)
        }
        _ => Err(format!("cannot access `{segment}` on a value that is not a path")),
    }
}

/// `a` or `a.b.c` called as a function.
fn function_name(expression: &Expression) -> Option<String> {
    let ExpressionKind::Path(segments) = &expression.kind else {
        return None;
    };
    let keys: Option<Vec<&str>> = segments.iter().map(Segment::as_key).collect();
    keys.map(|keys| keys.join("."))
}

/// Parse a bare expression, without block keywords or aliases.
pub fn parse_expression(source: &str) -> Result<Expression, ExpressionError> {
    let mut parser = ExpressionParser::new(source)?;
    let expression = parser.parse_expression()?;
    parser.finish()?;
    Ok(expression)
}

/// What a `{{ }}` tag holds, once the keyword in front is recognized.
#[derive(Debug, PartialEq)]
pub enum TagContent {
    /// An inline expression, possibly marked `unescaped`, `bound` or `unbound`.
    Expression(Expression),
    /// A block opening, e.g. `if x` or `each items as #item, #i`.
    Open(Expression),
    /// `else` or `else if x`; carries the guard expression.
    Else(Expression),
    /// `/` or `/name`.
    Close(Option<String>),
}

/// Parse the trimmed content of a `{{ }}` tag.
pub fn parse_tag(content: &str) -> Result<TagContent, ExpressionError> {
    if let Some(name) = content.strip_prefix('/') {
        let name = name.trim();
        return Ok(TagContent::Close((!name.is_empty()).then(|| name.to_string())));
    }

    let (keyword, rest) = split_keyword(content);
    let meta = |block_type: Option<BlockType>| ExpressionMeta {
        source: content.to_string(),
        block_type,
        ..ExpressionMeta::default()
    };

    match keyword {
        "else" => {
            let (inner, condition) = split_keyword(rest);
            let expression = match inner {
                "" => Expression::new(ExpressionKind::Else),
                "if" | "unless" => {
                    let block_type = BlockType::from_keyword(inner);
                    let mut expression = parse_expression(condition)?;
                    expression.meta = Some(meta(block_type));
                    return Ok(TagContent::Else(expression));
                }
                _ => return Err(ExpressionError::new("expected `if` or `unless` after `else`", 5)),
            };
            Ok(TagContent::Else(expression.with_meta(meta(Some(BlockType::Else)))))
        }
        "unescaped" => {
            let mut expression = parse_expression(rest)?;
            expression.meta = Some(ExpressionMeta {
                unescaped: true,
                ..meta(None)
            });
            Ok(TagContent::Expression(expression))
        }
        "bound" | "unbound" if !rest.is_empty() => {
            let bind_type = if keyword == "bound" {
                BindType::Bound
            } else {
                BindType::Unbound
            };
            let mut expression = parse_expression(rest)?;
            expression.meta = Some(ExpressionMeta {
                bind_type: Some(bind_type),
                ..meta(None)
            });
            Ok(TagContent::Expression(expression))
        }
        "if" | "unless" | "each" | "with" | "on" | "bound" | "unbound" => {
            let block_type = BlockType::from_keyword(keyword);
            let (source, alias, key_alias) = split_aliases(rest, content.len() - rest.len())?;
            if source.is_empty() && !matches!(keyword, "bound" | "unbound") {
                return Err(ExpressionError::new(
                    format!("`{keyword}` needs an expression"),
                    keyword.len(),
                ));
            }
            if key_alias.is_some() && keyword != "each" {
                return Err(ExpressionError::new(
                    "only `each` blocks take an index alias",
                    content.len() - rest.len(),
                ));
            }
            let expression = if source.is_empty() {
                Expression::literal(JsonValue::Null)
            } else {
                parse_expression(source)?
            };
            Ok(TagContent::Open(expression.with_meta(ExpressionMeta {
                alias,
                key_alias,
                ..meta(block_type)
            })))
        }
        _ => {
            let mut expression = parse_expression(content)?;
            expression.meta = Some(meta(None));
            Ok(TagContent::Expression(expression))
        }
    }
}

/// Whether the first word of a tag is a block keyword this grammar does not know.
#[must_use]
pub fn unknown_block_keyword(content: &str) -> Option<&str> {
    let (keyword, rest) = split_keyword(content);
    let looks_like_block = !rest.is_empty()
        && keyword.chars().all(|c| c.is_ascii_alphabetic())
        && rest.starts_with(|c: char| c.is_alphanumeric() || c == '_' || c == '#' || c == '@');
    (looks_like_block && BlockType::from_keyword(keyword).is_none() && keyword != "unescaped")
        .then_some(keyword)
}

fn split_keyword(content: &str) -> (&str, &str) {
    let content = content.trim();
    match content.find(char::is_whitespace) {
        Some(end) => (&content[..end], content[end..].trim_start()),
        None => (content, ""),
    }
}

/// Split `expr as #item, #index` into its parts. `as` is only recognized
/// outside strings and brackets.
fn split_aliases(
    source: &str,
    base: usize,
) -> Result<(&str, Option<String>, Option<String>), ExpressionError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut split = None;
    let mut previous = ' ';
    for (i, ch) in source.char_indices() {
        match ch {
            '\\' if quote.is_some() => {}
            '"' | '\'' if quote == Some(ch) && previous != '\\' => quote = None,
            '"' | '\'' if quote.is_none() => quote = Some(ch),
            '(' | '[' | '{' if quote.is_none() => depth += 1,
            ')' | ']' | '}' if quote.is_none() => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && quote.is_none() && depth == 0 => {
                if source[i..].trim_start().starts_with("as ") && split.is_none() {
                    split = Some(i);
                }
            }
            _ => {}
        }
        previous = ch;
    }

    let Some(split) = split else {
        return Ok((source.trim(), None, None));
    };
    let expression = source[..split].trim();
    let aliases = source[split..].trim_start()["as".len()..].trim();
    let mut names = aliases.split(',').map(str::trim);
    let mut alias_name = |required: bool| -> Result<Option<String>, ExpressionError> {
        match names.next() {
            Some(name) if name.starts_with('#') && name.len() > 1 => Ok(Some(name.to_string())),
            None if !required => Ok(None),
            Some(name) => Err(ExpressionError::new(
                format!("alias `{name}` must start with `#`"),
                base + split,
            )),
            None => Err(ExpressionError::new("expected an alias after `as`", base + split)),
        }
    };
    let alias = alias_name(true)?;
    let key_alias = alias_name(false)?;
    if names.next().is_some() {
        return Err(ExpressionError::new("too many aliases", base + split));
    }
    Ok((expression, alias, key_alias))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(keys: &[&str]) -> Expression {
        Expression::path(keys.iter().map(|k| Segment::from(*k)).collect())
    }

    mod expressions {
        use super::*;

        #[test]
        fn test_paths_fold_literal_members() {
            let expression = parse_expression("_page.items[0]['name']").unwrap();
            assert_eq!(expression, path(&["_page", "items", "0", "name"]));
        }

        #[test]
        fn test_numeric_dotted_members() {
            let expression = parse_expression("_page.items.0.name").unwrap();
            assert_eq!(expression, path(&["_page", "items", "0", "name"]));
        }

        #[test]
        fn test_computed_member() {
            let expression = parse_expression("_page.colors[_page.key].name").unwrap();
            assert_eq!(
                expression.kind,
                ExpressionKind::Brackets {
                    before: Box::new(path(&["_page", "colors"])),
                    inside: Box::new(path(&["_page", "key"])),
                    after: vec![Segment::from("name")],
                }
            );
        }

        #[test]
        fn test_function_call() {
            let expression = parse_expression("plus(_page.nums[0], _page.nums[1]).total").unwrap();
            assert_eq!(
                expression.kind,
                ExpressionKind::Fn {
                    name: "plus".to_string(),
                    args: vec![path(&["_page", "nums", "0"]), path(&["_page", "nums", "1"])],
                    after: vec![Segment::from("total")],
                }
            );
        }

        #[test]
        fn test_dotted_function_name() {
            let expression = parse_expression("format.date(at)").unwrap();
            assert!(matches!(expression.kind, ExpressionKind::Fn { ref name, .. } if name == "format.date"));
        }

        #[test]
        fn test_precedence() {
            let expression = parse_expression("a || b && c == 1 + 2 * 3").unwrap();
            let ExpressionKind::Operator { op, args } = expression.kind else {
                panic!("expected operator");
            };
            assert_eq!(op, Operator::Or);
            let ExpressionKind::Operator { op, .. } = &args[1].kind else {
                panic!("expected operator");
            };
            assert_eq!(*op, Operator::And);
        }

        #[test]
        fn test_conditional_and_unary() {
            let expression = parse_expression("!done ? 'open' : -1").unwrap();
            let ExpressionKind::Operator { op, args } = expression.kind else {
                panic!("expected operator");
            };
            assert_eq!(op, Operator::Conditional);
            assert!(matches!(args[0].kind, ExpressionKind::Operator { op: Operator::Not, .. }));
            assert_eq!(args[2], Expression::literal(serde_json::json!(-1)));
        }

        #[test]
        fn test_literals() {
            assert_eq!(
                parse_expression("[1, 'a', {b: null}]").unwrap(),
                Expression::literal(serde_json::json!([1, "a", {"b": null}]))
            );
            assert_eq!(
                parse_expression("1.5").unwrap(),
                Expression::literal(serde_json::json!(1.5))
            );
            assert!(matches!(
                parse_expression("[a, 1]").unwrap().kind,
                ExpressionKind::Array(_)
            ));
            assert!(matches!(
                parse_expression("{key: a}").unwrap().kind,
                ExpressionKind::Object(_)
            ));
        }

        #[test]
        fn test_scoped_paths() {
            assert_eq!(
                parse_expression("this.name").unwrap().kind,
                ExpressionKind::Relative(vec![Segment::from("name")])
            );
            assert_eq!(
                parse_expression("#item.name").unwrap().kind,
                ExpressionKind::Alias {
                    alias: "#item".to_string(),
                    segments: vec![Segment::from("name")],
                }
            );
            assert_eq!(
                parse_expression("@title").unwrap().kind,
                ExpressionKind::Attribute {
                    attribute: "title".to_string(),
                    segments: Vec::new(),
                }
            );
        }

        #[test]
        fn test_sequence() {
            assert!(matches!(
                parse_expression("(a, b)").unwrap().kind,
                ExpressionKind::Sequence(ref items) if items.len() == 2
            ));
        }

        #[test]
        fn test_errors() {
            assert!(parse_expression("a +").is_err());
            assert!(parse_expression("'open").is_err());
            assert!(parse_expression("a b").is_err());
            assert!(parse_expression("(1 + 2)[x]").is_err());
        }
    }

    mod tags {
        use super::*;

        #[test]
        fn test_inline() {
            let TagContent::Expression(expression) = parse_tag("_page.key").unwrap() else {
                panic!("expected an inline expression");
            };
            assert_eq!(expression.source(), "_page.key");
            assert_eq!(expression.block_type(), None);
        }

        #[test]
        fn test_unescaped_and_bind_type() {
            let TagContent::Expression(expression) = parse_tag("unescaped html").unwrap() else {
                panic!("expected an inline expression");
            };
            assert!(expression.is_unescaped());
            let TagContent::Expression(expression) = parse_tag("unbound name").unwrap() else {
                panic!("expected an inline expression");
            };
            assert_eq!(expression.bind_type(), Some(BindType::Unbound));
        }

        #[test]
        fn test_each_with_aliases() {
            let TagContent::Open(expression) = parse_tag("each _page.items as #item, #i").unwrap()
            else {
                panic!("expected a block");
            };
            assert_eq!(expression.block_type(), Some(BlockType::Each));
            assert_eq!(expression.alias(), Some("#item"));
            assert_eq!(expression.key_alias(), Some("#i"));
            assert_eq!(expression.kind, path(&["_page", "items"]).kind);
        }

        #[test]
        fn test_as_inside_string_is_not_an_alias() {
            let TagContent::Open(expression) = parse_tag("with lookup('as #x')").unwrap() else {
                panic!("expected a block");
            };
            assert_eq!(expression.alias(), None);
        }

        #[test]
        fn test_else_and_close() {
            assert!(matches!(
                parse_tag("else").unwrap(),
                TagContent::Else(Expression { kind: ExpressionKind::Else, .. })
            ));
            let TagContent::Else(expression) = parse_tag("else if x").unwrap() else {
                panic!("expected else");
            };
            assert_eq!(expression.block_type(), Some(BlockType::If));
            assert_eq!(parse_tag("/").unwrap(), TagContent::Close(None));
            assert_eq!(
                parse_tag("/each").unwrap(),
                TagContent::Close(Some("each".to_string()))
            );
        }

        #[test]
        fn test_bare_unbound_block() {
            let TagContent::Open(expression) = parse_tag("unbound").unwrap() else {
                panic!("expected a block");
            };
            assert_eq!(expression.block_type(), Some(BlockType::Unbound));
        }

        #[test]
        fn test_alias_errors() {
            assert!(parse_tag("with x as item").is_err());
            assert!(parse_tag("with x as #a, #b").is_err());
            assert!(parse_tag("if").is_err());
        }

        #[test]
        fn test_unknown_keyword() {
            assert_eq!(unknown_block_keyword("loop items"), Some("loop"));
            assert_eq!(unknown_block_keyword("each items"), None);
            assert_eq!(unknown_block_keyword("a + b"), None);
            assert_eq!(unknown_block_keyword("name"), None);
        }
    }
}
