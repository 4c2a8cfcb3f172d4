use crate::tokens::RawAttribute;
use crate::tokens::Token;

const TAG_START: &str = "{{";
const TAG_END: &str = "}}";
const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub offset: usize,
}

impl LexError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Splits template source into markup and `{{ }}` tokens.
pub struct Lexer<'a> {
    source: &'a str,
    /// Offset of `source` within the file it was cut from.
    base: usize,
    current: usize,
    /// When false only text and `{{ }}` are recognized (attribute values).
    markup: bool,
    raw_text: Option<String>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn with_base(source: &'a str, base: usize) -> Self {
        Lexer {
            source,
            base,
            current: 0,
            markup: true,
            raw_text: None,
        }
    }

    /// A lexer for an attribute value, where `<` is plain text.
    #[must_use]
    pub fn attribute_value(source: &'a str, base: usize) -> Self {
        Lexer {
            markup: false,
            ..Self::with_base(source, base)
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            let rest = self.rest();
            let token = if rest.starts_with(TAG_START) {
                self.lex_tag()?
            } else if self.in_markup() && rest.starts_with(COMMENT_START) {
                self.lex_comment()?
            } else if self.in_markup() && starts_with_ignore_case(rest, "<!doctype") {
                self.lex_doctype()?
            } else if self.markup && self.at_end_tag() {
                self.lex_end_tag()?
            } else if self.in_markup() && self.at_start_tag() {
                self.lex_start_tag()?
            } else {
                self.lex_text()
            };
            tokens.push(token);
        }

        tokens.push(Token::Eof {
            offset: self.base + self.current,
        });
        Ok(tokens)
    }

    fn lex_tag(&mut self) -> Result<Token, LexError> {
        let start = self.current;
        let body_start = start + TAG_START.len();
        let end = self.source[body_start..]
            .find(TAG_END)
            .ok_or_else(|| LexError::new("unclosed `{{`", self.base + start))?;
        let content = self.source[body_start..body_start + end].trim().to_string();
        self.current = body_start + end + TAG_END.len();
        Ok(Token::Tag {
            content,
            offset: self.base + start,
        })
    }

    fn lex_comment(&mut self) -> Result<Token, LexError> {
        let start = self.current;
        let body_start = start + COMMENT_START.len();
        let end = self.source[body_start..]
            .find(COMMENT_END)
            .ok_or_else(|| LexError::new("unclosed comment", self.base + start))?;
        let content = self.source[body_start..body_start + end].to_string();
        self.current = body_start + end + COMMENT_END.len();
        Ok(Token::Comment {
            content,
            offset: self.base + start,
        })
    }

    fn lex_doctype(&mut self) -> Result<Token, LexError> {
        let start = self.current;
        let end = self.source[start..]
            .find('>')
            .ok_or_else(|| LexError::new("unclosed doctype", self.base + start))?;
        let content = self.source[start + "<!doctype".len()..start + end]
            .trim()
            .to_string();
        self.current = start + end + 1;
        Ok(Token::Doctype {
            content,
            offset: self.base + start,
        })
    }

    fn at_start_tag(&self) -> bool {
        let bytes = self.rest().as_bytes();
        bytes.first() == Some(&b'<') && bytes.get(1).is_some_and(u8::is_ascii_alphabetic)
    }

    fn at_end_tag(&self) -> bool {
        let rest = self.rest();
        let Some(after) = rest.strip_prefix("</") else {
            return false;
        };
        match &self.raw_text {
            Some(name) => starts_with_ignore_case(after, name),
            None => after.starts_with(|c: char| c.is_ascii_alphabetic()),
        }
    }

    fn lex_end_tag(&mut self) -> Result<Token, LexError> {
        let start = self.current;
        let end = self.source[start..]
            .find('>')
            .ok_or_else(|| LexError::new("unclosed end tag", self.base + start))?;
        let name = self.source[start + 2..start + end].trim().to_string();
        self.current = start + end + 1;
        self.raw_text = None;
        Ok(Token::EndTag {
            name,
            offset: self.base + start,
        })
    }

    fn lex_start_tag(&mut self) -> Result<Token, LexError> {
        let start = self.current;
        let base = self.base;
        let unclosed = || LexError::new("unclosed start tag", base + start);
        let bytes = self.source.as_bytes();
        let mut pos = start + 1;
        while pos < bytes.len()
            && !bytes[pos].is_ascii_whitespace()
            && !matches!(bytes[pos], b'>' | b'/')
        {
            pos += 1;
        }
        let name = self.source[start + 1..pos].to_string();
        let mut attributes = Vec::new();

        let self_closing = loop {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            match bytes.get(pos).ok_or_else(unclosed)? {
                b'>' => {
                    pos += 1;
                    break false;
                }
                b'/' if bytes.get(pos + 1) == Some(&b'>') => {
                    pos += 2;
                    break true;
                }
                b'/' => pos += 1,
                _ => {
                    let name_start = pos;
                    while pos < bytes.len()
                        && !bytes[pos].is_ascii_whitespace()
                        && !matches!(bytes[pos], b'=' | b'>')
                        && !(bytes[pos] == b'/' && bytes.get(pos + 1) == Some(&b'>'))
                    {
                        pos += 1;
                    }
                    let attr_name = self.source[name_start..pos].to_string();
                    let mut value = None;
                    let mut offset = self.base + name_start;
                    if bytes.get(pos) == Some(&b'=') {
                        pos += 1;
                        let (value_start, value_end, next) =
                            self.scan_attribute_value(pos).ok_or_else(unclosed)?;
                        value = Some(self.source[value_start..value_end].to_string());
                        offset = self.base + value_start;
                        pos = next;
                    }
                    attributes.push(RawAttribute {
                        name: attr_name,
                        value,
                        offset,
                    });
                }
            }
        };

        self.current = pos;
        if !self_closing && RAW_TEXT_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()) {
            self.raw_text = Some(name.to_ascii_lowercase());
        }
        Ok(Token::StartTag {
            name,
            attributes,
            self_closing,
            offset: self.base + start,
        })
    }

    /// Returns the value's bounds and the position after it. `{{ }}` regions
    /// are skipped whole, so quotes inside expressions do not end the value.
    fn scan_attribute_value(&self, pos: usize) -> Option<(usize, usize, usize)> {
        let bytes = self.source.as_bytes();
        let quote = match bytes.get(pos)? {
            quote @ (b'"' | b'\'') => Some(*quote),
            _ => None,
        };
        let value_start = if quote.is_some() { pos + 1 } else { pos };
        let mut cursor = value_start;
        loop {
            if self
                .source
                .get(cursor..)
                .is_some_and(|rest| rest.starts_with(TAG_START))
            {
                let end = self.source[cursor + TAG_START.len()..].find(TAG_END)?;
                cursor += TAG_START.len() + end + TAG_END.len();
                continue;
            }
            match (bytes.get(cursor), quote) {
                (None, Some(_)) => return None,
                (None, None) => return Some((value_start, cursor, cursor)),
                (Some(byte), Some(quote)) if *byte == quote => {
                    return Some((value_start, cursor, cursor + 1));
                }
                (Some(byte), None) if byte.is_ascii_whitespace() || *byte == b'>' => {
                    return Some((value_start, cursor, cursor));
                }
                _ => cursor += 1,
            }
        }
    }

    fn lex_text(&mut self) -> Token {
        let start = self.current;
        let bytes = self.source.as_bytes();
        let mut pos = start + 1;
        while pos < bytes.len() {
            self.current = pos;
            let rest = self.rest();
            if rest.starts_with(TAG_START) {
                break;
            }
            if self.markup && bytes[pos] == b'<' {
                let stops = match &self.raw_text {
                    Some(_) => self.at_end_tag(),
                    None => {
                        self.at_start_tag()
                            || self.at_end_tag()
                            || rest.starts_with(COMMENT_START)
                            || starts_with_ignore_case(rest, "<!doctype")
                    }
                };
                if stops {
                    break;
                }
            }
            pos += 1;
        }
        self.current = pos.min(bytes.len());
        Token::Text {
            content: self.source[start..self.current].to_string(),
            offset: self.base + start,
        }
    }

    /// Markup outside a raw text element.
    fn in_markup(&self) -> bool {
        self.markup && self.raw_text.is_none()
    }

    fn rest(&self) -> &'a str {
        self.source.get(self.current..).unwrap_or_default()
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<String> {
        Lexer::with_base(source, 0)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|token| match token {
                Token::Text { content, .. } => format!("text({content})"),
                Token::Tag { content, .. } => format!("tag({content})"),
                Token::Comment { content, .. } => format!("comment({content})"),
                Token::Doctype { content, .. } => format!("doctype({content})"),
                Token::StartTag {
                    name, self_closing, ..
                } => format!("start({name}{})", if self_closing { "/" } else { "" }),
                Token::EndTag { name, .. } => format!("end({name})"),
                Token::Eof { .. } => "eof".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_text_and_tags() {
        assert_eq!(
            kinds("Hi {{ name }}!"),
            vec!["text(Hi )", "tag(name)", "text(!)", "eof"]
        );
    }

    #[test]
    fn test_markup() {
        assert_eq!(
            kinds("<!DOCTYPE html><p class=\"a\">x<br/></p>"),
            vec![
                "doctype(html)",
                "start(p)",
                "text(x)",
                "start(br/)",
                "end(p)",
                "eof"
            ]
        );
    }

    #[test]
    fn test_comment_is_not_parsed_for_tags() {
        assert_eq!(
            kinds("<!-- {{ not a tag }} -->"),
            vec!["comment( {{ not a tag }} )", "eof"]
        );
    }

    #[test]
    fn test_less_than_in_text() {
        assert_eq!(kinds("a < b"), vec!["text(a < b)", "eof"]);
    }

    #[test]
    fn test_script_is_raw_text() {
        assert_eq!(
            kinds("<script>if (a<b) {}</script>"),
            vec!["start(script)", "text(if (a<b) {})", "end(script)", "eof"]
        );
    }

    #[test]
    fn test_attribute_values_skip_expressions() {
        let tokens = Lexer::with_base(r#"<a title="{{ join(", ", list) }}" hidden href=x>"#, 0)
            .tokenize()
            .unwrap();
        let Token::StartTag { attributes, .. } = &tokens[0] else {
            panic!("expected start tag");
        };
        let values: Vec<_> = attributes
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_deref()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("title", Some(r#"{{ join(", ", list) }}"#)),
                ("hidden", None),
                ("href", Some("x")),
            ]
        );
    }

    #[test]
    fn test_attribute_value_mode() {
        let tokens = Lexer::attribute_value("a <b> {{c}}", 10).tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text {
                    content: "a <b> ".to_string(),
                    offset: 10
                },
                Token::Tag {
                    content: "c".to_string(),
                    offset: 16
                },
                Token::Eof { offset: 21 },
            ]
        );
    }

    #[test]
    fn test_unclosed_tag() {
        let err = Lexer::with_base("ok {{ oops", 0).tokenize().unwrap_err();
        assert_eq!(err.offset, 3);
    }
}
