//! HTML serialization and fragment parsing for [`Document`] trees.

use crate::document::Document;
use crate::document::NodeId;
use crate::document::NodeKind;
use crate::error::DomError;

pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[must_use]
pub fn is_void_element(tag_name: &str) -> bool {
    VOID_ELEMENTS.contains(&tag_name.to_ascii_lowercase().as_str())
}

/// Elements whose content is text that is never escaped.
#[must_use]
pub fn is_raw_text_element(tag_name: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag_name.to_ascii_lowercase().as_str())
}

#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[must_use]
pub fn escape_attribute(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[must_use]
pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Which nodes an HTML serialization should include.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Leave comment nodes out. Block boundary markers are comments, so this
    /// gives the markup a reader of the page would see.
    pub skip_comments: bool,
}

impl Document {
    #[must_use]
    pub fn inner_html(&self, id: NodeId) -> String {
        self.inner_html_with(id, SerializeOptions::default())
    }

    #[must_use]
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, SerializeOptions::default(), &mut out);
        out
    }

    #[must_use]
    pub fn inner_html_with(&self, id: NodeId, options: SerializeOptions) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_node(child, options, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, options: SerializeOptions, out: &mut String) {
        match self.kind(id) {
            NodeKind::Fragment => {
                for child in self.children(id) {
                    self.write_node(child, options, out);
                }
            }
            NodeKind::Text(data) => {
                let raw = self
                    .parent(id)
                    .and_then(|parent| self.tag_name(parent))
                    .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
                if raw {
                    out.push_str(data);
                } else {
                    out.push_str(&escape_html(data));
                }
            }
            NodeKind::Comment(data) => {
                if !options.skip_comments {
                    out.push_str("<!--");
                    out.push_str(data);
                    out.push_str("-->");
                }
            }
            NodeKind::Doctype(data) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(data);
                out.push('>');
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(element.tag_name());
                for (name, value) in element.attributes() {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape_attribute(value));
                        out.push('"');
                    }
                }
                out.push('>');
                if is_void_element(element.tag_name()) {
                    return;
                }
                for child in self.children(id) {
                    self.write_node(child, options, out);
                }
                out.push_str("</");
                out.push_str(element.tag_name());
                out.push('>');
            }
        }
    }

    /// Parse an HTML fragment into a new detached fragment node.
    ///
    /// The parser accepts the markup produced by string rendering: elements,
    /// attributes, text, comments and a doctype. It does not implement the
    /// HTML5 tree-construction recovery rules.
    pub fn parse_fragment(&mut self, html: &str) -> Result<NodeId, DomError> {
        let fragment = self.create_fragment();
        let mut stack = vec![fragment];
        let mut pos = 0;

        while pos < html.len() {
            let rest = &html[pos..];
            let parent = *stack.last().unwrap_or(&fragment);

            if let Some(body) = rest.strip_prefix("<!--") {
                let end = body.find("-->").ok_or(DomError::Unterminated {
                    what: "comment",
                    offset: pos,
                })?;
                let comment = self.create_comment(&body[..end]);
                self.append_child(parent, comment);
                pos += 4 + end + 3;
            } else if rest
                .get(..9)
                .is_some_and(|head| head.eq_ignore_ascii_case("<!doctype"))
            {
                let end = rest.find('>').ok_or(DomError::Unterminated {
                    what: "doctype",
                    offset: pos,
                })?;
                let doctype = self.create_doctype(rest[9..end].trim());
                self.append_child(parent, doctype);
                pos += end + 1;
            } else if let Some(body) = rest.strip_prefix("</") {
                let end = body.find('>').ok_or(DomError::Unterminated {
                    what: "end tag",
                    offset: pos,
                })?;
                let name = body[..end].trim().to_ascii_lowercase();
                if let Some(depth) = stack
                    .iter()
                    .rposition(|node| self.tag_name(*node) == Some(name.as_str()))
                {
                    stack.truncate(depth);
                }
                pos += 2 + end + 1;
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                let (tag, consumed) = parse_start_tag(rest).ok_or(DomError::Unterminated {
                    what: "start tag",
                    offset: pos,
                })?;
                let element = self.create_element(&tag.name);
                for (name, value) in &tag.attributes {
                    self.set_attribute(element, name, value);
                }
                self.append_child(parent, element);
                pos += consumed;

                let tag_name = tag.name.to_ascii_lowercase();
                if RAW_TEXT_ELEMENTS.contains(&tag_name.as_str()) {
                    let close = format!("</{tag_name}");
                    let body = &html[pos..];
                    let end = body.to_ascii_lowercase().find(&close).unwrap_or(body.len());
                    if end > 0 {
                        let text = self.create_text(&body[..end]);
                        self.append_child(element, text);
                    }
                    pos += end;
                    if let Some(close_end) = html[pos..].find('>') {
                        pos += close_end + 1;
                    }
                } else if !tag.self_closing && !is_void_element(&tag_name) {
                    stack.push(element);
                }
            } else {
                let end = rest
                    .char_indices()
                    .skip(1)
                    .find(|(_, ch)| *ch == '<')
                    .map_or(rest.len(), |(i, _)| i);
                let text = self.create_text(&unescape(&rest[..end]));
                self.append_child(parent, text);
                pos += end;
            }
        }

        tracing::trace!(nodes = self.children(fragment).len(), "parsed fragment");
        Ok(fragment)
    }
}

struct StartTag {
    name: String,
    attributes: Vec<(String, String)>,
    self_closing: bool,
}

fn parse_start_tag(source: &str) -> Option<(StartTag, usize)> {
    let bytes = source.as_bytes();
    let mut pos = 1;
    let name_start = pos;
    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && !matches!(bytes[pos], b'>' | b'/')
    {
        pos += 1;
    }
    let name = source[name_start..pos].to_string();
    let mut attributes = Vec::new();

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        match bytes.get(pos)? {
            b'>' => {
                return Some((
                    StartTag {
                        name,
                        attributes,
                        self_closing: false,
                    },
                    pos + 1,
                ))
            }
            b'/' if bytes.get(pos + 1) == Some(&b'>') => {
                return Some((
                    StartTag {
                        name,
                        attributes,
                        self_closing: true,
                    },
                    pos + 2,
                ))
            }
            b'/' => pos += 1,
            _ => {
                let attr_start = pos;
                while pos < bytes.len()
                    && !bytes[pos].is_ascii_whitespace()
                    && !matches!(bytes[pos], b'=' | b'>' | b'/')
                {
                    pos += 1;
                }
                let attr_name = source[attr_start..pos].to_ascii_lowercase();
                let mut value = String::new();
                if bytes.get(pos) == Some(&b'=') {
                    pos += 1;
                    match bytes.get(pos)? {
                        quote @ (b'"' | b'\'') => {
                            let end = source[pos + 1..].find(char::from(*quote))?;
                            value = unescape(&source[pos + 1..pos + 1 + end]);
                            pos += end + 2;
                        }
                        _ => {
                            let value_start = pos;
                            while pos < bytes.len()
                                && !bytes[pos].is_ascii_whitespace()
                                && bytes[pos] != b'>'
                            {
                                pos += 1;
                            }
                            value = unescape(&source[value_start..pos]);
                        }
                    }
                }
                attributes.push((attr_name, value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_and_unescape_are_inverse_for_text() {
        let text = "a < b && \"c\" > d";
        assert_eq!(unescape(&escape_html(text)), text);
        assert_eq!(unescape(&escape_attribute(text)), text);
        assert_eq!(unescape("&#65;&#x42;&bogus;"), "AB&bogus;");
    }

    #[test]
    fn test_parse_and_serialize_round_trip() {
        let html = r#"<!DOCTYPE html><div class="a"><!--x--><p>One &amp; two</p><input value="v" checked><br></div>"#;
        let mut doc = Document::new();
        let fragment = doc.parse_fragment(html).unwrap();
        assert_eq!(doc.inner_html(fragment), html);
    }

    #[test]
    fn test_skip_comments_hides_markers() {
        let mut doc = Document::new();
        let fragment = doc.parse_fragment("<!--{{if}}-->yes<!--{{/if}}-->").unwrap();
        let html = doc.inner_html_with(
            fragment,
            SerializeOptions {
                skip_comments: true,
            },
        );
        insta::assert_snapshot!(html, @"yes");
    }

    #[test]
    fn test_unclosed_comment_is_an_error() {
        let mut doc = Document::new();
        assert!(matches!(
            doc.parse_fragment("<p><!-- oops</p>"),
            Err(DomError::Unterminated { what: "comment", .. })
        ));
    }

    #[test]
    fn test_script_content_is_raw_text() {
        let mut doc = Document::new();
        let fragment = doc.parse_fragment("<script>if (a < b) {}</script>").unwrap();
        let script = doc.first_child(fragment).unwrap();
        assert_eq!(doc.text_content(script), "if (a < b) {}");
    }
}
