use std::rc::Rc;

use crate::error::SourceContext;
use crate::error::TemplateError;
use crate::nodes::Template;
use crate::parser::Parser;
use crate::tokens::LineOffsets;

/// One `<Name:>` section of a view file.
#[derive(Debug, PartialEq)]
pub struct ViewSource {
    pub name: String,
    pub template: Rc<Template>,
}

/// Name used for a file with no section headers.
pub const DEFAULT_VIEW: &str = "Body";

/// Parse a view file into its sections.
///
/// A header is a `<Name:>` tag opening a line. The text after it up to the
/// next header, with surrounding whitespace trimmed, is that view's template. A file with
/// no headers is a single view named [`DEFAULT_VIEW`].
pub fn parse_file(source: &str) -> Result<Vec<ViewSource>, TemplateError> {
    let offsets = LineOffsets::from_source(source);
    let context = SourceContext {
        source,
        offsets: &offsets,
    };

    let headers = find_headers(source);
    if headers.is_empty() {
        let (start, end) = trimmed_range(source, 0, source.len());
        let template = Parser::for_range(context, start, end)?.parse()?;
        return Ok(vec![ViewSource {
            name: DEFAULT_VIEW.to_string(),
            template,
        }]);
    }

    let mut views = Vec::with_capacity(headers.len());
    for (i, header) in headers.iter().enumerate() {
        let end = headers.get(i + 1).map_or(source.len(), |next| next.start);
        let (start, end) = trimmed_range(source, header.end, end);
        let template = Parser::for_range(context, start, end)?.parse()?;
        tracing::trace!(view = %header.name, "parsed view section");
        views.push(ViewSource {
            name: header.name.clone(),
            template,
        });
    }
    Ok(views)
}

struct Header {
    name: String,
    /// Offset of the `<`.
    start: usize,
    /// Offset just past the `>`.
    end: usize,
}

fn find_headers(source: &str) -> Vec<Header> {
    let mut headers = Vec::new();
    let mut line_start = 0;
    for line in source.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let header = line[indent..]
            .strip_prefix('<')
            .and_then(|rest| rest.split_once('>'))
            .and_then(|(inside, _)| inside.trim_end().strip_suffix(':'))
            .filter(|name| {
                !name.is_empty()
                    && name
                        .chars()
                        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
            });
        if let Some(name) = header {
            let start = line_start + indent;
            let close = line[indent..].find('>').map_or(line.len(), |i| indent + i + 1);
            headers.push(Header {
                name: name.to_string(),
                start,
                end: line_start + close,
            });
        }
        line_start += line.len();
    }
    headers
}

fn trimmed_range(source: &str, start: usize, end: usize) -> (usize, usize) {
    let text = &source[start..end];
    let leading = text.len() - text.trim_start().len();
    let trailing = text.len() - text.trim_end().len();
    if leading == text.len() {
        return (start, start);
    }
    (start + leading, end - trailing)
}
