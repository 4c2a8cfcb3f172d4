use serde::Serialize;
use thiserror::Error;

use crate::tokens::LineOffsets;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
pub enum TemplateError {
    /// Malformed markup: an unterminated tag, comment or `{{`.
    #[error("{message} ({context})")]
    Parse { message: String, context: String },

    #[error("unknown block `{keyword}` ({context})")]
    UnknownBlock { keyword: String, context: String },

    /// A closing tag naming a different block than the one open.
    #[error("mismatched block: expected `{{{{/{expected}}}}}`, found `{{{{/{found}}}}}` ({context})")]
    MismatchedBlock {
        expected: String,
        found: String,
        context: String,
    },

    #[error("unclosed block `{block}` ({context})")]
    UnclosedBlock { block: String, context: String },

    #[error("unclosed element `<{tag}>` ({context})")]
    UnclosedElement { tag: String, context: String },

    #[error("invalid expression `{expression}`: {message} ({context})")]
    Expression {
        expression: String,
        message: String,
        context: String,
    },

    #[error("cannot deserialize template at offset {offset}: {message}")]
    Deserialize { message: String, offset: usize },
}

/// Where in the template source an error occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SourceContext<'a> {
    pub source: &'a str,
    pub offsets: &'a LineOffsets,
}

impl SourceContext<'_> {
    /// `line L, column C: <snippet>` for a byte offset into the source.
    pub fn describe(&self, offset: usize) -> String {
        let (line, column) = self.offsets.position_to_line_col(offset);
        let line_text = self
            .source
            .get(offset.saturating_sub(column)..)
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default()
            .trim();
        let snippet: String = line_text.chars().take(60).collect();
        format!("line {line}, column {}: {snippet}", column + 1)
    }
}

/// An expression syntax error, before source context is attached.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message} at character {position}")]
pub struct ExpressionError {
    pub message: String,
    pub position: usize,
}

impl ExpressionError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}
