//! The weave template compiler.
//!
//! Source text becomes an immutable [`Template`] tree whose dynamic parts
//! carry [`Expression`]s. Trees can be written to and read back from the
//! constructor-call text form with [`serialize`] and [`deserialize`].

mod error;
mod expression_parser;
mod expressions;
mod files;
mod lexer;
mod nodes;
mod parser;
mod serialize;
mod tokens;

use std::rc::Rc;

pub use error::TemplateError;
pub use expressions::BindType;
pub use expressions::BlockType;
pub use expressions::Expression;
pub use expressions::ExpressionKind;
pub use expressions::ExpressionMeta;
pub use expressions::Operator;
pub use expressions::ROOT_ALIAS;
pub use files::parse_file;
pub use files::ViewSource;
pub use files::DEFAULT_VIEW;
pub use nodes::Attribute;
pub use nodes::AttributeValue;
pub use nodes::Block;
pub use nodes::ConditionalBlock;
pub use nodes::Content;
pub use nodes::DynamicElement;
pub use nodes::EachBlock;
pub use nodes::Element;
pub use nodes::MarkupHook;
pub use nodes::Template;
pub use nodes::ViewAttribute;
pub use nodes::ViewInstance;
pub use serialize::deserialize;
pub use serialize::deserialize_expression;
pub use serialize::serialize;
pub use serialize::serialize_expression;
pub use tokens::LineOffsets;

use crate::error::SourceContext;
use crate::parser::Parser;

/// Parse template source into a fragment.
pub fn parse(source: &str) -> Result<Rc<Template>, TemplateError> {
    let offsets = LineOffsets::from_source(source);
    let context = SourceContext {
        source,
        offsets: &offsets,
    };
    Parser::for_range(context, 0, source.len())?.parse()
}

/// Parse a single expression, as written inside `{{ }}` without a block keyword.
pub fn parse_expression(source: &str) -> Result<Expression, TemplateError> {
    expression_parser::parse_expression(source).map_err(|err| TemplateError::Expression {
        expression: source.to_string(),
        message: err.message,
        context: format!("character {}", err.position),
    })
}
