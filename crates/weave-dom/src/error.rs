use thiserror::Error;

use crate::document::NodeId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0} is not a text node")]
    NotText(NodeId),

    #[error("offset {offset} is not a character boundary of text node {node}")]
    InvalidOffset { node: NodeId, offset: usize },

    #[error("unterminated {what} at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },
}
