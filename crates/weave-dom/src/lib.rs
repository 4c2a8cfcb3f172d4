//! An arena-backed DOM used as the render target for client-side views.
//!
//! Nodes live in a [`Document`] and are addressed by [`NodeId`] handles, so
//! the binding engine can keep its own side tables keyed by node instead of
//! attaching data to the nodes themselves.

mod document;
mod error;
mod html;

pub use document::Document;
pub use document::ElementData;
pub use document::NodeId;
pub use document::NodeKind;
pub use document::Property;
pub use error::DomError;
pub use html::escape_attribute;
pub use html::escape_html;
pub use html::is_raw_text_element;
pub use html::is_void_element;
pub use html::unescape;
pub use html::SerializeOptions;
pub use html::VOID_ELEMENTS;
