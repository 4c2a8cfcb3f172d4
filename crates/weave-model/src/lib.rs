//! The observable data store rendered by weave views.
//!
//! A [`Model`] is a JSON tree addressed by [`Path`]s. Every mutating call
//! returns the [`Mutation`] it caused so the caller can dispatch it to live
//! bindings before anything else touches the store.

mod error;
mod model;
mod path;

pub use error::ModelError;
pub use model::ChildModel;
pub use model::Model;
pub use model::Mutation;
pub use path::Path;
pub use path::Segment;
pub use serde_json::Value as JsonValue;
