use thiserror::Error;

use crate::path::Path;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// A path component tried to descend into a scalar value.
    #[error("cannot descend into `{path}`: value is not an object or array")]
    NotAContainer { path: Path },

    /// An array operation was issued against a non-array value.
    #[error("`{path}` is not an array")]
    NotAnArray { path: Path },

    #[error("index {index} is out of bounds for `{path}` (length {len})")]
    IndexOutOfBounds { path: Path, index: usize, len: usize },

    /// The root of the model can only be replaced wholesale with an object.
    #[error("the model root must be an object")]
    RootNotObject,
}
