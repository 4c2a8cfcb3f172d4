use thiserror::Error;
use weave_dom::DomError;
use weave_model::ModelError;
use weave_templates::TemplateError;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ViewError {
    #[error("function `{0}` is not defined")]
    UnknownFunction(String),

    #[error("view `{0}` is not registered")]
    UnknownView(String),

    /// Server markup did not match the template being attached to it.
    #[error("attach failed: expected {expected}, found {found}")]
    Attach { expected: String, found: String },

    #[error("`{0}` does not name a model path and cannot be set")]
    NotSettable(String),

    #[error("app `{0}` is not registered")]
    UnknownApp(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Dom(#[from] DomError),
}

impl ViewError {
    #[must_use]
    pub fn is_attach(&self) -> bool {
        matches!(self, ViewError::Attach { .. })
    }
}
