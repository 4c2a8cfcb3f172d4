//! The binding engine behind weave views.
//!
//! An [`App`] holds compiled views plus the functions and handlers their
//! expressions call. A [`Page`] renders those views against a
//! [`weave_model::Model`], either to a string or into a [`weave_dom::Document`].
//! Rendering into a document also records bindings: every model mutation made
//! through the page is routed to the bindings that depend on it, and only
//! their part of the DOM is patched.

mod app;
mod bindings;
mod contexts;
mod controller;
mod error;
mod eval;
mod event_model;
mod page;
mod registry;
mod render;
mod value;
mod views;

pub use app::App;
pub use bindings::BindingId;
pub use contexts::ContextId;
pub use controller::Component;
pub use controller::ComponentFactory;
pub use controller::Controller;
pub use controller::ControllerId;
pub use controller::ElementRef;
pub use controller::Function;
pub use controller::Handler;
pub use error::ViewError;
pub use eval::PathSegment;
pub use eval::ResolvedPath;
pub use page::Page;
pub use registry::AppRegistry;
pub use value::apply_operator;
pub use value::TemplateValue;
pub use value::Value;
pub use views::View;
pub use views::Views;
