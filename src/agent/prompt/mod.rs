//! Prompt generation for review tasks.

pub mod review;
pub mod template;

pub use review::ReviewTemplates;
pub use template::{Template, TemplateError};
