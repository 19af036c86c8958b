//! Role-keyed onboarding checklist templates.

pub mod model;
pub mod templates;

pub use model::{ResolvedWorkflow, RoleTemplate, TaskAction, TaskBlueprint, TaskCategory};
pub use templates::{GENERAL, TemplateSet};
