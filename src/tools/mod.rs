//! Tool abstraction for the line-delimited JSON tool server.

pub mod builtin;
pub mod registry;
pub mod tool;

pub use builtin::register_onboarding_tools;
pub use registry::ToolRegistry;
pub use tool::*;
