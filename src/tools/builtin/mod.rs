//! Built-in tools for onboarding cases and direct integration calls.

pub mod integrations;
pub mod onboarding;

use std::sync::Arc;

use crate::onboarding::orchestrator::Orchestrator;
use crate::tools::ToolRegistry;

pub use integrations::{GdriveShareDocsTool, GithubInviteTool, SlackSendWelcomeTool};
pub use onboarding::{
    CheckStatusTool, ChecklistTool, CompleteTaskTool, ListEmployeesTool, OnboardNewHireTool,
    RetryTaskTool,
};

/// Register every built-in tool.
pub fn register_onboarding_tools(registry: &ToolRegistry, orchestrator: &Orchestrator) {
    let dispatcher = orchestrator.dispatcher().clone();
    registry.register_sync(Arc::new(OnboardNewHireTool::new(orchestrator.clone())));
    registry.register_sync(Arc::new(CheckStatusTool::new(orchestrator.clone())));
    registry.register_sync(Arc::new(ChecklistTool::new(orchestrator.clone())));
    registry.register_sync(Arc::new(CompleteTaskTool::new(orchestrator.clone())));
    registry.register_sync(Arc::new(RetryTaskTool::new(orchestrator.clone())));
    registry.register_sync(Arc::new(ListEmployeesTool::new(orchestrator.clone())));
    registry.register_sync(Arc::new(SlackSendWelcomeTool::new(dispatcher.clone())));
    registry.register_sync(Arc::new(GithubInviteTool::new(dispatcher.clone())));
    registry.register_sync(Arc::new(GdriveShareDocsTool::new(dispatcher)));
}
