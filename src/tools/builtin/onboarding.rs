//! Tools over the orchestrator: start, inspect, and steer onboarding cases.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::onboarding::model::OnboardingRequest;
use crate::onboarding::orchestrator::Orchestrator;
use crate::tools::tool::{Tool, ToolError, ToolOutput, optional_str, require_str};

fn require_employee_id(params: &serde_json::Value) -> Result<Uuid, ToolError> {
    let raw = require_str(params, "employee_id")?;
    Uuid::parse_str(raw.trim())
        .map_err(|_| ToolError::InvalidParameters(format!("employee_id is not a valid id: {raw}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::ExecutionFailed(e.to_string()))
}

/// Create an employee record and start its checklist.
pub struct OnboardNewHireTool {
    orchestrator: Orchestrator,
}

impl OnboardNewHireTool {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for OnboardNewHireTool {
    fn name(&self) -> &str {
        "onboard_new_hire"
    }

    fn description(&self) -> &str {
        "Start onboarding for a new employee. Creates the record from the role's \
         checklist and begins running the automated tasks (Slack, GitHub, Google Drive) \
         in the background. Returns the employee id and the initial task list."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Full name of the new hire" },
                "email": { "type": "string", "description": "Work email address" },
                "role": { "type": "string", "description": "Job title, e.g. \"Software Engineer\"" },
                "team": { "type": "string", "description": "Team name, e.g. \"Platform\"" },
                "github_username": { "type": "string", "description": "GitHub username (engineering roles)" },
                "start_date": { "type": "string", "description": "YYYY-MM-DD, defaults to today" }
            },
            "required": ["name", "email", "role", "team"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let request: OnboardingRequest = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;
        let created = self.orchestrator.onboard(request).await?;

        let result = json!({
            "employee_id": created.employee.id,
            "role_key": created.employee.role_key,
            "total_tasks": created.total_tasks,
            "tasks": created.employee.tasks,
        });
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

/// Full status of one employee.
pub struct CheckStatusTool {
    orchestrator: Orchestrator,
}

impl CheckStatusTool {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for CheckStatusTool {
    fn name(&self) -> &str {
        "check_onboarding_status"
    }

    fn description(&self) -> &str {
        "Check onboarding progress for an employee, looked up by id or email: \
         every task with its status, attempts and last error, plus \
         completed/pending/failed counts."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": { "type": "string", "description": "Id returned by onboard_new_hire" },
                "email": { "type": "string", "description": "Used when employee_id is not given" }
            }
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let id = match optional_str(&params, "email") {
            Some(email) if params.get("employee_id").is_none() => self
                .orchestrator
                .find_by_email(email)
                .await
                .map(|e| e.id)
                .ok_or_else(|| ToolError::NotFound(format!("no employee with email {email}")))?,
            _ => require_employee_id(&params)?,
        };
        let status = self.orchestrator.status(id).await?;
        Ok(ToolOutput::success(to_value(&status)?, start.elapsed()))
    }
}

pub struct ChecklistTool {
    orchestrator: Orchestrator,
}

impl ChecklistTool {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for ChecklistTool {
    fn name(&self) -> &str {
        "get_onboarding_checklist"
    }

    fn description(&self) -> &str {
        "Show the checklist a role would receive: tasks, Slack channels, \
         documents and repositories. Unknown roles get the general checklist."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "role": { "type": "string", "description": "Job title or template key, e.g. \"engineering\"" }
            },
            "required": ["role"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let role = require_str(&params, "role")?;
        let workflow = self.orchestrator.checklist(role);
        let mut result = to_value(workflow)?;
        result["role"] = json!(role);
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

/// Mark a task done by hand; unblocks its dependents.
pub struct CompleteTaskTool {
    orchestrator: Orchestrator,
}

impl CompleteTaskTool {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        "complete_task"
    }

    fn description(&self) -> &str {
        "Mark an onboarding task as complete, e.g. a manual step done by a person. \
         Completing an already completed task changes nothing."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": { "type": "string" },
                "task_id": { "type": "string" },
                "details": { "type": "string", "description": "Optional notes about the completion" }
            },
            "required": ["employee_id", "task_id"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let id = require_employee_id(&params)?;
        let task_id = require_str(&params, "task_id")?;
        let details = optional_str(&params, "details").map(String::from);
        let result = self.orchestrator.complete_task(id, task_id, details).await?;
        Ok(ToolOutput::success(to_value(&result)?, start.elapsed()))
    }
}

/// Re-run a failed task.
pub struct RetryTaskTool {
    orchestrator: Orchestrator,
}

impl RetryTaskTool {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for RetryTaskTool {
    fn name(&self) -> &str {
        "retry_task"
    }

    fn description(&self) -> &str {
        "Send a failed onboarding task back to pending so it runs again with a fresh attempt budget."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": { "type": "string" },
                "task_id": { "type": "string" }
            },
            "required": ["employee_id", "task_id"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let id = require_employee_id(&params)?;
        let task_id = require_str(&params, "task_id")?;
        let task = self.orchestrator.retry_task(id, task_id).await?;
        Ok(ToolOutput::success(
            json!({ "employee_id": id, "task": task }),
            start.elapsed(),
        ))
    }
}

pub struct ListEmployeesTool {
    orchestrator: Orchestrator,
}

impl ListEmployeesTool {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for ListEmployeesTool {
    fn name(&self) -> &str {
        "list_all_employees"
    }

    fn description(&self) -> &str {
        "List every employee being onboarded with their progress."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let employees = self.orchestrator.list().await;
        Ok(ToolOutput::success(
            json!({ "total": employees.len(), "employees": employees }),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::EngineConfig;
    use crate::integrations::Dispatcher;
    use crate::store::Store;
    use crate::workflow::TemplateSet;

    fn orchestrator() -> Orchestrator {
        let config = EngineConfig {
            base_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        Orchestrator::new(
            Arc::new(Store::in_memory()),
            Arc::new(TemplateSet::builtin().unwrap()),
            Arc::new(Dispatcher::new(&config)),
            config,
        )
    }

    #[tokio::test]
    async fn onboard_then_check_status() {
        let o = orchestrator();
        let out = OnboardNewHireTool::new(o.clone())
            .execute(json!({
                "name": "Ada Lovelace",
                "email": "ada@example.com",
                "role": "Software Engineer",
                "team": "Platform",
                "github_username": "ada"
            }))
            .await
            .unwrap();
        assert_eq!(out.result["role_key"], "engineering");
        assert_eq!(out.result["total_tasks"], 10);

        let id = out.result["employee_id"].as_str().unwrap().to_string();
        let status = CheckStatusTool::new(o)
            .execute(json!({ "employee_id": id }))
            .await
            .unwrap();
        assert_eq!(status.result["name"], "Ada Lovelace");
        assert_eq!(status.result["total_tasks"], 10);
    }

    #[tokio::test]
    async fn bad_params_are_invalid() {
        let o = orchestrator();
        let err = OnboardNewHireTool::new(o.clone())
            .execute(json!({ "name": "Ada" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));

        let err = OnboardNewHireTool::new(o.clone())
            .execute(json!({
                "name": "Ada", "email": "not-an-email", "role": "x", "team": "y"
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));

        let err = CheckStatusTool::new(o)
            .execute(json!({ "employee_id": "nope" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn check_status_by_email() {
        let o = orchestrator();
        let created = o
            .onboard(OnboardingRequest::new("Grace", "grace@example.com", "Designer", "Brand"))
            .await
            .unwrap();

        let status = CheckStatusTool::new(o.clone())
            .execute(json!({ "email": "Grace@Example.com" }))
            .await
            .unwrap();
        assert_eq!(status.result["id"], created.employee.id.to_string());

        let err = CheckStatusTool::new(o)
            .execute(json!({ "email": "nobody@example.com" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_employee_is_not_found() {
        let err = CompleteTaskTool::new(orchestrator())
            .execute(json!({ "employee_id": Uuid::new_v4().to_string(), "task_id": "abc" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn checklist_for_unknown_role_is_general() {
        let out = ChecklistTool::new(orchestrator())
            .execute(json!({ "role": "Astronaut" }))
            .await
            .unwrap();
        assert_eq!(out.result["role"], "Astronaut");
        assert_eq!(out.result["role_key"], "general");
        assert!(out.result["repos"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_counts_employees() {
        let o = orchestrator();
        for (name, email) in [("Ada", "ada@example.com"), ("Grace", "grace@example.com")] {
            o.onboard(OnboardingRequest::new(name, email, "Designer", "Brand"))
                .await
                .unwrap();
        }
        let out = ListEmployeesTool::new(o).execute(json!({})).await.unwrap();
        assert_eq!(out.result["total"], 2);
    }
}
