//! Employee and task records.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::workflow::{ResolvedWorkflow, TaskAction, TaskBlueprint, TaskCategory};

use super::state::TaskStatus;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
});

/// A request to onboard one new hire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingRequest {
    pub name: String,
    pub email: String,
    /// Job title or template key, e.g. "Software Engineer" or "design".
    pub role: String,
    pub team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
    /// Defaults to today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
}

impl OnboardingRequest {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
        team: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role: role.into(),
            team: team.into(),
            github_username: None,
            start_date: None,
        }
    }

    /// Builder: set the GitHub username.
    pub fn with_github(mut self, username: impl Into<String>) -> Self {
        self.github_username = Some(username.into());
        self
    }

    /// Builder: set the start date.
    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    /// Reject blank fields and malformed email addresses.
    pub fn validate(&self) -> Result<(), OnboardingError> {
        let required = [
            ("name", &self.name),
            ("email", &self.email),
            ("role", &self.role),
            ("team", &self.team),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if !EMAIL_RE.is_match(self.email.trim()) {
            return Err(invalid("email", "is not a valid email address"));
        }
        if let Some(handle) = &self.github_username
            && handle.trim().is_empty()
        {
            return Err(invalid("github_username", "must not be blank when supplied"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> OnboardingError {
    OnboardingError::InvalidRequest {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// One checklist item belonging to exactly one employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique within the owning employee.
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: TaskCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<TaskAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    #[serde(default)]
    pub manual: bool,
    pub status: TaskStatus,
    pub attempts: u32,
    /// Set only while the task is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Outcome detail from the integration, or a note from whoever completed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Instantiate a blueprint.
    pub fn from_blueprint(id: impl Into<String>, blueprint: &TaskBlueprint) -> Self {
        Self {
            id: id.into(),
            name: blueprint.name.clone(),
            description: blueprint.description.clone(),
            category: blueprint.category,
            action: blueprint.action,
            depends_on: blueprint.depends_on.clone(),
            manual: blueprint.manual,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            detail: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `target`, enforcing the state machine and keeping the
    /// timestamps and `last_error` consistent with the new status.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<(), OnboardingError> {
        if !self.status.can_transition_to(target) {
            return Err(OnboardingError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: target,
            });
        }
        self.status = target;

        match target {
            TaskStatus::InProgress => {
                self.started_at = Some(Utc::now());
            }
            TaskStatus::Completed => {
                self.completed_at = Some(Utc::now());
                self.last_error = None;
            }
            TaskStatus::Pending => {
                self.last_error = None;
                self.started_at = None;
            }
            TaskStatus::Failed => {}
        }
        Ok(())
    }

    /// Claim the task for its first dispatch attempt.
    pub fn start(&mut self) -> Result<(), OnboardingError> {
        self.transition_to(TaskStatus::InProgress)?;
        self.attempts = 1;
        Ok(())
    }

    /// Record a successful dispatch.
    pub fn succeed(&mut self, detail: Option<String>) -> Result<(), OnboardingError> {
        self.transition_to(TaskStatus::Completed)?;
        self.detail = detail;
        Ok(())
    }

    /// Settle on `failed` with the last reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), OnboardingError> {
        self.transition_to(TaskStatus::Failed)?;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// Send a failed task back to `pending` with a fresh attempt budget.
    pub fn reset_for_retry(&mut self) -> Result<(), OnboardingError> {
        if self.status != TaskStatus::Failed {
            return Err(OnboardingError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: TaskStatus::Pending,
            });
        }
        self.transition_to(TaskStatus::Pending)?;
        self.attempts = 0;
        self.detail = None;
        Ok(())
    }
}

/// The aggregate root for one onboarding case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
    pub start_date: NaiveDate,
    /// Template key the role resolved to.
    pub role_key: String,
    pub created_at: DateTime<Utc>,
    /// When every task first reached `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub tasks: Vec<Task>,
}

impl Employee {
    /// Build a new record with every task `pending`, in template order.
    pub fn new(request: &OnboardingRequest, workflow: &ResolvedWorkflow) -> Self {
        let now = Utc::now();
        let mut used_ids = HashSet::new();
        let tasks = workflow
            .tasks
            .iter()
            .map(|bp| {
                let id = loop {
                    let candidate = Uuid::new_v4().simple().to_string()[..8].to_string();
                    if used_ids.insert(candidate.clone()) {
                        break candidate;
                    }
                };
                Task::from_blueprint(id, bp)
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            role: request.role.trim().to_string(),
            team: request.team.trim().to_string(),
            github_username: request
                .github_username
                .as_ref()
                .map(|h| h.trim().trim_start_matches('@').to_string()),
            start_date: request.start_date.unwrap_or_else(|| now.date_naive()),
            role_key: workflow.role_key.clone(),
            created_at: now,
            completed_at: None,
            tasks,
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    pub fn total_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed_tasks(&self) -> usize {
        self.count(TaskStatus::Completed)
    }

    pub fn pending_tasks(&self) -> usize {
        self.count(TaskStatus::Pending)
    }

    pub fn failed_tasks(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// `round(100 * completed / total)`, or 0 for an empty checklist.
    pub fn progress_percent(&self) -> u8 {
        let total = self.total_tasks();
        if total == 0 {
            return 0;
        }
        ((self.completed_tasks() as f64 / total as f64) * 100.0).round() as u8
    }

    pub fn is_complete(&self) -> bool {
        !self.tasks.is_empty() && self.completed_tasks() == self.total_tasks()
    }

    /// Whether the task's dependency (if any) has completed.
    pub fn dependency_met(&self, task: &Task) -> bool {
        match &task.depends_on {
            None => true,
            Some(dep) => self
                .tasks
                .iter()
                .any(|t| &t.name == dep && t.status == TaskStatus::Completed),
        }
    }

    /// Pending, automatable tasks whose dependency has completed.
    pub fn eligible_task_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending && !t.manual && self.dependency_met(t))
            .map(|t| t.id.clone())
            .collect()
    }

    /// Stamp `completed_at` the first time the checklist is fully done.
    pub fn refresh_completion(&mut self) {
        if self.completed_at.is_none() && self.is_complete() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// Full employee view with progress computed at read time.
#[derive(Debug, Clone, Serialize)]
pub struct EmployeeStatus {
    #[serde(flatten)]
    pub employee: Employee,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
    pub failed_tasks: usize,
    pub progress_percent: u8,
}

impl From<Employee> for EmployeeStatus {
    fn from(employee: Employee) -> Self {
        Self {
            total_tasks: employee.total_tasks(),
            completed_tasks: employee.completed_tasks(),
            pending_tasks: employee.pending_tasks(),
            failed_tasks: employee.failed_tasks(),
            progress_percent: employee.progress_percent(),
            employee,
        }
    }
}

/// One row of the employee list.
#[derive(Debug, Clone, Serialize)]
pub struct EmployeeSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub team: String,
    pub start_date: NaiveDate,
    pub progress_percent: u8,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Employee> for EmployeeSummary {
    fn from(e: &Employee) -> Self {
        Self {
            id: e.id,
            name: e.name.clone(),
            email: e.email.clone(),
            role: e.role.clone(),
            team: e.team.clone(),
            start_date: e.start_date,
            progress_percent: e.progress_percent(),
            total_tasks: e.total_tasks(),
            completed_tasks: e.completed_tasks(),
            failed_tasks: e.failed_tasks(),
            completed_at: e.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::TemplateSet;

    fn engineer() -> Employee {
        let set = TemplateSet::builtin().unwrap();
        let req = OnboardingRequest::new("Ada", "ada@example.com", "Software Engineer", "Platform")
            .with_github("@ada");
        Employee::new(&req, set.resolve(&req.role))
    }

    #[test]
    fn request_validation() {
        let ok = OnboardingRequest::new("Ada", "ada@example.com", "Engineer", "Platform");
        assert!(ok.validate().is_ok());

        let blank_name = OnboardingRequest::new("  ", "ada@example.com", "Engineer", "Platform");
        assert!(matches!(
            blank_name.validate(),
            Err(OnboardingError::InvalidRequest { ref field, .. }) if field == "name"
        ));

        for bad in ["", "ada", "ada@", "ada@example", "a da@example.com"] {
            let req = OnboardingRequest::new("Ada", bad, "Engineer", "Platform");
            assert!(
                matches!(
                    req.validate(),
                    Err(OnboardingError::InvalidRequest { ref field, .. }) if field == "email"
                ),
                "{bad:?} should be rejected"
            );
        }

        let blank_handle = ok.clone().with_github(" ");
        assert!(blank_handle.validate().is_err());
    }

    #[test]
    fn new_employee_has_pending_tasks_in_template_order() {
        let e = engineer();
        let set = TemplateSet::builtin().unwrap();
        let names: Vec<&str> = e.tasks.iter().map(|t| t.name.as_str()).collect();
        let expected: Vec<&str> = set
            .resolve("engineering")
            .tasks
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, expected);
        assert!(e.tasks.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(e.github_username.as_deref(), Some("ada"));
        assert_eq!(e.role_key, "engineering");

        let ids: HashSet<&str> = e.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), e.tasks.len());
        assert!(e.tasks.iter().all(|t| t.id.len() == 8));
    }

    #[test]
    fn progress_is_derived_from_tasks() {
        let mut e = engineer();
        assert_eq!(e.progress_percent(), 0);

        let total = e.total_tasks();
        let first = e.tasks[0].id.clone();
        e.task_mut(&first).unwrap().start().unwrap();
        e.task_mut(&first).unwrap().succeed(None).unwrap();
        assert_eq!(e.completed_tasks(), 1);
        assert_eq!(
            e.progress_percent(),
            ((100.0 / total as f64).round()) as u8
        );

        for t in e.tasks.iter_mut().filter(|t| t.status == TaskStatus::Pending) {
            t.transition_to(TaskStatus::Completed).unwrap();
        }
        assert_eq!(e.progress_percent(), 100);
        assert!(e.is_complete());
        e.refresh_completion();
        assert!(e.completed_at.is_some());
    }

    #[test]
    fn empty_checklist_is_zero_percent() {
        let req = OnboardingRequest::new("Ada", "ada@example.com", "x", "y");
        let wf = ResolvedWorkflow {
            role_key: "general".into(),
            tasks: vec![],
            channels: vec![],
            docs: vec![],
            repos: vec![],
        };
        let e = Employee::new(&req, &wf);
        assert_eq!(e.progress_percent(), 0);
        assert!(!e.is_complete());
    }

    #[test]
    fn dependents_are_not_eligible_until_dependency_completes() {
        let mut e = engineer();
        let eligible = e.eligible_task_ids();
        let grant = e.tasks.iter().find(|t| t.name == "Grant repo access").unwrap().id.clone();
        let invite = e.tasks.iter().find(|t| t.name == "Invite to GitHub org").unwrap().id.clone();
        assert!(eligible.contains(&invite));
        assert!(!eligible.contains(&grant));

        let task = e.task_mut(&invite).unwrap();
        task.start().unwrap();
        task.fail("boom").unwrap();
        assert!(!e.eligible_task_ids().contains(&grant));

        e.task_mut(&invite).unwrap().transition_to(TaskStatus::Completed).unwrap();
        assert!(e.eligible_task_ids().contains(&grant));
    }

    #[test]
    fn last_error_only_while_failed() {
        let mut e = engineer();
        let id = e.tasks[0].id.clone();
        let task = e.task_mut(&id).unwrap();
        task.start().unwrap();
        task.fail("rate limited").unwrap();
        assert_eq!(task.last_error.as_deref(), Some("rate limited"));

        task.reset_for_retry().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert!(task.last_error.is_none());

        task.start().unwrap();
        task.fail("again").unwrap();
        task.transition_to(TaskStatus::Completed).unwrap();
        assert!(task.last_error.is_none());
    }

    #[test]
    fn retry_only_from_failed() {
        let mut e = engineer();
        let task = &mut e.tasks[0];
        assert!(matches!(
            task.reset_for_retry(),
            Err(OnboardingError::InvalidTransition { from: TaskStatus::Pending, .. })
        ));
    }

    #[test]
    fn status_view_flattens_employee() {
        let e = engineer();
        let total = e.total_tasks();
        let json = serde_json::to_value(EmployeeStatus::from(e)).unwrap();
        assert_eq!(json["name"], "Ada");
        assert_eq!(json["total_tasks"], total);
        assert_eq!(json["progress_percent"], 0);
        assert_eq!(json["tasks"][0]["status"], "pending");
    }
}
