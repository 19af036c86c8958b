//! Error types for the onboarding engine.

use std::time::Duration;

use uuid::Uuid;

use crate::onboarding::state::TaskStatus;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Integration error: {0}")]
    Integration(#[from] IntegrationError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),
}

impl Error {
    /// Whether this error means an employee or task id was unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::EmployeeNotFound { .. } | StoreError::TaskNotFound { .. })
        )
    }
}

/// Configuration-related errors. All of these are fatal at start-up.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse workflow templates: {0}")]
    ParseError(String),

    #[error("Workflow templates must define a \"general\" template")]
    MissingGeneralTemplate,

    #[error("Template {template}: task #{index} has an empty name")]
    EmptyTaskName { template: String, index: usize },

    #[error("Template {template}: duplicate task name \"{task}\"")]
    DuplicateTask { template: String, task: String },

    #[error("Template {template}: task \"{task}\" depends on unknown task \"{depends_on}\"")]
    DanglingDependency {
        template: String,
        task: String,
        depends_on: String,
    },

    #[error("Template {template}: dependency cycle through {}", .cycle.join(" -> "))]
    DependencyCycle { template: String, cycle: Vec<String> },

    #[error("Template {template}: task \"{task}\" {reason}")]
    InvalidAction {
        template: String,
        task: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store-related errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Employee {id} not found")]
    EmployeeNotFound { id: Uuid },

    #[error("Task {task_id} not found for employee {employee_id}")]
    TaskNotFound { employee_id: Uuid, task_id: String },

    #[error("Employee {id} already exists")]
    Conflict { id: Uuid },

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of a single integration call.
///
/// These are recorded on the task that triggered them; they never abort
/// an onboarding run.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{integration} request failed: {reason}")]
    RequestFailed { integration: String, reason: String },

    #[error("{integration} API error: {reason}")]
    Api { integration: String, reason: String },

    #[error("{integration} rejected the request (HTTP {status}): {reason}")]
    Rejected {
        integration: String,
        status: u16,
        reason: String,
    },

    #[error("{integration} call timed out after {timeout:?}")]
    Timeout {
        integration: String,
        timeout: Duration,
    },

    #[error("{integration} requires a {handle} for this employee")]
    MissingHandle { integration: String, handle: String },

    #[error("Invalid parameters for {integration}: {reason}")]
    InvalidParameters { integration: String, reason: String },

    #[error("Unknown document key: {key}")]
    UnknownDocument { key: String },

    #[error("No backend registered for category {category}")]
    NoBackend { category: String },
}

impl IntegrationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::Api { .. } | Self::Timeout { .. }
        )
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(e: reqwest::Error) -> Self {
        let integration = e
            .url()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| "http".to_string());
        Self::RequestFailed {
            integration,
            reason: e.to_string(),
        }
    }
}

/// Onboarding request and task lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Invalid request: {field} {reason}")]
    InvalidRequest { field: String, reason: String },

    #[error("Task {task_id} is {from}, cannot transition to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
