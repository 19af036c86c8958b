//! Integration backends and the dispatcher that routes tasks to them.
//!
//! Each category (`slack`, `github`, `gdrive`) has a live backend that
//! talks to the real service and a mock that answers instantly. The live
//! backend is picked at start-up when its credential is configured;
//! otherwise the mock is used. `general` tasks are bookkeeping and always
//! succeed.

pub mod gdrive;
pub mod general;
pub mod github;
pub mod slack;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::config::{EngineConfig, IntegrationsConfig};
use crate::error::IntegrationError;
use crate::onboarding::model::Employee;
use crate::workflow::{ResolvedWorkflow, TaskAction, TaskCategory};

/// Whether a backend reaches a real service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    Live,
    Mock,
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Everything a backend may need to know about the new hire.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub name: String,
    pub email: String,
    pub role: String,
    pub team: String,
    pub github_username: Option<String>,
    /// GitHub org overriding the configured one.
    pub github_org: Option<String>,
    /// Slack channels to join.
    pub channels: Vec<String>,
    /// Drive document keys to share.
    pub docs: Vec<String>,
    /// Repositories to grant.
    pub repos: Vec<String>,
}

impl DispatchContext {
    pub fn for_employee(employee: &Employee, workflow: &ResolvedWorkflow) -> Self {
        Self {
            name: employee.name.clone(),
            email: employee.email.clone(),
            role: employee.role.clone(),
            team: employee.team.clone(),
            github_username: employee.github_username.clone(),
            github_org: None,
            channels: workflow.channels.clone(),
            docs: workflow.docs.clone(),
            repos: workflow.repos.clone(),
        }
    }

    /// The GitHub username, or a non-retryable failure.
    pub fn require_github(&self) -> Result<&str, IntegrationError> {
        self.github_username
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| IntegrationError::MissingHandle {
                integration: "github".into(),
                handle: "GitHub username".into(),
            })
    }

    /// The GitHub username, or a stand-in derived from the email's local
    /// part. The flag is `true` when the stand-in was used.
    pub fn github_or_placeholder(&self) -> (String, bool) {
        match self.require_github() {
            Ok(username) => (username.to_string(), false),
            Err(_) => {
                let local = self.email.split('@').next().unwrap_or_default();
                let placeholder: String = local
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
                    .collect();
                let placeholder = placeholder.trim_matches('-');
                if placeholder.is_empty() {
                    ("new-hire".to_string(), true)
                } else {
                    (placeholder.to_string(), true)
                }
            }
        }
    }

    /// Org to act in: the per-call override, else `configured`.
    pub fn github_org_or<'a>(&'a self, configured: &'a str) -> &'a str {
        self.github_org
            .as_deref()
            .filter(|o| !o.trim().is_empty())
            .unwrap_or(configured)
    }
}

/// Successful outcome of one integration call.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutput {
    /// Short human-readable summary, stored on the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Service-specific result payload.
    pub data: serde_json::Value,
    pub mock: bool,
}

impl DispatchOutput {
    pub fn live(detail: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            detail: Some(detail.into()),
            data,
            mock: false,
        }
    }

    pub fn mock(detail: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            detail: Some(detail.into()),
            data,
            mock: true,
        }
    }
}

/// One integration backend.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Category this backend serves.
    fn category(&self) -> TaskCategory;

    fn mode(&self) -> BackendMode;

    /// Perform `action` for the employee described by `ctx`.
    ///
    /// `action` is `None` only for `general` tasks.
    async fn execute(
        &self,
        action: Option<TaskAction>,
        ctx: &DispatchContext,
    ) -> Result<DispatchOutput, IntegrationError>;
}

/// Error for an action routed to the wrong backend.
pub(crate) fn unsupported(integration: &str, action: Option<TaskAction>) -> IntegrationError {
    IntegrationError::InvalidParameters {
        integration: integration.to_string(),
        reason: match action {
            Some(action) => format!("does not support action {action}"),
            None => "requires an action".to_string(),
        },
    }
}

/// Map an HTTP response to success, a retryable failure (429/5xx), or a
/// non-retryable rejection (other 4xx).
pub(crate) async fn check_status(
    integration: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, IntegrationError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let reason: String = body.chars().take(300).collect();
    if status.as_u16() == 429 || status.is_server_error() {
        Err(IntegrationError::Api {
            integration: integration.to_string(),
            reason: format!("HTTP {status}: {reason}"),
        })
    } else {
        Err(IntegrationError::Rejected {
            integration: integration.to_string(),
            status: status.as_u16(),
            reason,
        })
    }
}

/// Routes each task to its category's backend, bounding in-flight calls
/// per category and the duration of every call.
pub struct Dispatcher {
    backends: HashMap<TaskCategory, Arc<dyn Integration>>,
    limits: HashMap<TaskCategory, Arc<Semaphore>>,
    timeout: Duration,
}

impl Dispatcher {
    /// All-mock dispatcher.
    pub fn new(config: &EngineConfig) -> Self {
        let backends: Vec<Arc<dyn Integration>> = vec![
            Arc::new(slack::MockSlack),
            Arc::new(github::MockGitHub::default()),
            Arc::new(gdrive::MockDrive),
            Arc::new(general::Bookkeeping),
        ];
        let limits = TaskCategory::ALL
            .iter()
            .map(|c| (*c, Arc::new(Semaphore::new(config.category_concurrency))))
            .collect();

        Self {
            backends: backends.into_iter().map(|b| (b.category(), b)).collect(),
            limits,
            timeout: config.dispatch_timeout,
        }
    }

    /// Live backends where credentials exist, mocks elsewhere.
    pub fn from_config(integrations: &IntegrationsConfig, config: &EngineConfig) -> Self {
        let client = reqwest::Client::new();
        let mut dispatcher = Self::new(config);

        if let Some(slack) = &integrations.slack {
            dispatcher = dispatcher.with_backend(Arc::new(slack::LiveSlack::new(
                client.clone(),
                slack.clone(),
            )));
        }
        if let Some(github) = &integrations.github {
            dispatcher = dispatcher.with_backend(Arc::new(github::LiveGitHub::new(
                client.clone(),
                github.clone(),
            )));
        }
        if let Some(drive) = &integrations.gdrive {
            dispatcher =
                dispatcher.with_backend(Arc::new(gdrive::LiveDrive::new(client, drive.clone())));
        }

        for (category, mode) in dispatcher.modes() {
            tracing::info!(category = %category, mode = %mode, "Integration backend selected");
        }
        dispatcher
    }

    /// Replace the backend for the integration's category.
    pub fn with_backend(mut self, backend: Arc<dyn Integration>) -> Self {
        self.backends.insert(backend.category(), backend);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Backend mode per category.
    pub fn modes(&self) -> BTreeMap<TaskCategory, BackendMode> {
        self.backends
            .iter()
            .map(|(category, backend)| (*category, backend.mode()))
            .collect()
    }

    /// Execute one action through its category's backend.
    pub async fn dispatch(
        &self,
        category: TaskCategory,
        action: Option<TaskAction>,
        ctx: &DispatchContext,
    ) -> Result<DispatchOutput, IntegrationError> {
        let backend = self
            .backends
            .get(&category)
            .cloned()
            .ok_or_else(|| IntegrationError::NoBackend {
                category: category.to_string(),
            })?;

        let _permit = match self.limits.get(&category) {
            Some(limit) => Some(limit.clone().acquire_owned().await.map_err(|_| {
                IntegrationError::RequestFailed {
                    integration: category.to_string(),
                    reason: "dispatcher is shutting down".into(),
                }
            })?),
            None => None,
        };

        tracing::debug!(category = %category, action = ?action, mode = %backend.mode(), "Dispatching");
        tokio::time::timeout(self.timeout, backend.execute(action, ctx))
            .await
            .map_err(|_| IntegrationError::Timeout {
                integration: category.to_string(),
                timeout: self.timeout,
            })?
    }
}
