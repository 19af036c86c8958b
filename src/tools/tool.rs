//! The `Tool` trait and its parameter helpers.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, OnboardingError, StoreError};

/// Errors a tool can report back to its caller.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<Error> for ToolError {
    fn from(e: Error) -> Self {
        match &e {
            Error::Onboarding(OnboardingError::InvalidRequest { .. }) => {
                Self::InvalidParameters(e.to_string())
            }
            Error::Onboarding(OnboardingError::InvalidTransition { .. })
            | Error::Store(StoreError::Conflict { .. }) => Self::Conflict(e.to_string()),
            _ if e.is_not_found() => Self::NotFound(e.to_string()),
            _ => Self::ExecutionFailed(e.to_string()),
        }
    }
}

/// What a tool produced.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub result: serde_json::Value,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self { result, duration }
    }
}

/// Name, description and JSON Schema of a tool, as listed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for `params`.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError>;
}

/// A required, non-empty string parameter.
pub fn require_str<'a>(params: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing required parameter: {name}")))
}

/// An optional string parameter. Blank strings count as absent.
pub fn optional_str<'a>(params: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// An optional list of strings. Errors if present with the wrong shape.
pub fn optional_str_list(
    params: &serde_json::Value,
    name: &str,
) -> Result<Option<Vec<String>>, ToolError> {
    match params.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(String::from).ok_or_else(|| {
                    ToolError::InvalidParameters(format!("{name} must be a list of strings"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(ToolError::InvalidParameters(format!(
            "{name} must be a list of strings"
        ))),
    }
}
