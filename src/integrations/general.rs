//! Backend for `general` tasks, which have no external effect.

use async_trait::async_trait;

use crate::error::IntegrationError;
use crate::integrations::{BackendMode, DispatchContext, DispatchOutput, Integration, unsupported};
use crate::workflow::{TaskAction, TaskCategory};

/// Records the task as done without calling anything.
pub struct Bookkeeping;

#[async_trait]
impl Integration for Bookkeeping {
    fn category(&self) -> TaskCategory {
        TaskCategory::General
    }

    fn mode(&self) -> BackendMode {
        BackendMode::Mock
    }

    async fn execute(
        &self,
        action: Option<TaskAction>,
        _ctx: &DispatchContext,
    ) -> Result<DispatchOutput, IntegrationError> {
        if action.is_some() {
            return Err(unsupported("general", action));
        }
        Ok(DispatchOutput {
            detail: None,
            data: serde_json::Value::Null,
            mock: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bookkeeping_always_succeeds() {
        let out = Bookkeeping
            .execute(None, &DispatchContext::default())
            .await
            .unwrap();
        assert!(out.detail.is_none());
    }

    #[tokio::test]
    async fn bookkeeping_rejects_actions() {
        assert!(
            Bookkeeping
                .execute(Some(TaskAction::SlackPostIntro), &DispatchContext::default())
                .await
                .is_err()
        );
    }
}
