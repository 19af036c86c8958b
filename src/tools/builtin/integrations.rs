//! Direct integration tools. These call the dispatcher for ad-hoc actions
//! and never touch employee records.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::IntegrationError;
use crate::integrations::gdrive;
use crate::integrations::{DispatchContext, DispatchOutput, Dispatcher};
use crate::tools::tool::{
    Tool, ToolError, ToolOutput, optional_str, optional_str_list, require_str,
};
use crate::workflow::TaskAction;

/// One entry of a per-step report. A failed step does not stop later ones.
fn step(name: &str, outcome: Result<DispatchOutput, IntegrationError>) -> Value {
    match outcome {
        Ok(out) => json!({
            "step": name,
            "success": true,
            "mock": out.mock,
            "detail": out.detail,
            "data": out.data,
        }),
        Err(e) => json!({
            "step": name,
            "success": false,
            "retryable": e.is_retryable(),
            "error": e.to_string(),
        }),
    }
}

async fn run(dispatcher: &Dispatcher, action: TaskAction, ctx: &DispatchContext) -> Value {
    step(
        &action.to_string(),
        dispatcher.dispatch(action.category(), Some(action), ctx).await,
    )
}

pub struct SlackSendWelcomeTool {
    dispatcher: Arc<Dispatcher>,
}

impl SlackSendWelcomeTool {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Tool for SlackSendWelcomeTool {
    fn name(&self) -> &str {
        "slack_send_welcome"
    }

    fn description(&self) -> &str {
        "Send a Slack welcome DM, optionally add the person to channels, and post \
         an intro in #general. Reports the outcome of each step."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "email": { "type": "string" },
                "name": { "type": "string" },
                "role": { "type": "string" },
                "team": { "type": "string" },
                "channels": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Channels to join, e.g. [\"#engineering\", \"#standup\"]"
                }
            },
            "required": ["email", "name", "role", "team"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let ctx = DispatchContext {
            email: require_str(&params, "email")?.to_string(),
            name: require_str(&params, "name")?.to_string(),
            role: require_str(&params, "role")?.to_string(),
            team: require_str(&params, "team")?.to_string(),
            channels: optional_str_list(&params, "channels")?.unwrap_or_default(),
            ..Default::default()
        };

        let mut steps = vec![run(&self.dispatcher, TaskAction::SlackWelcomeDm, &ctx).await];
        if !ctx.channels.is_empty() {
            steps.push(run(&self.dispatcher, TaskAction::SlackJoinChannels, &ctx).await);
        }
        steps.push(run(&self.dispatcher, TaskAction::SlackPostIntro, &ctx).await);

        Ok(ToolOutput::success(json!({ "steps": steps }), start.elapsed()))
    }
}

pub struct GithubInviteTool {
    dispatcher: Arc<Dispatcher>,
}

impl GithubInviteTool {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Tool for GithubInviteTool {
    fn name(&self) -> &str {
        "github_invite_to_org"
    }

    fn description(&self) -> &str {
        "Invite a user to the GitHub organization. With repos, also grant push \
         access and open a setup issue in the first repository."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "username": { "type": "string", "description": "GitHub username" },
                "org": { "type": "string", "description": "Organization, defaults to the configured one" },
                "repos": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Repository names in the organization"
                }
            },
            "required": ["username"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let username = require_str(&params, "username")?.trim_start_matches('@').to_string();
        let ctx = DispatchContext {
            github_username: Some(username.clone()),
            github_org: optional_str(&params, "org").map(String::from),
            repos: optional_str_list(&params, "repos")?.unwrap_or_default(),
            ..Default::default()
        };

        let mut steps = vec![run(&self.dispatcher, TaskAction::GithubInviteToOrg, &ctx).await];
        if !ctx.repos.is_empty() {
            steps.push(run(&self.dispatcher, TaskAction::GithubGrantRepoAccess, &ctx).await);
            steps.push(run(&self.dispatcher, TaskAction::GithubCreateSetupIssue, &ctx).await);
        }

        Ok(ToolOutput::success(
            json!({ "username": username, "steps": steps }),
            start.elapsed(),
        ))
    }
}

pub struct GdriveShareDocsTool {
    dispatcher: Arc<Dispatcher>,
}

impl GdriveShareDocsTool {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Tool for GdriveShareDocsTool {
    fn name(&self) -> &str {
        "gdrive_share_docs"
    }

    fn description(&self) -> &str {
        "Share Google Drive documents with a new hire. Call without doc_keys to \
         list the available documents. With name and team, also create a personal \
         onboarding folder."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "email": { "type": "string" },
                "doc_keys": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Document keys, e.g. [\"company-handbook\"]"
                },
                "name": { "type": "string" },
                "team": { "type": "string" }
            },
            "required": ["email"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let email = require_str(&params, "email")?;
        let docs = optional_str_list(&params, "doc_keys")?.unwrap_or_default();
        if docs.is_empty() {
            return Ok(ToolOutput::success(
                json!({
                    "available_docs": gdrive::catalog(),
                    "message": "Pass doc_keys to share specific documents.",
                }),
                start.elapsed(),
            ));
        }

        let name = optional_str(&params, "name");
        let team = optional_str(&params, "team");
        let ctx = DispatchContext {
            email: email.to_string(),
            name: name.unwrap_or_default().to_string(),
            team: team.unwrap_or_default().to_string(),
            docs,
            ..Default::default()
        };

        let mut steps = vec![run(&self.dispatcher, TaskAction::GdriveShareDocs, &ctx).await];
        if name.is_some() && team.is_some() {
            steps.push(run(&self.dispatcher, TaskAction::GdriveCreatePersonalFolder, &ctx).await);
        }

        Ok(ToolOutput::success(json!({ "steps": steps }), start.elapsed()))
    }
}
