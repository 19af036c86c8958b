//! Slack backend: welcome DM, channel membership, intro post.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::config::SlackConfig;
use crate::error::IntegrationError;
use crate::integrations::{BackendMode, DispatchContext, DispatchOutput, Integration, unsupported};
use crate::workflow::{TaskAction, TaskCategory};

const SLACK_API: &str = "https://slack.com/api";

/// Channel the intro message is posted in.
pub const INTRO_CHANNEL: &str = "#general";

/// Channel ids returned by the mock backend.
const MOCK_CHANNELS: &[(&str, &str)] = &[
    ("#general", "C000GENERAL"),
    ("#random", "C000RANDOM"),
    ("#engineering", "C000ENGINEER"),
    ("#design", "C000DESIGN"),
    ("#standup", "C000STANDUP"),
    ("#hr", "C000HR"),
    ("#announcements", "C000ANNOUNCE"),
    ("#onboarding", "C000ONBOARD"),
];

pub fn welcome_message(ctx: &DispatchContext) -> String {
    format!(
        "*Welcome to ACME Corp, {name}!*\n\n\
         We're thrilled to have you join the *{team}* team as a *{role}*!\n\n\
         Here are some things to get you started:\n\
         • Read the _Company Handbook_ in Google Drive (shared with you)\n\
         • Check out the team channels you've been added to\n\
         • Your onboarding buddy will reach out today\n\
         • Grab a virtual coffee with your manager this week\n\n\
         If you need anything at all, just ask me. I'm your friendly Onboarding Bot!\n\n\
         _Have an amazing first day!_",
        name = ctx.name,
        team = ctx.team,
        role = ctx.role,
    )
}

pub fn intro_message(ctx: &DispatchContext) -> String {
    format!(
        "*Everyone, please welcome {name}!*\n\n\
         {name} is joining the *{team}* team as a *{role}*.\n\n\
         Drop a wave to say hello!",
        name = ctx.name,
        team = ctx.team,
        role = ctx.role,
    )
}

fn mock_channel_id(channel: &str) -> String {
    MOCK_CHANNELS
        .iter()
        .find(|(name, _)| *name == channel)
        .map(|(_, id)| (*id).to_string())
        .unwrap_or_else(|| format!("C_MOCK_{}", channel.trim_start_matches('#')))
}

/// Answers every Slack action without network access.
pub struct MockSlack;

#[async_trait]
impl Integration for MockSlack {
    fn category(&self) -> TaskCategory {
        TaskCategory::Slack
    }

    fn mode(&self) -> BackendMode {
        BackendMode::Mock
    }

    async fn execute(
        &self,
        action: Option<TaskAction>,
        ctx: &DispatchContext,
    ) -> Result<DispatchOutput, IntegrationError> {
        match action {
            Some(TaskAction::SlackWelcomeDm) => {
                tracing::info!(email = %ctx.email, "[mock] Sent Slack welcome DM");
                Ok(DispatchOutput::mock(
                    format!("Welcome DM sent to {}", ctx.name),
                    json!({ "channel": "D_MOCK_DM" }),
                ))
            }
            Some(TaskAction::SlackJoinChannels) => {
                let joined: Vec<Value> = ctx
                    .channels
                    .iter()
                    .map(|c| json!({ "channel": c, "channel_id": mock_channel_id(c) }))
                    .collect();
                tracing::info!(email = %ctx.email, channels = joined.len(), "[mock] Added to Slack channels");
                Ok(DispatchOutput::mock(
                    format!("Added to {}", ctx.channels.join(", ")),
                    json!({ "channels": joined }),
                ))
            }
            Some(TaskAction::SlackPostIntro) => {
                tracing::info!(name = %ctx.name, "[mock] Posted Slack intro");
                Ok(DispatchOutput::mock(
                    format!("Intro posted in {INTRO_CHANNEL}"),
                    json!({ "channel": INTRO_CHANNEL }),
                ))
            }
            other => Err(unsupported("slack", other)),
        }
    }
}

/// Slack Web API backend.
pub struct LiveSlack {
    client: reqwest::Client,
    config: SlackConfig,
    base_url: String,
}

impl LiveSlack {
    pub fn new(client: reqwest::Client, config: SlackConfig) -> Self {
        Self {
            client,
            config,
            base_url: SLACK_API.to_string(),
        }
    }

    /// Point the backend at another host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Slack answers HTTP 200 with `{"ok": false, "error": ...}` on failure.
    fn check_ok(data: Value) -> Result<Value, IntegrationError> {
        if data.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(data);
        }
        let error = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        if matches!(error.as_str(), "ratelimited" | "internal_error" | "fatal_error") {
            Err(IntegrationError::Api {
                integration: "slack".into(),
                reason: error,
            })
        } else {
            Err(IntegrationError::Rejected {
                integration: "slack".into(),
                status: 200,
                reason: error,
            })
        }
    }

    async fn post(&self, method: &str, body: Value) -> Result<Value, IntegrationError> {
        let resp = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.config.bot_token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let resp = super::check_status("slack", resp).await?;
        Self::check_ok(resp.json().await?)
    }

    async fn lookup_user(&self, email: &str) -> Result<String, IntegrationError> {
        let resp = self
            .client
            .get(format!("{}/users.lookupByEmail", self.base_url))
            .bearer_auth(self.config.bot_token.expose_secret())
            .query(&[("email", email)])
            .send()
            .await?;
        let resp = super::check_status("slack", resp).await?;
        let data = Self::check_ok(resp.json().await?)?;
        data.pointer("/user/id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| IntegrationError::Api {
                integration: "slack".into(),
                reason: "users.lookupByEmail returned no user id".into(),
            })
    }

    async fn send_welcome(&self, ctx: &DispatchContext) -> Result<DispatchOutput, IntegrationError> {
        let user_id = self.lookup_user(&ctx.email).await?;
        let conv = self
            .post("conversations.open", json!({ "users": user_id }))
            .await?;
        let channel_id = conv
            .pointer("/channel/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.post(
            "chat.postMessage",
            json!({ "channel": channel_id, "text": welcome_message(ctx), "mrkdwn": true }),
        )
        .await?;

        Ok(DispatchOutput::live(
            format!("Welcome DM sent to {}", ctx.name),
            json!({ "channel": channel_id }),
        ))
    }

    async fn join_channels(&self, ctx: &DispatchContext) -> Result<DispatchOutput, IntegrationError> {
        let user_id = self.lookup_user(&ctx.email).await?;
        let mut joined = Vec::new();
        let mut failures = Vec::new();

        for channel in &ctx.channels {
            let name = channel.trim_start_matches('#');
            match self
                .post("conversations.invite", json!({ "channel": name, "users": user_id }))
                .await
            {
                Ok(_) => joined.push(channel.clone()),
                Err(IntegrationError::Rejected { reason, .. }) if reason == "already_in_channel" => {
                    joined.push(channel.clone())
                }
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "Slack channel invite failed");
                    failures.push(format!("{channel}: {e}"));
                }
            }
        }

        if !failures.is_empty() {
            return Err(IntegrationError::Api {
                integration: "slack".into(),
                reason: failures.join("; "),
            });
        }
        Ok(DispatchOutput::live(
            format!("Added to {}", joined.join(", ")),
            json!({ "channels": joined }),
        ))
    }

    async fn post_intro(&self, ctx: &DispatchContext) -> Result<DispatchOutput, IntegrationError> {
        let data = self
            .post(
                "chat.postMessage",
                json!({ "channel": INTRO_CHANNEL, "text": intro_message(ctx), "mrkdwn": true }),
            )
            .await?;
        Ok(DispatchOutput::live(
            format!("Intro posted in {INTRO_CHANNEL}"),
            json!({ "channel": INTRO_CHANNEL, "ts": data.get("ts") }),
        ))
    }
}

#[async_trait]
impl Integration for LiveSlack {
    fn category(&self) -> TaskCategory {
        TaskCategory::Slack
    }

    fn mode(&self) -> BackendMode {
        BackendMode::Live
    }

    async fn execute(
        &self,
        action: Option<TaskAction>,
        ctx: &DispatchContext,
    ) -> Result<DispatchOutput, IntegrationError> {
        match action {
            Some(TaskAction::SlackWelcomeDm) => self.send_welcome(ctx).await,
            Some(TaskAction::SlackJoinChannels) => self.join_channels(ctx).await,
            Some(TaskAction::SlackPostIntro) => self.post_intro(ctx).await,
            other => Err(unsupported("slack", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DispatchContext {
        DispatchContext {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role: "Software Engineer".into(),
            team: "Platform".into(),
            channels: vec!["#general".into(), "#standup".into(), "#new-team".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn mock_join_maps_known_channels() {
        let out = MockSlack
            .execute(Some(TaskAction::SlackJoinChannels), &ctx())
            .await
            .unwrap();
        assert!(out.mock);
        let ids: Vec<&str> = out.data["channels"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["channel_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["C000GENERAL", "C000STANDUP", "C_MOCK_new-team"]);
    }

    #[tokio::test]
    async fn mock_rejects_foreign_action() {
        let err = MockSlack
            .execute(Some(TaskAction::GdriveShareDocs), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidParameters { .. }));
    }

    #[test]
    fn messages_mention_the_hire() {
        let c = ctx();
        assert!(welcome_message(&c).contains("Welcome to ACME Corp, Ada!"));
        assert!(welcome_message(&c).contains("*Platform* team as a *Software Engineer*"));
        assert!(intro_message(&c).contains("please welcome Ada"));
    }

    #[test]
    fn slack_error_classification() {
        let err = LiveSlack::check_ok(json!({"ok": false, "error": "users_not_found"})).unwrap_err();
        assert!(!err.is_retryable());
        let err = LiveSlack::check_ok(json!({"ok": false, "error": "ratelimited"})).unwrap_err();
        assert!(err.is_retryable());
        assert!(LiveSlack::check_ok(json!({"ok": true})).is_ok());
    }
}
