//! GitHub backend: org invite, repository access, setup issue.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::config::{DEFAULT_GITHUB_ORG, GitHubConfig};
use crate::error::IntegrationError;
use crate::integrations::{
    BackendMode, DispatchContext, DispatchOutput, Integration, check_status, unsupported,
};
use crate::workflow::{TaskAction, TaskCategory};

const GITHUB_API: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const REPO_PERMISSION: &str = "push";
const ISSUE_LABELS: [&str; 2] = ["onboarding", "good first issue"];

pub fn setup_issue_title(username: &str) -> String {
    format!("Dev Environment Setup: {username}")
}

pub fn setup_issue_body(username: &str) -> String {
    format!(
        "## Welcome {username}!\n\n\
         This issue tracks your development environment setup.\n\n\
         ### Checklist\n\
         - [ ] Clone the repository\n\
         - [ ] Install dependencies\n\
         - [ ] Set up local environment variables (see `.env.example`)\n\
         - [ ] Run the test suite\n\
         - [ ] Make your first commit on a feature branch\n\
         - [ ] Open your first PR (can be a small README fix!)\n\n\
         ### Resources\n\
         - [Engineering Handbook](https://wiki.acme-corp.dev/handbook)\n\
         - [Git Workflow Guide](https://wiki.acme-corp.dev/git-workflow)\n\
         - [Code Review Guidelines](https://wiki.acme-corp.dev/code-review)\n\n\
         _This issue was auto-created by the Onboarding Agent_\n"
    )
}

/// Repository the setup issue is opened in.
fn setup_repo(ctx: &DispatchContext) -> Result<&str, IntegrationError> {
    ctx.repos
        .first()
        .map(String::as_str)
        .ok_or_else(|| IntegrationError::InvalidParameters {
            integration: "github".into(),
            reason: "no repository to open the setup issue in".into(),
        })
}

/// Answers every GitHub action without network access.
pub struct MockGitHub {
    org: String,
}

impl MockGitHub {
    pub fn new(org: impl Into<String>) -> Self {
        Self { org: org.into() }
    }
}

impl Default for MockGitHub {
    fn default() -> Self {
        Self::new(DEFAULT_GITHUB_ORG)
    }
}

#[async_trait]
impl Integration for MockGitHub {
    fn category(&self) -> TaskCategory {
        TaskCategory::Github
    }

    fn mode(&self) -> BackendMode {
        BackendMode::Mock
    }

    async fn execute(
        &self,
        action: Option<TaskAction>,
        ctx: &DispatchContext,
    ) -> Result<DispatchOutput, IntegrationError> {
        let org = ctx.github_org_or(&self.org);
        // Mock runs never stall on a missing handle.
        let (username, placeholder) = ctx.github_or_placeholder();
        let note = if placeholder {
            " (placeholder handle, no GitHub username on record)"
        } else {
            ""
        };
        match action {
            Some(TaskAction::GithubInviteToOrg) => {
                tracing::info!(%username, %org, placeholder, "[mock] Invited to GitHub org");
                Ok(DispatchOutput::mock(
                    format!("Invited {username} to {org}{note}"),
                    json!({
                        "org": org,
                        "username": username,
                        "state": "pending",
                        "placeholder": placeholder,
                    }),
                ))
            }
            Some(TaskAction::GithubGrantRepoAccess) => {
                let repos: Vec<Value> = ctx
                    .repos
                    .iter()
                    .map(|r| json!({ "repo": r, "permission": REPO_PERMISSION }))
                    .collect();
                tracing::info!(%username, repos = repos.len(), "[mock] Granted GitHub repo access");
                Ok(DispatchOutput::mock(
                    format!("Granted {REPO_PERMISSION} on {} repositories{note}", repos.len()),
                    json!({ "org": org, "repos": repos, "placeholder": placeholder }),
                ))
            }
            Some(TaskAction::GithubCreateSetupIssue) => {
                let repo = setup_repo(ctx)?;
                let url = format!("https://github.com/{org}/{repo}/issues/42");
                tracing::info!(%username, %repo, "[mock] Created setup issue");
                Ok(DispatchOutput::mock(
                    format!("Setup issue opened: {url}{note}"),
                    json!({
                        "issue_number": 42,
                        "title": setup_issue_title(&username),
                        "url": url,
                        "placeholder": placeholder,
                    }),
                ))
            }
            other => Err(unsupported("github", other)),
        }
    }
}

/// GitHub REST API backend.
pub struct LiveGitHub {
    client: reqwest::Client,
    config: GitHubConfig,
    base_url: String,
}

impl LiveGitHub {
    pub fn new(client: reqwest::Client, config: GitHubConfig) -> Self {
        Self {
            client,
            config,
            base_url: GITHUB_API.to_string(),
        }
    }

    /// Point the backend at another host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(self.config.token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", "onboard-agent")
    }

    async fn invite(&self, org: &str, username: &str) -> Result<DispatchOutput, IntegrationError> {
        let resp = self
            .request(reqwest::Method::PUT, &format!("/orgs/{org}/memberships/{username}"))
            .json(&json!({ "role": "member" }))
            .send()
            .await?;
        let data: Value = check_status("github", resp).await?.json().await?;
        let state = data.get("state").and_then(Value::as_str).unwrap_or("pending");
        tracing::info!(%username, %org, %state, "Invited to GitHub org");
        Ok(DispatchOutput::live(
            format!("Invited {username} to {org} ({state})"),
            json!({ "org": org, "username": username, "state": state }),
        ))
    }

    async fn grant(
        &self,
        org: &str,
        username: &str,
        repos: &[String],
    ) -> Result<DispatchOutput, IntegrationError> {
        for repo in repos {
            let resp = self
                .request(
                    reqwest::Method::PUT,
                    &format!("/repos/{org}/{repo}/collaborators/{username}"),
                )
                .json(&json!({ "permission": REPO_PERMISSION }))
                .send()
                .await?;
            check_status("github", resp).await?;
            tracing::info!(%username, %repo, "Granted GitHub repo access");
        }
        Ok(DispatchOutput::live(
            format!("Granted {REPO_PERMISSION} on {} repositories", repos.len()),
            json!({ "repos": repos, "permission": REPO_PERMISSION }),
        ))
    }

    async fn create_issue(
        &self,
        org: &str,
        username: &str,
        repo: &str,
    ) -> Result<DispatchOutput, IntegrationError> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/repos/{org}/{repo}/issues"))
            .json(&json!({
                "title": setup_issue_title(username),
                "body": setup_issue_body(username),
                "assignees": [username],
                "labels": ISSUE_LABELS,
            }))
            .send()
            .await?;
        let data: Value = check_status("github", resp).await?.json().await?;
        let url = data
            .get("html_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(DispatchOutput::live(
            format!("Setup issue opened: {url}"),
            json!({
                "issue_number": data.get("number"),
                "title": data.get("title"),
                "url": url,
            }),
        ))
    }
}

#[async_trait]
impl Integration for LiveGitHub {
    fn category(&self) -> TaskCategory {
        TaskCategory::Github
    }

    fn mode(&self) -> BackendMode {
        BackendMode::Live
    }

    async fn execute(
        &self,
        action: Option<TaskAction>,
        ctx: &DispatchContext,
    ) -> Result<DispatchOutput, IntegrationError> {
        let org = ctx.github_org_or(&self.config.org);
        match action {
            Some(TaskAction::GithubInviteToOrg) => self.invite(org, ctx.require_github()?).await,
            Some(TaskAction::GithubGrantRepoAccess) => {
                self.grant(org, ctx.require_github()?, &ctx.repos).await
            }
            Some(TaskAction::GithubCreateSetupIssue) => {
                let username = ctx.require_github()?;
                self.create_issue(org, username, setup_repo(ctx)?).await
            }
            other => Err(unsupported("github", other)),
        }
    }
}
