//! Workflow template data model.

use serde::{Deserialize, Serialize};

/// Which integration a task runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Slack,
    Github,
    Gdrive,
    /// Bookkeeping with no external effect.
    General,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 4] = [Self::Slack, Self::Github, Self::Gdrive, Self::General];
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Slack => "slack",
            Self::Github => "github",
            Self::Gdrive => "gdrive",
            Self::General => "general",
        };
        write!(f, "{s}")
    }
}

/// The concrete integration operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    SlackWelcomeDm,
    SlackJoinChannels,
    SlackPostIntro,
    GithubInviteToOrg,
    GithubGrantRepoAccess,
    GithubCreateSetupIssue,
    GdriveShareDocs,
    GdriveCreatePersonalFolder,
}

impl TaskAction {
    /// The category whose backend executes this action.
    pub fn category(&self) -> TaskCategory {
        match self {
            Self::SlackWelcomeDm | Self::SlackJoinChannels | Self::SlackPostIntro => {
                TaskCategory::Slack
            }
            Self::GithubInviteToOrg | Self::GithubGrantRepoAccess | Self::GithubCreateSetupIssue => {
                TaskCategory::Github
            }
            Self::GdriveShareDocs | Self::GdriveCreatePersonalFolder => TaskCategory::Gdrive,
        }
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SlackWelcomeDm => "slack_welcome_dm",
            Self::SlackJoinChannels => "slack_join_channels",
            Self::SlackPostIntro => "slack_post_intro",
            Self::GithubInviteToOrg => "github_invite_to_org",
            Self::GithubGrantRepoAccess => "github_grant_repo_access",
            Self::GithubCreateSetupIssue => "github_create_setup_issue",
            Self::GdriveShareDocs => "gdrive_share_docs",
            Self::GdriveCreatePersonalFolder => "gdrive_create_personal_folder",
        };
        write!(f, "{s}")
    }
}

/// A not-yet-instantiated checklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskBlueprint {
    pub name: String,
    pub description: String,
    pub category: TaskCategory,
    /// Required for every category except `general`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<TaskAction>,
    /// Name of a task in the same resolved checklist that must complete first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// Only a person can complete this task.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manual: bool,
}

impl TaskBlueprint {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: TaskCategory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            action: None,
            depends_on: None,
            manual: false,
        }
    }

    /// Builder: set the integration action.
    pub fn with_action(mut self, action: TaskAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Builder: depend on another task by name.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on = Some(name.into());
        self
    }

    /// Builder: require a person to complete this task.
    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }
}

/// One role's entry in the template file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleTemplate {
    /// Slack channels the new hire joins.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Drive document keys shared with the new hire.
    #[serde(default)]
    pub docs: Vec<String>,
    /// Repositories the new hire gets access to.
    #[serde(default)]
    pub repos: Vec<String>,
    pub tasks: Vec<TaskBlueprint>,
}

/// A role's checklist after merging with the general template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedWorkflow {
    /// Template key the role resolved to.
    pub role_key: String,
    pub tasks: Vec<TaskBlueprint>,
    pub channels: Vec<String>,
    pub docs: Vec<String>,
    pub repos: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_categories() {
        assert_eq!(TaskAction::SlackPostIntro.category(), TaskCategory::Slack);
        assert_eq!(TaskAction::GithubCreateSetupIssue.category(), TaskCategory::Github);
        assert_eq!(TaskAction::GdriveShareDocs.category(), TaskCategory::Gdrive);
    }

    #[test]
    fn blueprint_serde_defaults() {
        let bp: TaskBlueprint = serde_json::from_str(
            r#"{"name": "Laptop", "description": "Order a laptop", "category": "general"}"#,
        )
        .unwrap();
        assert_eq!(bp.category, TaskCategory::General);
        assert!(bp.action.is_none());
        assert!(bp.depends_on.is_none());
        assert!(!bp.manual);

        // manual=false and absent options are omitted on output
        let json = serde_json::to_value(&bp).unwrap();
        assert!(json.get("manual").is_none());
        assert!(json.get("action").is_none());
    }

    #[test]
    fn unknown_category_rejected() {
        let err = serde_json::from_str::<TaskBlueprint>(
            r#"{"name": "x", "description": "y", "category": "jira"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn action_display_matches_serde() {
        let action = TaskAction::GithubGrantRepoAccess;
        assert_eq!(
            serde_json::to_string(&action).unwrap(),
            format!("\"{action}\"")
        );
    }
}
