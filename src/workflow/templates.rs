//! Template loading, validation and role resolution.
//!
//! The whole template set is validated once when it is loaded. Every role
//! is merged with the general template up front, so a broken dependency
//! graph is a start-up error and `resolve` can never fail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::error::ConfigError;

use super::model::{ResolvedWorkflow, RoleTemplate, TaskBlueprint, TaskCategory};

/// Template key every unknown role falls back to.
pub const GENERAL: &str = "general";

/// Templates bundled with the binary.
const BUILTIN_TEMPLATES: &str = include_str!("../../workflows/onboarding.json");

const ENGINEERING_KEYWORDS: &[&str] = &[
    "engineer",
    "developer",
    "sre",
    "devops",
    "backend",
    "frontend",
    "fullstack",
    "swe",
];

const DESIGN_KEYWORDS: &[&str] = &["design", "ux", "ui", "graphic", "illustrat"];

/// Validated, role-keyed checklist definitions.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    resolved: HashMap<String, ResolvedWorkflow>,
}

impl TemplateSet {
    /// Load the templates shipped in `workflows/onboarding.json`.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(BUILTIN_TEMPLATES)
    }

    /// Load templates from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let set = Self::from_json(&raw)?;
        tracing::info!(path = %path.display(), roles = set.resolved.len(), "Loaded workflow templates");
        Ok(set)
    }

    /// Parse and validate a template document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let templates: BTreeMap<String, RoleTemplate> =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::from_templates(templates)
    }

    /// Validate already-parsed templates.
    pub fn from_templates(templates: BTreeMap<String, RoleTemplate>) -> Result<Self, ConfigError> {
        let general = templates
            .get(GENERAL)
            .ok_or(ConfigError::MissingGeneralTemplate)?;

        let mut resolved = HashMap::new();
        for (key, template) in &templates {
            check_names(key, template)?;
            let workflow = if key == GENERAL {
                merge(GENERAL, general, None)
            } else {
                merge(key, general, Some(template))
            };
            validate(&workflow)?;
            resolved.insert(key.clone(), workflow);
        }

        Ok(Self { resolved })
    }

    /// Resolve a role or job title to its checklist. Never fails: anything
    /// unrecognized gets the general template.
    pub fn resolve(&self, role: &str) -> &ResolvedWorkflow {
        let key = self.normalize_role(role);
        match self.resolved.get(&key) {
            Some(workflow) => workflow,
            None => self.general(),
        }
    }

    /// Map a job title to a template key.
    pub fn normalize_role(&self, role: &str) -> String {
        let role_lower = role.trim().to_lowercase();
        if self.resolved.contains_key(&role_lower) {
            return role_lower;
        }

        let candidates = [("engineering", ENGINEERING_KEYWORDS), ("design", DESIGN_KEYWORDS)];
        for (key, keywords) in candidates {
            if self.resolved.contains_key(key) && keywords.iter().any(|kw| role_lower.contains(kw))
            {
                return key.to_string();
            }
        }

        tracing::info!(role = %role, "No template for role, falling back to general");
        GENERAL.to_string()
    }

    /// Template keys, sorted.
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.resolved.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    fn general(&self) -> &ResolvedWorkflow {
        // from_templates refuses a set without a general template
        &self.resolved[GENERAL]
    }
}

/// Reject empty and duplicate task names within one raw template.
fn check_names(key: &str, template: &RoleTemplate) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, task) in template.tasks.iter().enumerate() {
        if task.name.trim().is_empty() {
            return Err(ConfigError::EmptyTaskName {
                template: key.to_string(),
                index,
            });
        }
        if !seen.insert(task.name.as_str()) {
            return Err(ConfigError::DuplicateTask {
                template: key.to_string(),
                task: task.name.clone(),
            });
        }
    }
    Ok(())
}

/// General tasks first, then the role's own; first occurrence of a name wins.
fn merge(key: &str, general: &RoleTemplate, role: Option<&RoleTemplate>) -> ResolvedWorkflow {
    let Some(role) = role else {
        return ResolvedWorkflow {
            role_key: key.to_string(),
            tasks: general.tasks.clone(),
            channels: general.channels.clone(),
            docs: general.docs.clone(),
            repos: general.repos.clone(),
        };
    };

    let mut seen = HashSet::new();
    let tasks = general
        .tasks
        .iter()
        .chain(role.tasks.iter())
        .filter(|t| seen.insert(t.name.clone()))
        .cloned()
        .collect();

    ResolvedWorkflow {
        role_key: key.to_string(),
        tasks,
        channels: union(&general.channels, &role.channels),
        docs: union(&general.docs, &role.docs),
        repos: role.repos.clone(),
    }
}

fn union(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    a.iter()
        .chain(b.iter())
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}

fn validate(workflow: &ResolvedWorkflow) -> Result<(), ConfigError> {
    let template = &workflow.role_key;
    let names: HashSet<&str> = workflow.tasks.iter().map(|t| t.name.as_str()).collect();

    for task in &workflow.tasks {
        check_action(template, task)?;
        if let Some(dep) = &task.depends_on
            && !names.contains(dep.as_str())
        {
            return Err(ConfigError::DanglingDependency {
                template: template.clone(),
                task: task.name.clone(),
                depends_on: dep.clone(),
            });
        }
    }

    if let Some(cycle) = find_cycle(&workflow.tasks) {
        return Err(ConfigError::DependencyCycle {
            template: template.clone(),
            cycle,
        });
    }
    Ok(())
}

fn check_action(template: &str, task: &TaskBlueprint) -> Result<(), ConfigError> {
    let reason = match (task.category, task.action) {
        (TaskCategory::General, Some(action)) => {
            format!("is a general task but names integration action {action}")
        }
        (TaskCategory::General, None) => return Ok(()),
        (category, None) => format!("is a {category} task with no action"),
        (category, Some(action)) if action.category() != category => {
            format!("is a {category} task but action {action} belongs to {}", action.category())
        }
        _ => return Ok(()),
    };
    Err(ConfigError::InvalidAction {
        template: template.to_string(),
        task: task.name.clone(),
        reason,
    })
}

/// Depth-first search over `depends_on` edges. Returns the cycle path,
/// closed (first name repeated at the end), if there is one.
fn find_cycle(tasks: &[TaskBlueprint]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    let index: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.as_str(), i))
        .collect();
    let mut marks = vec![Mark::Unvisited; tasks.len()];

    for start in 0..tasks.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        let mut path: Vec<usize> = Vec::new();
        let mut current = Some(start);
        while let Some(i) = current {
            match marks[i] {
                Mark::Done => break,
                Mark::OnStack => {
                    let from = path.iter().position(|&p| p == i).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[from..].iter().map(|&p| tasks[p].name.clone()).collect();
                    cycle.push(tasks[i].name.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    marks[i] = Mark::OnStack;
                    path.push(i);
                    current = tasks[i]
                        .depends_on
                        .as_deref()
                        .and_then(|d| index.get(d).copied());
                }
            }
        }
        for p in path {
            marks[p] = Mark::Done;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::TaskAction;

    fn general_only(tasks: Vec<TaskBlueprint>) -> BTreeMap<String, RoleTemplate> {
        let mut templates = BTreeMap::new();
        templates.insert(
            GENERAL.to_string(),
            RoleTemplate {
                tasks,
                ..Default::default()
            },
        );
        templates
    }

    #[test]
    fn builtin_templates_are_valid() {
        let set = TemplateSet::builtin().unwrap();
        assert_eq!(set.roles(), vec!["design", "engineering", "general"]);
    }

    #[test]
    fn software_engineer_resolves_to_engineering() {
        let set = TemplateSet::builtin().unwrap();
        let wf = set.resolve("Software Engineer");
        assert_eq!(wf.role_key, "engineering");

        // general tasks come first, then the role's own
        assert_eq!(wf.tasks[0].name, "Send welcome DM");
        assert!(wf.tasks.iter().any(|t| t.name == "Grant repo access"));
        assert_eq!(wf.repos, vec!["platform-api", "web-app"]);
        assert!(wf.channels.contains(&"#general".to_string()));
        assert!(wf.channels.contains(&"#engineering".to_string()));
    }

    #[test]
    fn keyword_mapping() {
        let set = TemplateSet::builtin().unwrap();
        assert_eq!(set.normalize_role("Senior Backend Developer"), "engineering");
        assert_eq!(set.normalize_role("  DESIGN "), "design");
        assert_eq!(set.normalize_role("Product Designer"), "design");
        assert_eq!(set.normalize_role("UX Researcher"), "design");
        assert_eq!(set.normalize_role("Accountant"), "general");
    }

    #[test]
    fn unknown_role_falls_back_to_general() {
        let set = TemplateSet::builtin().unwrap();
        let wf = set.resolve("Astronaut");
        assert_eq!(wf.role_key, "general");
        let general = set.resolve("general");
        assert_eq!(wf.tasks, general.tasks);
    }

    #[test]
    fn merge_deduplicates_by_name() {
        let mut templates = general_only(vec![TaskBlueprint::new(
            "Laptop",
            "general laptop",
            TaskCategory::General,
        )]);
        templates.insert(
            "engineering".into(),
            RoleTemplate {
                channels: vec!["#eng".into()],
                tasks: vec![
                    TaskBlueprint::new("Laptop", "eng laptop", TaskCategory::General),
                    TaskBlueprint::new("Desk", "standing desk", TaskCategory::General),
                ],
                ..Default::default()
            },
        );
        let set = TemplateSet::from_templates(templates).unwrap();
        let wf = set.resolve("engineering");
        assert_eq!(wf.tasks.len(), 2);
        assert_eq!(wf.tasks[0].description, "general laptop");
        assert_eq!(wf.channels, vec!["#eng"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let templates = general_only(vec![
            TaskBlueprint::new("A", "a", TaskCategory::General).depends_on("B"),
            TaskBlueprint::new("B", "b", TaskCategory::General).depends_on("A"),
        ]);
        match TemplateSet::from_templates(templates) {
            Err(ConfigError::DependencyCycle { cycle, .. }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"A".to_string()));
                assert!(cycle.contains(&"B".to_string()));
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let templates = general_only(vec![
            TaskBlueprint::new("A", "a", TaskCategory::General).depends_on("A"),
        ]);
        assert!(matches!(
            TemplateSet::from_templates(templates),
            Err(ConfigError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn dangling_dependency_is_rejected() {
        let templates = general_only(vec![
            TaskBlueprint::new("A", "a", TaskCategory::General).depends_on("Nope"),
        ]);
        assert!(matches!(
            TemplateSet::from_templates(templates),
            Err(ConfigError::DanglingDependency { ref depends_on, .. }) if depends_on == "Nope"
        ));
    }

    #[test]
    fn role_may_depend_on_general_task() {
        let mut templates = general_only(vec![
            TaskBlueprint::new("Invite", "invite", TaskCategory::Github)
                .with_action(TaskAction::GithubInviteToOrg),
        ]);
        templates.insert(
            "engineering".into(),
            RoleTemplate {
                tasks: vec![
                    TaskBlueprint::new("Repos", "repos", TaskCategory::Github)
                        .with_action(TaskAction::GithubGrantRepoAccess)
                        .depends_on("Invite"),
                ],
                ..Default::default()
            },
        );
        assert!(TemplateSet::from_templates(templates).is_ok());
    }

    #[test]
    fn missing_general_is_rejected() {
        let templates = BTreeMap::new();
        assert!(matches!(
            TemplateSet::from_templates(templates),
            Err(ConfigError::MissingGeneralTemplate)
        ));
    }

    #[test]
    fn mismatched_action_is_rejected() {
        let templates = general_only(vec![
            TaskBlueprint::new("DM", "dm", TaskCategory::Github)
                .with_action(TaskAction::SlackWelcomeDm),
        ]);
        assert!(matches!(
            TemplateSet::from_templates(templates),
            Err(ConfigError::InvalidAction { .. })
        ));

        let templates = general_only(vec![TaskBlueprint::new("DM", "dm", TaskCategory::Slack)]);
        assert!(matches!(
            TemplateSet::from_templates(templates),
            Err(ConfigError::InvalidAction { .. })
        ));
    }

    #[test]
    fn duplicate_and_empty_names_are_rejected() {
        let templates = general_only(vec![
            TaskBlueprint::new("A", "a", TaskCategory::General),
            TaskBlueprint::new("A", "again", TaskCategory::General),
        ]);
        assert!(matches!(
            TemplateSet::from_templates(templates),
            Err(ConfigError::DuplicateTask { .. })
        ));

        let templates = general_only(vec![TaskBlueprint::new(" ", "blank", TaskCategory::General)]);
        assert!(matches!(
            TemplateSet::from_templates(templates),
            Err(ConfigError::EmptyTaskName { index: 0, .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let raw = r#"{"general": {"tasks": [{"name": "x", "category": "general"}]}}"#;
        assert!(matches!(
            TemplateSet::from_json(raw),
            Err(ConfigError::ParseError(_))
        ));

        let raw = r#"{"general": {"tasks": [], "owner": "hr"}}"#;
        assert!(matches!(
            TemplateSet::from_json(raw),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflows.json");
        std::fs::write(
            &path,
            r#"{"general": {"tasks": [{"name": "Badge", "description": "Print a badge", "category": "general"}]}}"#,
        )
        .unwrap();
        let set = TemplateSet::load(&path).unwrap();
        assert_eq!(set.resolve("anything").tasks[0].name, "Badge");

        assert!(matches!(
            TemplateSet::load(&dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
