//! Configuration types.
//!
//! Everything is read from the environment. Integration credentials are
//! optional: a missing credential selects the mock backend for that
//! category.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Dispatch attempts per task before it settles on `failed`.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_backoff: Duration,
    /// Upper bound on a single integration call.
    pub dispatch_timeout: Duration,
    /// Tasks of one employee that may be in flight at once.
    pub max_parallel_tasks: usize,
    /// In-flight calls allowed against any one integration category.
    pub category_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            dispatch_timeout: Duration::from_secs(5),
            max_parallel_tasks: 3,
            category_concurrency: 4,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_attempts: env_parse("ONBOARD_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            base_backoff: env_parse("ONBOARD_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_backoff),
            dispatch_timeout: env_parse("ONBOARD_DISPATCH_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.dispatch_timeout),
            max_parallel_tasks: env_parse("ONBOARD_MAX_PARALLEL_TASKS")?
                .unwrap_or(defaults.max_parallel_tasks),
            category_concurrency: env_parse("ONBOARD_CATEGORY_CONCURRENCY")?
                .unwrap_or(defaults.category_concurrency),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARD_MAX_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.max_parallel_tasks == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARD_MAX_PARALLEL_TASKS".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.category_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARD_CATEGORY_CONCURRENCY".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Slack bot credentials.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: SecretString,
}

impl SlackConfig {
    pub fn from_env() -> Option<Self> {
        let bot_token = env_secret("SLACK_BOT_TOKEN")?;
        Some(Self { bot_token })
    }
}

/// GitHub organization credentials.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: SecretString,
    pub org: String,
}

/// Organization used when `GITHUB_ORG` is unset.
pub const DEFAULT_GITHUB_ORG: &str = "acme-corp";

impl GitHubConfig {
    pub fn from_env() -> Option<Self> {
        let token = env_secret("GITHUB_TOKEN")?;
        let org = std::env::var("GITHUB_ORG").unwrap_or_else(|_| DEFAULT_GITHUB_ORG.to_string());
        Some(Self { token, org })
    }
}

/// Google Drive credentials (an OAuth access token).
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub access_token: SecretString,
}

impl DriveConfig {
    pub fn from_env() -> Option<Self> {
        let access_token = env_secret("GDRIVE_ACCESS_TOKEN")?;
        Some(Self { access_token })
    }
}

/// Credentials for every live integration. `None` means mock.
#[derive(Debug, Clone, Default)]
pub struct IntegrationsConfig {
    pub slack: Option<SlackConfig>,
    pub github: Option<GitHubConfig>,
    pub gdrive: Option<DriveConfig>,
}

impl IntegrationsConfig {
    pub fn from_env() -> Self {
        Self {
            slack: SlackConfig::from_env(),
            github: GitHubConfig::from_env(),
            gdrive: DriveConfig::from_env(),
        }
    }
}

/// Process-level settings for the binary.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Workflow template file; the bundled templates are used when unset.
    pub workflows_path: Option<PathBuf>,
    /// JSON file for durable state; in-memory only when unset.
    pub data_path: Option<PathBuf>,
    pub http_port: u16,
    /// Directory for a daily-rolling log file, in addition to stderr.
    pub log_dir: Option<PathBuf>,
    pub engine: EngineConfig,
    pub integrations: IntegrationsConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            workflows_path: env_path("ONBOARD_WORKFLOWS_PATH"),
            data_path: env_path("ONBOARD_DATA_PATH"),
            http_port: env_parse("ONBOARD_HTTP_PORT")?.unwrap_or(8080),
            log_dir: env_path("ONBOARD_LOG_DIR"),
            engine: EngineConfig::from_env()?,
            integrations: IntegrationsConfig::from_env(),
        })
    }
}

/// Read and parse an optional environment variable. Unset or blank is `None`;
/// a value that does not parse is an error.
fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn env_secret(key: &str) -> Option<SecretString> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from)
}
