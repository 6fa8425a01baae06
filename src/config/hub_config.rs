//! cardhub configuration file handling
//!
//! Loads ~/.config/cardhub/config.yaml (or any path given on the command line).
//! JSON config files are accepted too since YAML is a superset of JSON.

use crate::integrations::RetryConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server run mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Verbose, human-readable logs
    #[default]
    Debug,
    /// Compact logs
    Production,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub mode: RunMode,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            mode: RunMode::default(),
        }
    }
}

/// Mapping store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Table holding the card/issue mappings
    #[serde(default = "default_table", alias = "collection")]
    pub table: String,
}

fn default_store_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("cardhub");
    path.push("cardhub.db");
    path
}

fn default_table() -> String {
    "hub".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            table: default_table(),
        }
    }
}

/// Trello (board service) integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrelloIntegration {
    /// REST API base, e.g. "https://api.trello.com/1"
    #[serde(default = "default_trello_api")]
    pub api: String,

    /// API key
    #[serde(default)]
    pub key: String,

    /// API token; ignored when `token_env` resolves
    #[serde(default)]
    pub token: String,

    /// Environment variable holding the API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// List id that starts a sync cycle when a card lands in it
    #[serde(alias = "listInProgress")]
    pub list_in_progress: String,

    /// List id that cards are moved to once their issue closes
    #[serde(alias = "listTesting")]
    pub list_testing: String,
}

fn default_trello_api() -> String {
    "https://api.trello.com/1".to_string()
}

/// GitLab (tracker service) integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabIntegration {
    /// REST API base, e.g. "https://gitlab.com/api/v4"
    #[serde(default = "default_gitlab_api")]
    pub api: String,

    /// Private token sent as PRIVATE-TOKEN; ignored when `token_env` resolves
    #[serde(default)]
    pub token: String,

    /// Environment variable holding the private token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Numeric project id or "group/project" path
    #[serde(alias = "projectId")]
    pub project_id: String,
}

fn default_gitlab_api() -> String {
    "https://gitlab.com/api/v4".to_string()
}

/// Timeouts and retry budgets for the sync flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Per-request timeout for outbound calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound on how long a flow waits for its remote call, retries included
    #[serde(default = "default_handoff_timeout")]
    pub handoff_timeout_secs: u64,

    /// Retries for issue creation; POST is not idempotent so this defaults to 0
    #[serde(default)]
    pub create_issue_retries: u32,

    /// Retries for card moves
    #[serde(default = "default_move_card_retries")]
    pub move_card_retries: u32,
}

fn default_request_timeout() -> u64 {
    15
}

fn default_handoff_timeout() -> u64 {
    90
}

fn default_move_card_retries() -> u32 {
    3
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            handoff_timeout_secs: default_handoff_timeout(),
            create_issue_retries: 0,
            move_card_retries: default_move_card_retries(),
        }
    }
}

impl SyncSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_secs(self.handoff_timeout_secs)
    }

    /// Longest a remote call can take with `retries` retries: every attempt
    /// hitting the request timeout, plus the full backoff between them
    pub fn worst_case_call(&self, retries: u32) -> Duration {
        self.request_timeout() * (retries + 1)
            + RetryConfig::with_budget(retries).max_total_backoff()
    }
}

/// cardhub configuration
///
/// Loaded once at startup and handed to the adapters and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    pub trello: TrelloIntegration,

    pub gitlab: GitLabIntegration,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl HubConfig {
    /// Template configuration written by `cardhub init`
    pub fn template() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            trello: TrelloIntegration {
                api: default_trello_api(),
                key: String::new(),
                token: String::new(),
                token_env: Some("TRELLO_TOKEN".to_string()),
                list_in_progress: "<in-progress list id>".to_string(),
                list_testing: "<testing list id>".to_string(),
            },
            gitlab: GitLabIntegration {
                api: default_gitlab_api(),
                token: String::new(),
                token_env: Some("GITLAB_TOKEN".to_string()),
                project_id: "<project id>".to_string(),
            },
            sync: SyncSettings::default(),
        }
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::HubError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading cardhub configuration");

        let content = fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&content)?;
        config.resolve_tokens();

        tracing::debug!(
            port = config.server.port,
            store = %config.store.path.display(),
            project = %config.gitlab.project_id,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving cardhub configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/cardhub/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("cardhub");
        path.push("config.yaml");
        path
    }

    /// Replace tokens with the values of their `token_env` variables, when set
    fn resolve_tokens(&mut self) {
        if let Some(token) = read_token_env(self.trello.token_env.as_deref()) {
            self.trello.token = token;
        }
        if let Some(token) = read_token_env(self.gitlab.token_env.as_deref()) {
            self.gitlab.token = token;
        }
    }
}

fn read_token_env(var: Option<&str>) -> Option<String> {
    var.and_then(|name| std::env::var(name.trim_start_matches('$')).ok())
        .filter(|value| !value.is_empty())
}
