//! Configuration validation
//!
//! Validates cardhub configuration for correctness:
//! - API bases are http(s) URLs
//! - Credentials and list ids are present
//! - The store table name is a plain SQL identifier
//! - Timeouts are non-zero and the hand-off deadline covers every retry

use super::hub_config::HubConfig;
use crate::HubError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a cardhub configuration
pub fn validate_config(config: &HubConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ValidationError::new(
            "server.port",
            "Port must be greater than 0",
        ));
    }

    if !is_valid_table_name(&config.store.table) {
        errors.push(ValidationError::new(
            "store.table",
            format!(
                "Invalid table name '{}'. Use letters, digits and underscores only",
                config.store.table
            ),
        ));
    }

    // Trello
    if !is_http_url(&config.trello.api) {
        errors.push(ValidationError::new(
            "trello.api",
            format!("Invalid Trello API URL: {}", config.trello.api),
        ));
    }
    if config.trello.key.is_empty() {
        errors.push(ValidationError::new("trello.key", "Trello API key cannot be empty"));
    }
    if config.trello.token.is_empty() {
        errors.push(ValidationError::new(
            "trello.token",
            "Trello token is empty (set it inline or via token_env)",
        ));
    }
    if config.trello.list_in_progress.is_empty() {
        errors.push(ValidationError::new(
            "trello.list_in_progress",
            "In-progress list id cannot be empty",
        ));
    }
    if config.trello.list_testing.is_empty() {
        errors.push(ValidationError::new(
            "trello.list_testing",
            "Testing list id cannot be empty",
        ));
    }
    if !config.trello.list_in_progress.is_empty()
        && config.trello.list_in_progress == config.trello.list_testing
    {
        errors.push(ValidationError::new(
            "trello.list_testing",
            "Testing list must differ from the in-progress list",
        ));
    }

    // GitLab
    if !is_http_url(&config.gitlab.api) {
        errors.push(ValidationError::new(
            "gitlab.api",
            format!("Invalid GitLab API URL: {}", config.gitlab.api),
        ));
    }
    if config.gitlab.token.is_empty() {
        errors.push(ValidationError::new(
            "gitlab.token",
            "GitLab token is empty (set it inline or via token_env)",
        ));
    }
    if config.gitlab.project_id.is_empty() {
        errors.push(ValidationError::new(
            "gitlab.project_id",
            "GitLab project id cannot be empty",
        ));
    }

    // Sync
    if config.sync.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "sync.request_timeout_secs",
            "Request timeout must be greater than 0",
        ));
    }
    // The hand-off deadline covers every attempt of a call and the backoff between them
    let handoff = config.sync.handoff_timeout();
    for (operation, retries) in [
        ("create issue", config.sync.create_issue_retries),
        ("move card", config.sync.move_card_retries),
    ] {
        let worst_case = config.sync.worst_case_call(retries);
        if worst_case > handoff {
            errors.push(ValidationError::new(
                "sync.handoff_timeout_secs",
                format!(
                    "Hand-off timeout of {}s is shorter than {} with {} retries can take ({:.1}s)",
                    handoff.as_secs(),
                    operation,
                    retries,
                    worst_case.as_secs_f64()
                ),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

/// The table name is spliced into SQL, so only plain identifiers pass
pub(crate) fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &HubConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        HubError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
