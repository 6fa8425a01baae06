//! External Integrations
//!
//! Outbound clients for the two services the relay bridges.
//!
//! # Built-in Integrations
//!
//! - **GitLab**: creates an issue when a card enters the in-progress list
//! - **Trello**: moves the card to the testing list when its issue closes
//!
//! The sync flows only see the [`IssueTracker`] and [`CardBoard`] traits, so
//! other providers (or test doubles) can stand in for either side.

pub mod gitlab;
pub mod retry;
pub mod trello;

use crate::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};

pub use gitlab::{GitLabAdapter, GitLabIssue};
pub use retry::{with_retry, RetryConfig, RetryDecision, RetryableError};
pub use trello::{TrelloAdapter, TrelloCard};

/// Tracker side: where issues get created
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Create an issue with the given title and return its id
    async fn create_issue(&self, title: &str) -> Result<i64>;
}

/// Board side: where cards get moved
#[async_trait]
pub trait CardBoard: Send + Sync {
    /// Move a card to a list and return the card id the board echoed back
    async fn move_card(&self, card_id: &str, list_id: &str) -> Result<String>;
}

/// Seconds to wait after a 429, from Retry-After when it is a plain number
pub(crate) fn rate_limit_delay(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(60)
}
