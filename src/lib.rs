//! cardhub - Trello ↔ GitLab synchronization relay
//!
//! cardhub listens for Trello and GitLab webhooks. When a card lands in the
//! configured in-progress list it opens a GitLab issue named after the card;
//! when that issue is closed it moves the card to the testing list. The
//! card/issue pairs live in a small SQLite mapping store.
//!
//! # Architecture
//!
//! - **config**: YAML configuration and validation
//! - **events**: Webhook payload shapes and trigger matching
//! - **integrations**: Trello and GitLab adapters, retry policy
//! - **handoff**: One-shot producer/consumer sequencing with a deadline
//! - **store**: Card/issue mapping persistence (SQLite)
//! - **sync**: The two synchronization flows
//! - **server**: Webhook HTTP endpoints (axum)

// Core modules
pub mod config;
pub mod error;
pub mod events;
pub mod store;

// Flow plumbing
pub mod handoff;
pub mod integrations;
pub mod sync;

// Runtime
pub mod logging;
pub mod metrics;
pub mod server;

// Re-exports
pub use error::{HubError, Result};
