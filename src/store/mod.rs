//! Mapping store
//!
//! Persists the association between a Trello card and the GitLab issue
//! created for it. A record is written only after the issue exists and is
//! closed only after the card has been moved.

mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use sqlite::MappingStore;

/// Lifecycle of a mapping: `Open` until the issue closes, then `Closed` for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    Open,
    Closed,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Open => "open",
            MappingStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown mapping status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for MappingStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(MappingStatus::Open),
            "closed" => Ok(MappingStatus::Closed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// One card ↔ issue association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    /// Trello card id
    pub card_id: String,

    /// GitLab issue id, as returned when the issue was created
    pub issue_id: i64,

    pub status: MappingStatus,

    /// How many times this card has entered the in-progress list, starting at 1
    pub cycle: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MappingRecord {
    /// New open mapping for a freshly created issue
    pub fn open(card_id: impl Into<String>, issue_id: i64, cycle: u32) -> Self {
        let now = Utc::now();
        Self {
            card_id: card_id.into(),
            issue_id,
            status: MappingStatus::Open,
            cycle,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == MappingStatus::Open
    }
}

/// What an insert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The card cycle or the issue already had a mapping; nothing written
    AlreadyMapped,
}
