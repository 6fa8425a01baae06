//! Test doubles for the remote services

use crate::integrations::{CardBoard, IssueTracker};
use crate::{HubError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records titles and hands out sequential issue ids
#[derive(Default)]
pub(crate) struct FakeTracker {
    pub titles: Mutex<Vec<String>>,
    pub next_id: AtomicI64,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl FakeTracker {
    pub fn starting_at(id: i64) -> Self {
        Self {
            next_id: AtomicI64::new(id),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.titles.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn create_issue(&self, title: &str) -> Result<i64> {
        self.titles.lock().unwrap().push(title.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(HubError::Auth("GitLab rejected the private token".into()));
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// Records (card, list) moves
#[derive(Default)]
pub(crate) struct FakeBoard {
    pub moves: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl FakeBoard {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.moves.lock().unwrap().clone()
    }
}

#[async_trait]
impl CardBoard for FakeBoard {
    async fn move_card(&self, card_id: &str, list_id: &str) -> Result<String> {
        self.moves
            .lock()
            .unwrap()
            .push((card_id.to_string(), list_id.to_string()));
        if self.fail {
            return Err(HubError::Integration("Trello move card failed: HTTP 404".into()));
        }
        Ok(card_id.to_string())
    }
}
