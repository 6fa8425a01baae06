//! Sync orchestrator
//!
//! Runs the two flows. Each qualifying webhook becomes one supervised task;
//! inside it the remote call is handed off to a producer task and the store
//! write only happens once the producer has delivered a successful result.

use super::claims::InFlight;
use crate::config::HubConfig;
use crate::events::{BoardEvent, CardMoved, TrackerEvent};
use crate::handoff::hand_off;
use crate::integrations::{
    with_retry, CardBoard, GitLabAdapter, IssueTracker, RetryConfig, TrelloAdapter,
};
use crate::metrics;
use crate::store::{InsertOutcome, MappingRecord, MappingStore};
use crate::{HubError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Flow settings taken from the configuration at startup
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// List whose arrivals open a sync cycle
    pub in_progress_list: String,

    /// List cards are moved to when their issue closes
    pub testing_list: String,

    /// How long a flow waits for its remote call, retries included
    pub handoff_timeout: Duration,

    pub create_issue_retry: RetryConfig,

    pub move_card_retry: RetryConfig,
}

impl FlowConfig {
    pub fn from_config(config: &HubConfig) -> Self {
        Self {
            in_progress_list: config.trello.list_in_progress.clone(),
            testing_list: config.trello.list_testing.clone(),
            handoff_timeout: config.sync.handoff_timeout(),
            create_issue_retry: RetryConfig::with_budget(config.sync.create_issue_retries),
            move_card_retry: RetryConfig::with_budget(config.sync.move_card_retries),
        }
    }
}

/// How a flow ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Issue created and the open mapping stored
    IssueCreated {
        card_id: String,
        issue_id: i64,
        cycle: u32,
    },
    /// Card moved to the testing list and the mapping closed
    CardMoved { card_id: String, issue_id: i64 },
    /// The card already has an open mapping; no second issue is created
    AlreadyMapped { card_id: String, issue_id: i64 },
    /// The mapping for this issue is closed already; the card is not moved again
    AlreadyClosed { issue_id: i64 },
    /// The issue was not created by this relay
    Unmapped { issue_id: i64 },
    /// The same card or issue is being handled by another flow right now
    Duplicate { key: String },
}

impl FlowOutcome {
    /// Label used in metrics
    pub fn label(&self) -> &'static str {
        match self {
            FlowOutcome::IssueCreated { .. } => "issue_created",
            FlowOutcome::CardMoved { .. } => "card_moved",
            FlowOutcome::AlreadyMapped { .. } => "already_mapped",
            FlowOutcome::AlreadyClosed { .. } => "already_closed",
            FlowOutcome::Unmapped { .. } => "unmapped",
            FlowOutcome::Duplicate { .. } => "duplicate",
        }
    }
}

const CARD_MOVED_FLOW: &str = "card_moved";
const ISSUE_CLOSED_FLOW: &str = "issue_closed";

/// Headroom on top of the hand-off timeout for the store write after it
const SHUTDOWN_SLACK: Duration = Duration::from_secs(5);

/// Drives Trello → GitLab and GitLab → Trello synchronisation
#[derive(Clone)]
pub struct SyncOrchestrator {
    tracker: Arc<dyn IssueTracker>,
    board: Arc<dyn CardBoard>,
    store: Arc<MappingStore>,
    config: Arc<FlowConfig>,
    in_flight: Arc<InFlight>,
    flows: TaskTracker,
}

impl SyncOrchestrator {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        board: Arc<dyn CardBoard>,
        store: Arc<MappingStore>,
        config: FlowConfig,
    ) -> Self {
        Self {
            tracker,
            board,
            store,
            config: Arc::new(config),
            in_flight: Arc::new(InFlight::new()),
            flows: TaskTracker::new(),
        }
    }

    /// Build the GitLab and Trello adapters from the configuration
    pub fn from_config(config: &HubConfig, store: Arc<MappingStore>) -> Result<Self> {
        let timeout = config.sync.request_timeout();
        let tracker = GitLabAdapter::new(config.gitlab.clone(), timeout)?;
        let board = TrelloAdapter::new(config.trello.clone(), timeout)?;

        Ok(Self::new(
            Arc::new(tracker),
            Arc::new(board),
            store,
            FlowConfig::from_config(config),
        ))
    }

    /// Number of spawned flows that have not finished
    pub fn flows_in_flight(&self) -> usize {
        self.flows.len()
    }

    /// Wait for running flows to finish before the process exits
    ///
    /// Waits at most the hand-off timeout plus a short slack, so a flow whose
    /// remote call already succeeded still gets to write its mapping. Returns
    /// false if flows were still running when the wait gave up.
    pub async fn shutdown(&self) -> bool {
        self.flows.close();

        let pending = self.flows.len();
        if pending == 0 {
            return true;
        }

        let grace = self.config.handoff_timeout + SHUTDOWN_SLACK;
        info!(pending = pending, grace_secs = grace.as_secs(), "Waiting for sync flows to finish");

        match tokio::time::timeout(grace, self.flows.wait()).await {
            Ok(()) => {
                info!("All sync flows finished");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.flows.len(),
                    claimed = self.in_flight.len(),
                    "Shutting down with sync flows still running"
                );
                false
            }
        }
    }

    /// Start the card-moved flow if the board event qualifies
    ///
    /// Returns the handle of the spawned flow, or `None` when the event does
    /// not match the trigger.
    pub fn dispatch_board_event(&self, event: &BoardEvent) -> Option<JoinHandle<Result<FlowOutcome>>> {
        let Some(moved) = event.card_moved_into(&self.config.in_progress_list) else {
            debug!(
                translation_key = %event.action.display.translation_key,
                list_after = %event.destination_list(),
                "Board event does not start a sync cycle"
            );
            return None;
        };

        let this = self.clone();
        Some(self.supervise(CARD_MOVED_FLOW, async move {
            this.card_moved(moved).await
        }))
    }

    /// Start the issue-closed flow if the tracker event qualifies
    pub fn dispatch_tracker_event(
        &self,
        event: &TrackerEvent,
    ) -> Option<JoinHandle<Result<FlowOutcome>>> {
        let Some(issue_id) = event.closed_issue() else {
            debug!(
                action = %event.object_attributes.action,
                issue_id = event.object_attributes.id,
                "Tracker event is not an issue close"
            );
            return None;
        };

        let this = self.clone();
        Some(self.supervise(ISSUE_CLOSED_FLOW, async move {
            this.issue_closed(issue_id).await
        }))
    }

    /// Card entered the in-progress list: create the issue, then record it
    pub async fn card_moved(&self, moved: CardMoved) -> Result<FlowOutcome> {
        let key = format!("card:{}", moved.card_id);
        let Some(_claim) = self.in_flight.try_claim(&key) else {
            return Ok(FlowOutcome::Duplicate { key });
        };

        if let Some(existing) = self.store.find_open_by_card(&moved.card_id).await? {
            return Ok(FlowOutcome::AlreadyMapped {
                card_id: existing.card_id,
                issue_id: existing.issue_id,
            });
        }

        let cycle = self.store.next_cycle(&moved.card_id).await?;

        let tracker = Arc::clone(&self.tracker);
        let retry = self.config.create_issue_retry.clone();
        let title = moved.title.clone();
        let issue_id = hand_off("create issue", self.config.handoff_timeout, async move {
            let started = Instant::now();
            let result = with_retry(&retry, "gitlab.create_issue", || {
                tracker.create_issue(&title)
            })
            .await;
            metrics::record_remote_call("gitlab", started.elapsed().as_secs_f64());
            result
        })
        .await?;

        let record = MappingRecord::open(moved.card_id.clone(), issue_id, cycle);
        let inserted = self.store.insert(&record).await.map_err(|e| {
            HubError::Storage(format!(
                "issue {} created but mapping for card {} cycle {} was not stored: {}",
                issue_id, moved.card_id, cycle, e
            ))
        })?;
        match inserted {
            InsertOutcome::Inserted => Ok(FlowOutcome::IssueCreated {
                card_id: moved.card_id,
                issue_id,
                cycle,
            }),
            InsertOutcome::AlreadyMapped => Err(HubError::Storage(format!(
                "issue {} created but card {} cycle {} is already mapped",
                issue_id, moved.card_id, cycle
            ))),
        }
    }

    /// Issue closed: move its card to testing, then close the mapping
    pub async fn issue_closed(&self, issue_id: i64) -> Result<FlowOutcome> {
        let key = format!("issue:{}", issue_id);
        let Some(_claim) = self.in_flight.try_claim(&key) else {
            return Ok(FlowOutcome::Duplicate { key });
        };

        let Some(record) = self.store.find_by_issue(issue_id).await? else {
            return Ok(FlowOutcome::Unmapped { issue_id });
        };

        if !record.is_open() {
            return Ok(FlowOutcome::AlreadyClosed { issue_id });
        }

        let board = Arc::clone(&self.board);
        let retry = self.config.move_card_retry.clone();
        let card_id = record.card_id.clone();
        let list_id = self.config.testing_list.clone();
        hand_off("move card", self.config.handoff_timeout, async move {
            let started = Instant::now();
            let result = with_retry(&retry, "trello.move_card", || {
                board.move_card(&card_id, &list_id)
            })
            .await;
            metrics::record_remote_call("trello", started.elapsed().as_secs_f64());
            result
        })
        .await?;

        if self.store.mark_closed(&record.card_id, record.cycle).await? {
            Ok(FlowOutcome::CardMoved {
                card_id: record.card_id,
                issue_id,
            })
        } else {
            Ok(FlowOutcome::AlreadyClosed { issue_id })
        }
    }

    /// Spawn a tracked flow whose failure is logged and counted but never escalated
    fn supervise<F>(&self, flow: &'static str, fut: F) -> JoinHandle<Result<FlowOutcome>>
    where
        F: Future<Output = Result<FlowOutcome>> + Send + 'static,
    {
        self.flows.spawn(async move {
            let result = fut.await;
            match &result {
                Ok(outcome @ (FlowOutcome::IssueCreated { .. } | FlowOutcome::CardMoved { .. })) => {
                    info!(flow = flow, outcome = ?outcome, "Sync flow completed");
                    metrics::record_flow(flow, outcome.label());
                }
                Ok(FlowOutcome::Duplicate { key }) => {
                    warn!(flow = flow, key = %key, "Event already being handled, skipped");
                    metrics::record_flow(flow, "duplicate");
                }
                Ok(outcome) => {
                    debug!(flow = flow, outcome = ?outcome, "Sync flow made no changes");
                    metrics::record_flow(flow, outcome.label());
                }
                Err(e) => {
                    error!(flow = flow, error_type = e.kind(), "Sync flow failed: {}", e);
                    metrics::record_flow_error(flow, e.kind());
                }
            }
            result
        })
    }
}
