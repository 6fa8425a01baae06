//! Webhook server
//!
//! Receives Trello and GitLab webhooks and hands them to the
//! [`SyncOrchestrator`]. Providers always get `200 {"status":"ok"}` back. A
//! payload that is too large or does not decode, an event that matches no
//! trigger, and a flow that later fails are logged and counted but never
//! reported to the sender.
//!
//! # Routes
//!
//! - `GET /` - liveness text
//! - `GET /health` - health check
//! - `GET /metrics` - Prometheus metrics
//! - `POST /trello` - Trello board webhook
//! - `HEAD /trello` - Trello callback verification during webhook setup
//! - `POST /gitlab` - GitLab issue webhook
//!
//! # Example
//!
//! ```no_run
//! use cardhub::config::HubConfig;
//! use cardhub::server::WebhookServer;
//! use cardhub::store::MappingStore;
//! use cardhub::sync::SyncOrchestrator;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cardhub::Result<()> {
//!     let config = HubConfig::load("config.yaml")?;
//!     let store = Arc::new(MappingStore::open(&config.store)?);
//!     let orchestrator = SyncOrchestrator::from_config(&config, store)?;
//!
//!     WebhookServer::new(orchestrator).run("0.0.0.0:8080").await
//! }
//! ```

use crate::events::{BoardEvent, TrackerEvent};
use crate::metrics;
use crate::sync::SyncOrchestrator;
use crate::{HubError, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Webhook bodies above this size are not read; the sender still gets the ack
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Shared server state
struct AppState {
    orchestrator: SyncOrchestrator,
}

/// HTTP server for the relay
pub struct WebhookServer {
    state: Arc<AppState>,
}

impl WebhookServer {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self {
            state: Arc::new(AppState { orchestrator }),
        }
    }

    /// Build the router
    fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/health", get(health))
            .route("/metrics", get(prometheus_metrics))
            .route("/trello", post(trello_webhook).head(trello_verify))
            .route("/gitlab", post(gitlab_webhook))
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .with_state(state)
    }

    /// Router for embedding or testing without a listener
    pub fn into_router(self) -> Router {
        Self::router(self.state)
    }

    /// Run the server on the given address until Ctrl-C
    ///
    /// After the listener stops, waits for sync flows that are still running
    /// so their store writes are not lost.
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HubError::Config(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(addr = addr, "Webhook server listening");

        let orchestrator = self.state.orchestrator.clone();
        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(HubError::Io)?;

        orchestrator.shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// ============================================================================
// Responses
// ============================================================================

/// Body returned to every webhook call
#[derive(Debug, Serialize)]
struct Ack {
    status: &'static str,
}

fn ack() -> Json<Ack> {
    Json(Ack { status: "ok" })
}

/// Decode a webhook body, logging (not rejecting) unreadable or malformed payloads
fn decode<T: DeserializeOwned>(
    source: &'static str,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Option<T> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(
                source = source,
                status = %rejection.status(),
                "Unreadable webhook body: {}",
                rejection.body_text()
            );
            metrics::record_webhook(source, "oversized");
            return None;
        }
    };

    match serde_json::from_slice(&body) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(source = source, bytes = body.len(), "Malformed webhook payload: {}", e);
            metrics::record_webhook(source, "malformed");
            None
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn index() -> &'static str {
    "It works!"
}

async fn health() -> impl IntoResponse {
    ack()
}

async fn prometheus_metrics() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn trello_verify() -> impl IntoResponse {
    tracing::debug!("Trello webhook verification request");
    metrics::record_webhook("trello", "verification");
    ack()
}

async fn trello_webhook(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    if let Some(event) = decode::<BoardEvent>("trello", body) {
        match state.orchestrator.dispatch_board_event(&event) {
            Some(_) => {
                tracing::info!(card_id = %event.card_id(), "Card moved into in-progress list");
                metrics::record_webhook("trello", "dispatched");
            }
            None => metrics::record_webhook("trello", "ignored"),
        }
    }
    ack()
}

async fn gitlab_webhook(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    if let Some(event) = decode::<TrackerEvent>("gitlab", body) {
        match state.orchestrator.dispatch_tracker_event(&event) {
            Some(_) => {
                tracing::info!(issue_id = event.object_attributes.id, "Issue closed");
                metrics::record_webhook("gitlab", "dispatched");
            }
            None => metrics::record_webhook("gitlab", "ignored"),
        }
    }
    ack()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::RetryConfig;
    use crate::store::{MappingRecord, MappingStatus, MappingStore};
    use crate::sync::testing::{FakeBoard, FakeTracker};
    use crate::sync::FlowConfig;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        tracker: Arc<FakeTracker>,
        board: Arc<FakeBoard>,
        store: Arc<MappingStore>,
        app: Router,
    }

    fn create_test_server() -> Harness {
        let tracker = Arc::new(FakeTracker::starting_at(42));
        let board = Arc::new(FakeBoard::default());
        let store = Arc::new(MappingStore::open_in_memory("hub").unwrap());
        let orchestrator = SyncOrchestrator::new(
            tracker.clone(),
            board.clone(),
            store.clone(),
            FlowConfig {
                in_progress_list: "list-in-progress".to_string(),
                testing_list: "list-testing".to_string(),
                handoff_timeout: Duration::from_secs(5),
                create_issue_retry: RetryConfig::none(),
                move_card_retry: RetryConfig::none(),
            },
        );
        Harness {
            tracker,
            board,
            store,
            app: WebhookServer::new(orchestrator).into_router(),
        }
    }

    async fn post_json(app: Router, uri: &str, body: String) -> StatusCode {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
    }

    /// Flows run after the response; poll until `check` holds
    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_index_and_health() {
        let harness = create_test_server();

        let response = harness
            .app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = harness
            .app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_trello_head_verification() {
        let harness = create_test_server();

        let response = harness
            .app
            .oneshot(
                Request::builder()
                    .method("HEAD")
                    .uri("/trello")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_acknowledged() {
        let harness = create_test_server();

        let status = post_json(harness.app.clone(), "/trello", "{not json".to_string()).await;
        assert_eq!(status, StatusCode::OK);

        let status = post_json(harness.app, "/gitlab", "[]".to_string()).await;
        assert_eq!(status, StatusCode::OK);

        assert!(harness.tracker.calls().is_empty());
        assert!(harness.board.calls().is_empty());
    }

    #[tokio::test]
    async fn test_trello_card_move_creates_mapping() {
        let harness = create_test_server();

        let body = serde_json::json!({
            "action": {
                "type": "updateCard",
                "display": {
                    "translationKey": "action_move_card_from_list_to_list",
                    "entities": {
                        "card": {"id": "abc123", "text": "Fix bug"},
                        "listAfter": {"id": "list-in-progress"}
                    }
                }
            }
        });

        let status = post_json(harness.app, "/trello", body.to_string()).await;
        assert_eq!(status, StatusCode::OK);

        let store = harness.store.clone();
        eventually(|| {
            let store = store.clone();
            async move { store.find_by_issue(42).await.unwrap().is_some() }
        })
        .await;

        assert_eq!(harness.tracker.calls(), vec!["Fix bug".to_string()]);
    }

    #[tokio::test]
    async fn test_gitlab_close_moves_card() {
        let harness = create_test_server();
        harness
            .store
            .insert(&MappingRecord::open("abc123", 42, 1))
            .await
            .unwrap();

        let body = serde_json::json!({
            "object_kind": "issue",
            "object_attributes": {"action": "close", "id": 42}
        });

        let status = post_json(harness.app, "/gitlab", body.to_string()).await;
        assert_eq!(status, StatusCode::OK);

        let store = harness.store.clone();
        eventually(|| {
            let store = store.clone();
            async move {
                store.find_by_issue(42).await.unwrap().map(|r| r.status)
                    == Some(MappingStatus::Closed)
            }
        })
        .await;

        assert_eq!(
            harness.board.calls(),
            vec![("abc123".to_string(), "list-testing".to_string())]
        );
    }

    #[tokio::test]
    async fn test_oversized_payload_is_acknowledged() {
        let harness = create_test_server();
        let padding = "x".repeat(MAX_BODY_SIZE + 1024);
        let body = serde_json::json!({
            "action": {
                "display": {
                    "translationKey": "action_move_card_from_list_to_list",
                    "entities": {
                        "card": {"id": "abc123", "text": padding},
                        "listAfter": {"id": "list-in-progress"}
                    }
                }
            }
        });

        let status = post_json(harness.app, "/trello", body.to_string()).await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.tracker.calls().is_empty());
        assert!(harness.store.list(None).await.unwrap().is_empty());
    }

    /// True if the webhook counter has a series for this source and outcome
    fn has_webhook_series(output: &str, source: &str, outcome: &str) -> bool {
        let source = format!("source=\"{}\"", source);
        let outcome = format!("outcome=\"{}\"", outcome);
        output.lines().any(|line| {
            line.starts_with("cardhub_webhook_events_total{")
                && line.contains(&source)
                && line.contains(&outcome)
        })
    }

    #[tokio::test]
    async fn test_webhook_outcomes_are_counted_apart() {
        let harness = create_test_server();

        // malformed
        post_json(harness.app.clone(), "/trello", "{not json".to_string()).await;
        // ignored: decodes, but is not a close
        let reopen = serde_json::json!({"object_attributes": {"action": "reopen", "id": 7}});
        post_json(harness.app.clone(), "/gitlab", reopen.to_string()).await;
        // dispatched
        let close = serde_json::json!({"object_attributes": {"action": "close", "id": 7}});
        post_json(harness.app.clone(), "/gitlab", close.to_string()).await;
        // verification
        harness
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("HEAD")
                    .uri("/trello")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // oversized
        post_json(
            harness.app.clone(),
            "/gitlab",
            "x".repeat(MAX_BODY_SIZE + 1),
        )
        .await;

        let output = metrics::encode_metrics().unwrap();
        assert!(has_webhook_series(&output, "trello", "malformed"));
        assert!(has_webhook_series(&output, "gitlab", "ignored"));
        assert!(has_webhook_series(&output, "gitlab", "dispatched"));
        assert!(has_webhook_series(&output, "trello", "verification"));
        assert!(has_webhook_series(&output, "gitlab", "oversized"));

        let response = harness
            .app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
