//! Trello Integration Adapter
//!
//! Moves cards between lists through the REST API. Credentials travel as
//! `key`/`token` form fields alongside the target `idList`.

use super::{rate_limit_delay, CardBoard};
use crate::config::TrelloIntegration;
use crate::{HubError, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Card as returned by `PUT /cards/:id`
#[derive(Debug, Clone, Deserialize)]
pub struct TrelloCard {
    pub id: String,
    #[serde(rename = "idList", default)]
    pub id_list: Option<String>,
}

/// Trello API client
pub struct TrelloAdapter {
    client: Client,
    config: TrelloIntegration,
    base_url: String,
}

impl TrelloAdapter {
    /// Create a new Trello adapter
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: TrelloIntegration, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static("cardhub/0.1"),
                );
                headers
            })
            .build()?;

        let base_url = config.api.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn card_url(&self, card_id: &str) -> String {
        format!("{}/cards/{}/", self.base_url, urlencoding::encode(card_id))
    }
}

#[async_trait]
impl CardBoard for TrelloAdapter {
    async fn move_card(&self, card_id: &str, list_id: &str) -> Result<String> {
        info!(card_id = %card_id, list_id = %list_id, "Moving Trello card");

        let response = self
            .client
            .put(self.card_url(card_id))
            .form(&[
                ("key", self.config.key.as_str()),
                ("token", self.config.token.as_str()),
                ("idList", list_id),
            ])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let card: TrelloCard = response.json().await?;
                debug!(card_id = %card.id, list = ?card.id_list, "Trello card moved");
                Ok(card.id)
            }
            StatusCode::UNAUTHORIZED => Err(HubError::Auth(
                "Trello rejected the key/token pair".to_string(),
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(HubError::RateLimited(rate_limit_delay(response.headers())))
            }
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(HubError::Integration(format!(
                    "Trello move card failed: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }
}
