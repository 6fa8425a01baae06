//! GitLab Integration Adapter
//!
//! Creates issues in the configured project through the REST API v4.

use super::{rate_limit_delay, IssueTracker};
use crate::config::GitLabIntegration;
use crate::{HubError, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Issue as returned by `POST /projects/:id/issues`; only the id is used
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabIssue {
    pub id: i64,
    #[serde(default)]
    pub iid: Option<i64>,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// GitLab API client
pub struct GitLabAdapter {
    client: Client,
    config: GitLabIntegration,
    issues_url: String,
}

impl GitLabAdapter {
    /// Create a new GitLab adapter
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: GitLabIntegration, request_timeout: Duration) -> Result<Self> {
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

        let issues_url = format!(
            "{}/projects/{}/issues",
            config.api.trim_end_matches('/'),
            urlencoding::encode(&config.project_id)
        );

        Ok(Self {
            client,
            config,
            issues_url,
        })
    }
}

#[async_trait]
impl IssueTracker for GitLabAdapter {
    async fn create_issue(&self, title: &str) -> Result<i64> {
        info!(project = %self.config.project_id, title = %title, "Creating GitLab issue");

        let response = self
            .client
            .post(&self.issues_url)
            .header("PRIVATE-TOKEN", &self.config.token)
            .form(&[("title", title)])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let issue: GitLabIssue = response.json().await?;
                debug!(id = issue.id, iid = ?issue.iid, url = ?issue.web_url, "GitLab issue created");
                Ok(issue.id)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HubError::Auth(
                "GitLab rejected the private token".to_string(),
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(HubError::RateLimited(rate_limit_delay(response.headers())))
            }
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(HubError::Integration(format!(
                    "GitLab create issue failed: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }
}
