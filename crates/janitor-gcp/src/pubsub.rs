//! Publishes corrections to a Google Cloud Pub/Sub topic
//!
//! Each correction becomes one message whose data is the base64 of:
//!
//! ```json
//! {"zone": "prod", "scope": "api.example.com.", "additions": [...],
//!  "deletions": [...], "timestamp": "2024-05-01T12:00:00Z"}
//! ```
//!
//! `scope` is the record name, or `"*"` for a full-zone run.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use janitor_core::{
    ChangeRequest, Correction, CorrectionPublisher, Error, ReconcileTarget, ResourceRecordSet, Result,
};

use crate::client::ApiClient;

pub const PUBSUB_BASE: &str = "https://pubsub.googleapis.com/v1";

/// Message body published per correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionMessage {
    pub zone: String,
    pub scope: String,
    pub additions: Vec<ResourceRecordSet>,
    pub deletions: Vec<ResourceRecordSet>,
    pub timestamp: String,
}

impl CorrectionMessage {
    pub fn new(request: &ChangeRequest, correction: &Correction) -> Self {
        let scope = match &request.target {
            ReconcileTarget::Record(name) => name.clone(),
            ReconcileTarget::All => "*".to_string(),
        };
        Self {
            zone: request.zone.clone(),
            scope,
            additions: correction.additions.clone(),
            deletions: correction.deletions.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Publishes every correction, empty ones included, to one topic
#[derive(Debug, Clone)]
pub struct PubsubPublisher {
    api: ApiClient,
    project: String,
    topic: String,
    base_url: String,
}

impl PubsubPublisher {
    pub fn new(api: ApiClient, project: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            api,
            project: project.into(),
            topic: topic.into(),
            base_url: PUBSUB_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn publish_url(&self) -> String {
        format!(
            "{}/projects/{}/topics/{}:publish",
            self.base_url, self.project, self.topic
        )
    }
}

#[async_trait]
impl CorrectionPublisher for PubsubPublisher {
    async fn publish(&self, request: &ChangeRequest, correction: &Correction) -> Result<()> {
        let message = CorrectionMessage::new(request, correction);
        let data = BASE64.encode(serde_json::to_vec(&message)?);
        let body = serde_json::json!({ "messages": [{ "data": data }] });

        let response: PublishResponse = match self
            .api
            .request(Method::POST, &self.publish_url(), Some(&body), &[])
            .await
        {
            Ok(response) => response.json()?,
            Err(Error::Api { status, body }) => {
                return Err(Error::publish(format!(
                    "topic {} rejected message for {} (HTTP {}): {}",
                    self.topic, request, status, body
                )))
            }
            Err(e) => return Err(e),
        };

        if correction.is_empty() {
            debug!("Published no-op result for {} to {}", request, self.topic);
        } else {
            info!(
                "Published correction for {} to {} (message {})",
                request,
                self.topic,
                response.message_ids.first().map(String::as_str).unwrap_or("<unknown>")
            );
        }
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        "pubsub"
    }
}
