// # Google Cloud DNS
//
// `CloudDnsClient` reads record sets of managed zones and applies changes.
// It implements `DnsProvider` for the reconciliation engine; every call lists
// the zone afresh, nothing is cached.
//
// `CloudDnsChangePublisher` is the "enforcing" publisher: it submits each
// non-empty correction as a Cloud DNS change (deletions and additions are
// applied atomically by the API).

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info};

use janitor_core::{
    ChangeRequest, Correction, CorrectionPublisher, DnsProvider, Error, ReconcileTarget,
    ResourceRecordSet, Result,
};

use crate::client::ApiClient;
use crate::paginate::Items;

/// Production endpoint root; the API version follows
pub const CLOUD_DNS_BASE: &str = "https://dns.googleapis.com/dns";

// `nextPageToken` must be listed or pagination silently stops after page one
const RRSET_FIELDS: &str = "rrsets(name,type,ttl,rrdatas),nextPageToken";

/// Client for one project's Cloud DNS managed zones
#[derive(Debug, Clone)]
pub struct CloudDnsClient {
    api: ApiClient,
    project: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChangeResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl CloudDnsClient {
    pub fn new(api: ApiClient, project: impl Into<String>, api_version: &str) -> Self {
        Self {
            api,
            project: project.into(),
            base_url: format!("{}/{}", CLOUD_DNS_BASE, api_version),
        }
    }

    /// Point at a different endpoint root (version included)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn zone_url(&self, zone: &str) -> String {
        format!("{}/projects/{}/managedZones/{}", self.base_url, self.project, zone)
    }

    /// Every record set in a zone, paged lazily
    pub fn list_records(&self, zone: &str) -> Items<ResourceRecordSet> {
        self.api.paginate(
            Method::GET,
            format!("{}/rrsets", self.zone_url(zone)),
            vec![("fields".to_string(), RRSET_FIELDS.to_string())],
            "rrsets",
        )
    }

    /// Record sets of every type published under `name`
    pub fn records_named(&self, zone: &str, name: &str) -> Items<ResourceRecordSet> {
        self.api.paginate(
            Method::GET,
            format!("{}/rrsets", self.zone_url(zone)),
            vec![
                ("fields".to_string(), RRSET_FIELDS.to_string()),
                ("name".to_string(), name.to_string()),
            ],
            "rrsets",
        )
    }

    /// Submit a change; returns the change id
    ///
    /// An empty correction sends nothing and returns `None`.
    pub async fn apply_changes(&self, zone: &str, correction: &Correction) -> Result<Option<String>> {
        if correction.is_empty() {
            debug!("No changes to apply to zone {}", zone);
            return Ok(None);
        }

        let body = serde_json::json!({
            "additions": correction.additions,
            "deletions": correction.deletions,
        });
        let response: ChangeResponse = self
            .api
            .request(Method::POST, &format!("{}/changes", self.zone_url(zone)), Some(&body), &[])
            .await?
            .json()?;

        info!(
            "Submitted change {} to zone {} ({} addition(s), {} deletion(s)), status {}",
            response.id.as_deref().unwrap_or("<unknown>"),
            zone,
            correction.additions.len(),
            correction.deletions.len(),
            response.status.as_deref().unwrap_or("<unknown>"),
        );
        Ok(response.id)
    }
}

#[async_trait]
impl DnsProvider for CloudDnsClient {
    async fn fetch_records(&self, request: &ChangeRequest) -> Result<Vec<ResourceRecordSet>> {
        match &request.target {
            ReconcileTarget::Record(name) => self.records_named(&request.zone, name).collect_all().await,
            ReconcileTarget::All => self.list_records(&request.zone).collect_all().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        "cloud-dns"
    }
}

/// Applies corrections to Cloud DNS
#[derive(Debug, Clone)]
pub struct CloudDnsChangePublisher {
    client: CloudDnsClient,
}

impl CloudDnsChangePublisher {
    pub fn new(client: CloudDnsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CorrectionPublisher for CloudDnsChangePublisher {
    async fn publish(&self, request: &ChangeRequest, correction: &Correction) -> Result<()> {
        match self.client.apply_changes(&request.zone, correction).await {
            Ok(_) => Ok(()),
            // A rejected change (e.g. 409 after a concurrent edit) is worth
            // recomputing on redelivery
            Err(Error::Api { status, body }) => Err(Error::publish(format!(
                "Cloud DNS rejected change for {} (HTTP {}): {}",
                request, status, body
            ))),
            Err(e) => Err(e),
        }
    }

    fn publisher_name(&self) -> &'static str {
        "cloud-dns"
    }
}
