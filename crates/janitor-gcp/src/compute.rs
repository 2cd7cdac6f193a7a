//! Google Compute Engine instance listing
//!
//! Lists instances across all zones of a project through the aggregated
//! endpoint and reduces each to the addresses a DNS source of truth needs.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::{debug, info};

use janitor_core::{Error, Result};

use crate::client::ApiClient;
use crate::paginate::Paginator;

pub const COMPUTE_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// Page size hint for the aggregated listing
pub const DEFAULT_MAX_RESULTS: u32 = 500;

/// Addresses of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceData {
    pub hostname: String,
    pub internal_ip: IpAddr,
    pub external_ip: IpAddr,
}

#[derive(Debug, Default, Deserialize)]
struct AggregatedPage {
    #[serde(default)]
    items: BTreeMap<String, ZoneInstances>,
}

#[derive(Debug, Default, Deserialize)]
struct ZoneInstances {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instance {
    name: String,
    #[serde(default)]
    tags: Tags,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Default, Deserialize)]
struct Tags {
    #[serde(default)]
    items: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    #[serde(rename = "networkIP")]
    network_ip: Option<String>,
    #[serde(default)]
    access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfig {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

/// Client for the Compute Engine instances API
#[derive(Debug, Clone)]
pub struct ComputeClient {
    api: ApiClient,
    base_url: String,
    max_results: u32,
    blacklisted_tags: Vec<String>,
    blacklisted_metadata: Vec<(String, String)>,
}

impl ComputeClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            base_url: COMPUTE_BASE.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            blacklisted_tags: Vec::new(),
            blacklisted_metadata: Vec::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Skip instances carrying any of these network tags
    pub fn with_blacklisted_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklisted_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Skip instances whose metadata has any of these key/value pairs
    pub fn with_blacklisted_metadata<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.blacklisted_metadata = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// All collectable instances of a project
    ///
    /// `filter` is passed through to the API unchanged.
    pub async fn list_instances(&self, project: &str, filter: Option<&str>) -> Result<Vec<InstanceData>> {
        let mut params = vec![("maxResults".to_string(), self.max_results.to_string())];
        if let Some(filter) = filter {
            params.push(("filter".to_string(), filter.to_string()));
        }

        let url = format!("{}/projects/{}/aggregated/instances", self.base_url, project);
        let mut pages = Paginator::new(self.api.clone(), Method::GET, url, params);

        let mut instances = Vec::new();
        while let Some(page) = pages.next_page().await? {
            let page: AggregatedPage = serde_json::from_value(page).map_err(|e| {
                Error::malformed(format!("unexpected instance listing for {}: {}", project, e))
            })?;

            for zone in page.items.into_values() {
                for instance in zone.instances {
                    if self.is_blacklisted(&instance) {
                        continue;
                    }
                    match extract(&instance) {
                        Some(data) => instances.push(data),
                        None => debug!(
                            "Could not extract addresses for instance {:?}, skipping",
                            instance.name
                        ),
                    }
                }
            }
        }

        debug!("Found {} instance(s) in project {}", instances.len(), project);
        Ok(instances)
    }

    fn is_blacklisted(&self, instance: &Instance) -> bool {
        if let Some(tag) = instance
            .tags
            .items
            .iter()
            .find(|tag| self.blacklisted_tags.contains(tag))
        {
            info!("Instance {:?} filtered out for blacklisted tag {:?}", instance.name, tag);
            return true;
        }

        let matched = instance.metadata.items.iter().find(|item| {
            self.blacklisted_metadata
                .iter()
                .any(|(key, value)| *key == item.key && item.value.as_deref() == Some(value.as_str()))
        });
        if let Some(item) = matched {
            info!(
                "Instance {:?} filtered out for blacklisted metadata {:?}",
                instance.name, item.key
            );
            return true;
        }

        false
    }
}

fn extract(instance: &Instance) -> Option<InstanceData> {
    let iface = instance.network_interfaces.first()?;
    let internal_ip = iface.network_ip.as_deref()?.parse().ok()?;
    let external_ip = iface.access_configs.first()?.nat_ip.as_deref()?.parse().ok()?;
    Some(InstanceData {
        hostname: instance.name.clone(),
        internal_ip,
        external_ip,
    })
}
