//! Google Cloud Resource Manager project listing

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use janitor_core::Result;

use crate::client::ApiClient;

pub const RESOURCE_MANAGER_BASE: &str = "https://cloudresourcemanager.googleapis.com/v1";

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// A project as returned by the projects API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub project_number: Option<String>,
    #[serde(default)]
    pub lifecycle_state: String,
}

impl Project {
    pub fn is_active(&self) -> bool {
        self.lifecycle_state.eq_ignore_ascii_case("active")
    }
}

/// Client for the Resource Manager projects API
#[derive(Debug, Clone)]
pub struct ResourceManagerClient {
    api: ApiClient,
    base_url: String,
}

impl ResourceManagerClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            base_url: RESOURCE_MANAGER_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Every project the credential can see whose lifecycle state is ACTIVE
    pub async fn list_active_projects(&self, page_size: u32) -> Result<Vec<Project>> {
        let mut projects = self.api.paginate::<Project>(
            Method::GET,
            format!("{}/projects", self.base_url),
            vec![("pageSize".to_string(), page_size.to_string())],
            "projects",
        );

        let mut active = Vec::new();
        while let Some(project) = projects.try_next().await? {
            if project.is_active() {
                active.push(project);
            } else {
                debug!(
                    "Skipping project {} in state {:?}",
                    project.project_id, project.lifecycle_state
                );
            }
        }
        Ok(active)
    }
}
