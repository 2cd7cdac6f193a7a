//! Configuration types for the DNS janitor
//!
//! This module defines all configuration structures used throughout the
//! workspace. The daemon fills them from the environment; library users can
//! deserialize them from any serde format.

use crate::record::RecordType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main janitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Cloud project that owns the managed zones
    pub project: String,

    /// Where credentials come from
    pub credentials: CredentialsConfig,

    /// Authorization scopes requested for API calls
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Managed zones to reconcile
    pub zones: Vec<String>,

    /// Path to the desired-state JSON file
    pub desired_state_path: PathBuf,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Optional API client settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Where corrections go
    #[serde(default)]
    pub publisher: PublisherConfig,
}

impl JanitorConfig {
    /// Create a configuration with defaults for everything optional
    pub fn new(
        project: impl Into<String>,
        keyfile: impl Into<PathBuf>,
        desired_state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project: project.into(),
            credentials: CredentialsConfig {
                keyfile: keyfile.into(),
            },
            scopes: default_scopes(),
            zones: Vec::new(),
            desired_state_path: desired_state_path.into(),
            engine: EngineConfig::default(),
            api: ApiConfig::default(),
            publisher: PublisherConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.project.trim().is_empty() {
            return Err(crate::Error::config("Project cannot be empty"));
        }
        if self.zones.is_empty() {
            return Err(crate::Error::config("No zones configured"));
        }
        if self.zones.iter().any(|zone| zone.trim().is_empty()) {
            return Err(crate::Error::config("Zone names cannot be empty"));
        }
        if self.scopes.is_empty() {
            return Err(crate::Error::config("At least one scope is required"));
        }
        if self.desired_state_path.as_os_str().is_empty() {
            return Err(crate::Error::config("Desired state path cannot be empty"));
        }

        self.credentials.validate()?;
        self.engine.validate()?;
        self.api.validate()?;
        self.publisher.validate()?;

        Ok(())
    }
}

/// Credential source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Service-account JSON keyfile
    pub keyfile: PathBuf,
}

impl CredentialsConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.keyfile.as_os_str().is_empty() {
            return Err(crate::Error::config("Keyfile path cannot be empty"));
        }
        Ok(())
    }
}

/// Outbound publisher configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublisherConfig {
    /// Log corrections only (dry run)
    #[default]
    Log,

    /// Apply corrections through the Cloud DNS batch change endpoint
    CloudDns,

    /// Publish corrections to a Pub/Sub topic
    Pubsub {
        /// Topic name within the configured project
        topic: String,
    },
}

impl PublisherConfig {
    /// Validate the publisher configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            PublisherConfig::Pubsub { topic } if topic.trim().is_empty() => Err(
                crate::Error::config("Pub/Sub publisher requires a topic"),
            ),
            _ => Ok(()),
        }
    }

    /// Get the publisher type name
    pub fn type_name(&self) -> &'static str {
        match self {
            PublisherConfig::Log => "log",
            PublisherConfig::CloudDns => "cloud-dns",
            PublisherConfig::Pubsub { .. } => "pubsub",
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of change messages processed concurrently
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,

    /// How long shutdown waits for in-flight work before cancelling it
    /// (in seconds)
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Capacity of the internal event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Record types excluded from both sides of every diff
    ///
    /// The provider owns the apex SOA and NS records; touching them would
    /// break the zone.
    #[serde(default = "default_ignored_record_types")]
    pub ignored_record_types: Vec<RecordType>,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.worker_limit == 0 {
            return Err(crate::Error::config("Worker limit must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Drain timeout as a [`Duration`]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_limit: default_worker_limit(),
            drain_timeout_secs: default_drain_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            ignored_record_types: default_ignored_record_types(),
        }
    }
}

/// API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Maximum requests per call before giving up with a transient error
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay (in milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single backoff delay (in milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-request timeout (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Requests allowed per window across all callers; 0 disables limiting
    #[serde(default)]
    pub requests_per_window: u32,

    /// Rate limiting window (in seconds)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Cloud DNS API version path segment
    #[serde(default = "default_dns_api_version")]
    pub dns_api_version: String,
}

impl ApiConfig {
    /// Validate the API configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("Max attempts must be > 0"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(crate::Error::config(
                "Initial backoff cannot exceed max backoff",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("Request timeout must be > 0"));
        }
        if self.requests_per_window > 0 && self.window_secs == 0 {
            return Err(crate::Error::config(
                "Rate limit window must be > 0 when rate limiting is enabled",
            ));
        }
        if self.dns_api_version.trim().is_empty() {
            return Err(crate::Error::config("DNS API version cannot be empty"));
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            requests_per_window: 0,
            window_secs: default_window_secs(),
            dns_api_version: default_dns_api_version(),
        }
    }
}

fn default_scopes() -> Vec<String> {
    vec!["cloud-platform".to_string()]
}

fn default_worker_limit() -> usize {
    16
}

fn default_drain_timeout_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_ignored_record_types() -> Vec<RecordType> {
    vec![RecordType::Soa, RecordType::Ns]
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_window_secs() -> u64 {
    1
}

fn default_dns_api_version() -> String {
    "v1".to_string()
}
