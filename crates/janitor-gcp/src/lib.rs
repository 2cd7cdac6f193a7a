// # Google Cloud Collaborators
//
// This crate connects the janitor engine to Google Cloud:
//
// - `CredentialManager`: cached bearer tokens with single-flight refresh,
//   backed by a `TokenSource` (`ServiceAccountTokenSource` in production)
// - `ApiClient`: authenticated HTTP with rate limiting, retries on 429/5xx,
//   token refresh on 401 and lazy pagination
// - `CloudDnsClient`: the engine's `DnsProvider`; `CloudDnsChangePublisher`
//   applies corrections
// - `PubsubPublisher`: emits corrections to a Pub/Sub topic
// - `ComputeClient` and `ResourceManagerClient`: instance and project
//   listings for building a desired state
//
// ## Error mapping
//
// | Condition                         | Error               |
// |-----------------------------------|---------------------|
// | Token refresh failed              | `Error::Auth`       |
// | 429 / 5xx / connection, exhausted | `Error::Transient`  |
// | Other 4xx (incl. repeated 401)    | `Error::Api`        |
// | Unexpected item shape             | `Error::MalformedState` |
//
// The engine turns these into acknowledgment decisions; nothing here knows
// about messages.
//
// ## Security
//
// Tokens and private keys are redacted from `Debug` output and never logged.

pub mod auth;
pub mod client;
pub mod compute;
pub mod dns;
pub mod paginate;
pub mod pubsub;
pub mod rate_limit;
pub mod resource_manager;
pub mod retry;
pub mod service_account;

use std::sync::Arc;

use janitor_core::{JanitorConfig, Result};

pub use auth::{Credential, CredentialManager, Scopes, TokenSource, REFRESH_MARGIN};
pub use client::{ApiClient, ApiResponse, MAX_REFRESH_ATTEMPTS};
pub use compute::{ComputeClient, InstanceData};
pub use dns::{CloudDnsChangePublisher, CloudDnsClient};
pub use paginate::{Items, Paginator};
pub use pubsub::{CorrectionMessage, PubsubPublisher};
pub use rate_limit::RateLimiter;
pub use resource_manager::{Project, ResourceManagerClient};
pub use retry::RetryPolicy;
pub use service_account::ServiceAccountTokenSource;

/// Build an API client from the daemon configuration
///
/// Loads the service-account keyfile; no network access happens until the
/// first request.
///
/// # Errors
///
/// `Error::Config` if the keyfile is unusable.
pub fn api_client_from_config(config: &JanitorConfig) -> Result<ApiClient> {
    let source = ServiceAccountTokenSource::from_file(&config.credentials.keyfile)?;
    tracing::info!("Using service account {}", source.client_email());

    let credentials = Arc::new(CredentialManager::new(Arc::new(source)));
    ApiClient::new(credentials, Scopes::new(&config.scopes), &config.api)
}
