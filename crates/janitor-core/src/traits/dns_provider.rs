// # DNS Provider Trait
//
// Defines the interface for reading the record sets actually published in a
// DNS provider.
//
// ## Implementations
//
// - Google Cloud DNS: `janitor-gcp` crate (`CloudDnsClient`)
//
// ## Usage
//
// ```rust,ignore
// use janitor_core::{ChangeRequest, DnsProvider};
//
// let provider = /* DnsProvider implementation */;
// let request = ChangeRequest::record("prod-zone", "api.example.com.")?;
// let records = provider.fetch_records(&request).await?;
// ```

use async_trait::async_trait;

use crate::message::ChangeRequest;
use crate::record::ResourceRecordSet;

/// Trait for DNS provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks. The
/// engine calls `fetch_records` from many workers at once.
///
/// # Freshness
///
/// Every call must reflect the provider's current state. Implementations
/// must not cache listings across calls: a stale listing produces wrong
/// corrections.
///
/// # Errors
///
/// Implementations return the typed errors of the API client unchanged
/// (`Transient`, `Api`, `Auth`, `MalformedState`). The engine decides what
/// that means for the inbound message.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Fetch the record sets currently published for a request's scope
    ///
    /// For [`ReconcileTarget::Record`](crate::message::ReconcileTarget::Record)
    /// this returns every type published under that name; for
    /// [`ReconcileTarget::All`](crate::message::ReconcileTarget::All) the
    /// whole zone.
    async fn fetch_records(
        &self,
        request: &ChangeRequest,
    ) -> Result<Vec<ResourceRecordSet>, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
