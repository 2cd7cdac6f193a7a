// # Publisher & Error Reporter Traits
//
// Outbound collaborators of the engine.
//
// - `CorrectionPublisher` receives every computed correction, including
//   empty ones (a "no-op" result).
// - `ErrorReporter` receives failures that were acknowledged anyway
//   (poison messages) and failures left for redelivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::diff::Correction;
use crate::message::{ChangeMessage, ChangeRequest};

/// A correction together with the request that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedCorrection {
    pub request: ChangeRequest,
    pub correction: Correction,
}

/// Trait for outbound result implementations
///
/// Fire-and-forget from the engine's perspective: a returned error is
/// treated as transient and the inbound message is left unacknowledged.
#[async_trait]
pub trait CorrectionPublisher: Send + Sync {
    /// Publish a correction (possibly empty) for a request
    async fn publish(
        &self,
        request: &ChangeRequest,
        correction: &Correction,
    ) -> Result<(), crate::Error>;

    /// Get the publisher name (for logging/debugging)
    fn publisher_name(&self) -> &'static str;
}

/// Trait for out-of-band error reporting
pub trait ErrorReporter: Send + Sync {
    /// Report a failed reconciliation
    ///
    /// `acknowledged` tells whether the message was acknowledged despite the
    /// failure (non-retryable) or left for redelivery.
    fn report(&self, message: &ChangeMessage, error: &crate::Error, acknowledged: bool);
}

/// Error reporter that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, message: &ChangeMessage, err: &crate::Error, acknowledged: bool) {
        if acknowledged {
            error!(
                handle = %message.handle,
                "Dropping message {}: {}",
                message.payload,
                err
            );
        } else {
            error!(
                handle = %message.handle,
                "Reconciliation failed, leaving message for redelivery: {}",
                err
            );
        }
    }
}
