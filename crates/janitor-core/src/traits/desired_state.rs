// # Desired State Source Trait
//
// Defines the interface to the source of truth.
//
// The source is read-only from the janitor's point of view and must return a
// snapshot that is consistent for the duration of one reconciliation run.
//
// ## Implementations
//
// - File-based: `FileDesiredStateSource` (JSON file, re-read per run)

use async_trait::async_trait;

use crate::message::ChangeRequest;
use crate::record::DesiredState;

/// Trait for source-of-truth implementations
///
/// # Scope
///
/// Implementations may return more than the request covers; the engine
/// filters the snapshot down to the request's scope before diffing.
///
/// # Errors
///
/// Entries that cannot be turned into a record set must surface as
/// `Error::MalformedState` so the engine acknowledges the message instead of
/// letting it be redelivered forever.
#[async_trait]
pub trait DesiredStateSource: Send + Sync {
    /// Get the desired record sets for a request
    async fn desired_state(&self, request: &ChangeRequest) -> Result<DesiredState, crate::Error>;
}
