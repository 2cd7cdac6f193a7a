// # Change Transport Trait
//
// Defines the interface for receiving change messages and acknowledging them.
//
// ## Delivery Semantics
//
// At-least-once. A message that is never acknowledged is redelivered by the
// transport according to its own policy (implicit nack by timeout).
// Duplicates are expected and tolerated: reconciliation is idempotent.
//
// ## Implementations
//
// - In-process: `MemoryTransport`

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::message::{ChangeMessage, DeliveryHandle};

/// Trait for inbound transport implementations
///
/// # Cancellation
///
/// The engine drops the subscription stream as soon as it stops pulling
/// (shutdown). Dropping must release transport resources and must not
/// acknowledge anything.
#[async_trait]
pub trait ChangeTransport: Send + Sync {
    /// Stream of inbound messages
    ///
    /// The stream ends when the transport is closed. It must be
    /// cancellation-safe: dropping a pending `next()` loses no message.
    fn subscribe(&self) -> Pin<Box<dyn Stream<Item = ChangeMessage> + Send + 'static>>;

    /// Acknowledge a delivery so it is not redelivered
    async fn ack(&self, handle: &DeliveryHandle) -> Result<(), crate::Error>;
}
