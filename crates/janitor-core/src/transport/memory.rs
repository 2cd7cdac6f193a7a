// # Memory Transport
//
// In-process implementation of ChangeTransport.
//
// ## Delivery Semantics
//
// - Every published message gets a fresh delivery handle and stays
//   outstanding until acknowledged
// - Nothing is redelivered on its own; `redeliver_expired()` stands in for a
//   broker's ack deadline and re-queues messages delivered longer ago than
//   the deadline, `redeliver_unacked()` re-queues every outstanding message
// - Acknowledging an unknown or already acknowledged handle is a no-op
// - Only the most recent `ACK_HISTORY` acknowledgments are remembered
//
// ## When to Use
//
// - The daemon's periodic reconcile-all trigger
// - Tests that need to observe what was and was not acknowledged

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_stream::Stream;

use crate::message::{ChangeMessage, DeliveryHandle};
use crate::traits::ChangeTransport;
use crate::Error;

/// Acknowledged handles kept for inspection
pub const ACK_HISTORY: usize = 1024;

#[derive(Debug)]
struct Outstanding {
    message: ChangeMessage,
    /// Last time a subscriber pulled it; `None` while never delivered
    delivered_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<ChangeMessage>,
    outstanding: BTreeMap<u64, Outstanding>,
    acked: VecDeque<DeliveryHandle>,
    next_id: u64,
    closed: bool,
}

impl State {
    fn is_queued(&self, handle: &DeliveryHandle) -> bool {
        self.queue.iter().any(|queued| &queued.handle == handle)
    }
}

fn message_id(handle: &DeliveryHandle) -> Option<u64> {
    handle.0.parse().ok()
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn next_message(&self) -> Option<ChangeMessage> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(message) = state.queue.pop_front() {
                    if let Some(entry) = message_id(&message.handle)
                        .and_then(|id| state.outstanding.get_mut(&id))
                    {
                        entry.delivered_at = Some(Instant::now());
                    }
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }
}

/// In-process at-least-once transport
///
/// Cloning shares the queue, so one clone can publish while the engine
/// consumes through another.
///
/// # Example
///
/// ```rust
/// use janitor_core::MemoryTransport;
///
/// let transport = MemoryTransport::new();
/// let handle = transport.publish(r#"{"zone": "prod", "all": true}"#).unwrap();
/// assert_eq!(transport.unacked().len(), 1);
/// # let _ = handle;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a payload for delivery
    ///
    /// Fails once the transport is closed.
    pub fn publish(&self, payload: impl Into<String>) -> Result<DeliveryHandle, Error> {
        let handle = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(Error::transport("Transport is closed"));
            }

            state.next_id += 1;
            let id = state.next_id;
            let handle = DeliveryHandle::new(id.to_string());
            let message = ChangeMessage::new(payload, handle.clone());
            state.outstanding.insert(
                id,
                Outstanding {
                    message: message.clone(),
                    delivered_at: None,
                },
            );
            state.queue.push_back(message);
            handle
        };

        self.shared.notify.notify_waiters();
        Ok(handle)
    }

    /// Messages delivered or queued but not yet acknowledged
    pub fn unacked(&self) -> Vec<ChangeMessage> {
        self.shared
            .lock()
            .outstanding
            .values()
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// The most recent successful acknowledgments, oldest first
    ///
    /// At most [`ACK_HISTORY`] handles are kept.
    pub fn acked(&self) -> Vec<DeliveryHandle> {
        self.shared.lock().acked.iter().cloned().collect()
    }

    /// Messages waiting to be pulled
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Re-queue one outstanding message
    ///
    /// Returns `false` if the handle was acknowledged, is unknown, or is
    /// already queued.
    pub fn redeliver(&self, handle: &DeliveryHandle) -> bool {
        let requeued = {
            let mut state = self.shared.lock();
            let message = message_id(handle)
                .and_then(|id| state.outstanding.get(&id))
                .map(|entry| entry.message.clone());

            match message {
                Some(message) if !state.is_queued(handle) => {
                    state.queue.push_back(message);
                    true
                }
                _ => false,
            }
        };

        if requeued {
            self.shared.notify.notify_waiters();
        }
        requeued
    }

    /// Re-queue every outstanding message that is not already queued
    ///
    /// Returns the number of messages redelivered.
    pub fn redeliver_unacked(&self) -> usize {
        let count = {
            let mut state = self.shared.lock();
            let State {
                queue, outstanding, ..
            } = &mut *state;

            let mut count = 0;
            for entry in outstanding.values() {
                if !queue.iter().any(|queued| queued.handle == entry.message.handle) {
                    queue.push_back(entry.message.clone());
                    count += 1;
                }
            }
            count
        };

        if count > 0 {
            tracing::debug!("Redelivering {} unacknowledged message(s)", count);
            self.shared.notify.notify_waiters();
        }
        count
    }

    /// Re-queue outstanding messages delivered at least `ack_deadline` ago
    ///
    /// Messages still queued or never pulled are left alone. Returns the
    /// number of messages redelivered.
    pub fn redeliver_expired(&self, ack_deadline: Duration) -> usize {
        let now = Instant::now();
        let count = {
            let mut state = self.shared.lock();
            let State {
                queue, outstanding, ..
            } = &mut *state;

            let mut count = 0;
            for entry in outstanding.values_mut() {
                let expired = entry
                    .delivered_at
                    .is_some_and(|at| now.duration_since(at) >= ack_deadline);
                if expired && !queue.iter().any(|queued| queued.handle == entry.message.handle) {
                    queue.push_back(entry.message.clone());
                    entry.delivered_at = None;
                    count += 1;
                }
            }
            count
        };

        if count > 0 {
            tracing::debug!("Ack deadline passed for {} message(s), redelivering", count);
            self.shared.notify.notify_waiters();
        }
        count
    }

    /// Stop accepting messages
    ///
    /// Subscribers still receive what is queued, then their streams end.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
    }
}

#[async_trait]
impl ChangeTransport for MemoryTransport {
    fn subscribe(&self) -> Pin<Box<dyn Stream<Item = ChangeMessage> + Send + 'static>> {
        let shared = self.shared.clone();
        Box::pin(futures::stream::unfold(shared, |shared| async move {
            let message = shared.next_message().await?;
            Some((message, shared))
        }))
    }

    async fn ack(&self, handle: &DeliveryHandle) -> Result<(), Error> {
        let mut state = self.shared.lock();

        let Some(id) = message_id(handle) else {
            return Err(Error::transport(format!("Unknown delivery handle {}", handle)));
        };

        if state.outstanding.remove(&id).is_some() {
            state.queue.retain(|queued| &queued.handle != handle);
            if state.acked.len() == ACK_HISTORY {
                state.acked.pop_front();
            }
            state.acked.push_back(handle.clone());
        } else {
            tracing::debug!("Delivery {} was already acknowledged", handle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_publish_and_ack() {
        let transport = MemoryTransport::new();
        let mut messages = transport.subscribe();

        let handle = transport.publish("one").unwrap();
        let message = messages.next().await.unwrap();
        assert_eq!(message.payload, "one");
        assert_eq!(message.handle, handle);
        assert_eq!(transport.unacked().len(), 1);

        transport.ack(&handle).await.unwrap();
        assert!(transport.unacked().is_empty());
        assert_eq!(transport.acked(), vec![handle.clone()]);

        // Second ack is a no-op
        transport.ack(&handle).await.unwrap();
        assert_eq!(transport.acked().len(), 1);
    }

    #[tokio::test]
    async fn test_redeliver_unacked() {
        let transport = MemoryTransport::new();
        let mut messages = transport.subscribe();

        let first = transport.publish("first").unwrap();
        let second = transport.publish("second").unwrap();
        assert_eq!(messages.next().await.unwrap().handle, first);
        assert_eq!(messages.next().await.unwrap().handle, second);

        transport.ack(&first).await.unwrap();
        assert_eq!(transport.redeliver_unacked(), 1);
        // Already queued, not queued twice
        assert_eq!(transport.redeliver_unacked(), 0);

        let redelivered = messages.next().await.unwrap();
        assert_eq!(redelivered.handle, second);
        assert_eq!(redelivered.payload, "second");
    }

    #[tokio::test]
    async fn test_redeliver_single_message() {
        let transport = MemoryTransport::new();
        let mut messages = transport.subscribe();

        let first = transport.publish("first").unwrap();
        let second = transport.publish("second").unwrap();
        messages.next().await.unwrap();
        messages.next().await.unwrap();

        transport.ack(&first).await.unwrap();
        assert!(!transport.redeliver(&first));
        assert!(transport.redeliver(&second));
        assert!(!transport.redeliver(&second));
        assert!(!transport.redeliver(&DeliveryHandle::new("not-a-number")));
        assert_eq!(transport.pending(), 1);

        assert_eq!(messages.next().await.unwrap().handle, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeliver_expired_respects_deadline() {
        let transport = MemoryTransport::new();
        let mut messages = transport.subscribe();
        let deadline = std::time::Duration::from_secs(60);

        let delivered = transport.publish("delivered").unwrap();
        messages.next().await.unwrap();
        transport.publish("queued").unwrap();

        // Delivered too recently; the other one was never pulled
        assert_eq!(transport.redeliver_expired(deadline), 0);

        tokio::time::advance(deadline).await;
        assert_eq!(transport.redeliver_expired(deadline), 1);
        assert_eq!(transport.redeliver_expired(deadline), 0);
        assert_eq!(transport.pending(), 2);

        assert_eq!(messages.next().await.unwrap().payload, "queued");
        assert_eq!(messages.next().await.unwrap().handle, delivered);
    }

    #[tokio::test]
    async fn test_ack_history_is_bounded() {
        let transport = MemoryTransport::new();
        let handles: Vec<_> = (0..ACK_HISTORY + 5)
            .map(|i| transport.publish(i.to_string()).unwrap())
            .collect();

        for handle in &handles {
            transport.ack(handle).await.unwrap();
        }

        let acked = transport.acked();
        assert_eq!(acked.len(), ACK_HISTORY);
        assert_eq!(acked.first(), Some(&handles[5]));
        assert_eq!(acked.last(), handles.last());
        assert!(transport.unacked().is_empty());
    }

    #[tokio::test]
    async fn test_close_ends_stream_after_queue() {
        let transport = MemoryTransport::new();
        let mut messages = transport.subscribe();

        transport.publish("last").unwrap();
        transport.close();
        assert!(transport.publish("rejected").is_err());

        assert_eq!(messages.next().await.unwrap().payload, "last");
        assert!(messages.next().await.is_none());
    }

    #[tokio::test]
    async fn test_waiting_subscriber_is_woken() {
        let transport = MemoryTransport::new();
        let mut messages = transport.subscribe();

        let publisher = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            publisher.publish("late").unwrap();
        });

        let message = tokio::time::timeout(std::time::Duration::from_secs(5), messages.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.payload, "late");
    }
}
