//! Core reconciliation engine
//!
//! The ReconcileEngine is responsible for:
//! - Pulling change messages from a ChangeTransport
//! - Running each through the Reconciler on a bounded worker pool
//! - Acknowledging, or leaving for redelivery, based on the outcome
//! - Draining in-flight work within a bounded time on shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ ChangeTransport │─── ChangeMessage ───┐
//! └─────────────────┘                     │
//!         ▲                               ▼
//!         │ ack                  ┌─────────────────┐
//!         └──────────────────────│ ReconcileEngine │── EngineEvent ──▶
//!                                └─────────────────┘
//!                                         │ (worker pool)
//!         ┌───────────────────────────────┼───────────────────────────┐
//!         ▼                               ▼                           ▼
//! ┌─────────────┐              ┌────────────────────┐      ┌─────────────────────┐
//! │ DnsProvider │              │ DesiredStateSource │      │ CorrectionPublisher │
//! │ (actual)    │              │ (desired)          │      │ (publish)           │
//! └─────────────┘              └────────────────────┘      └─────────────────────┘
//! ```
//!
//! ## Message Flow
//!
//! 1. Message received, parsed into a ChangeRequest
//! 2. Actual state fetched fresh from the DnsProvider
//! 3. Desired state read and diffed against it
//! 4. Correction published (including empty ones)
//! 5. Message acknowledged, unless the failure is retryable

mod drain;
mod reconcile;

pub use drain::{DrainController, DrainReport};
pub use reconcile::{ReconcileOutcome, Reconciler};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::message::{ChangeMessage, ChangeRequest, DeliveryHandle};
use crate::traits::{
    ChangeTransport, CorrectionPublisher, DesiredStateSource, DnsProvider, ErrorReporter,
    TracingErrorReporter,
};

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started pulling messages
    Started {
        worker_limit: usize,
    },

    /// A message was handed to a worker
    MessageReceived {
        handle: DeliveryHandle,
    },

    /// A non-empty correction was published
    CorrectionPublished {
        request: ChangeRequest,
        additions: usize,
        deletions: usize,
    },

    /// The request was already in sync (empty correction published)
    NoChanges {
        request: ChangeRequest,
    },

    /// Reconciliation failed
    ReconcileFailed {
        handle: DeliveryHandle,
        error: String,
        retryable: bool,
    },

    /// The message was acknowledged to the transport
    Acknowledged {
        handle: DeliveryHandle,
    },

    /// Engine stopped
    Stopped {
        completed: usize,
        cancelled: usize,
    },
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileEngine::new()`]
/// 2. Start with [`ReconcileEngine::start()`], which returns a [`DrainController`]
/// 3. Stop with [`DrainController::shutdown()`] or let the transport close
///
/// ## Concurrency
///
/// At most `worker_limit` messages are in flight. The engine only pulls the
/// next message once a worker slot is free, so a slow provider applies
/// backpressure to the transport instead of buffering messages.
///
/// ## Load Resistance
///
/// - **Bounded event channel**: Prevents unbounded memory growth
/// - **Event dropping**: When the channel is full, new events are dropped (logged)
#[derive(Clone)]
pub struct ReconcileEngine {
    /// Step function run for every message
    reconciler: Reconciler,

    /// Out-of-band failure reporting
    reporter: Arc<dyn ErrorReporter>,

    /// Maximum concurrently processed messages
    worker_limit: usize,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new reconciliation engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        desired: Arc<dyn DesiredStateSource>,
        publisher: Arc<dyn CorrectionPublisher>,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let reconciler = Reconciler::new(provider, desired, publisher)
            .with_ignored_record_types(config.ignored_record_types.clone());

        let engine = Self {
            reconciler,
            reporter: Arc::new(TracingErrorReporter),
            worker_limit: config.worker_limit,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Replace the default tracing-based error reporter
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Start pulling messages from `transport` on a background task
    pub fn start(self, transport: Arc<dyn ChangeTransport>) -> DrainController {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(self.run(transport, stop_rx));
        DrainController::new(stop_tx, handle)
    }

    /// Process one message end to end and settle it with the transport
    ///
    /// Returns `true` if the message was acknowledged.
    pub async fn handle_message(
        &self,
        transport: &dyn ChangeTransport,
        message: ChangeMessage,
    ) -> bool {
        self.emit_event(EngineEvent::MessageReceived {
            handle: message.handle.clone(),
        });

        // Panics become retryable failures; the message stays unacknowledged
        let outcome = match AssertUnwindSafe(self.reconciler.reconcile(&message))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!("Reconciliation of {} panicked: {}", message.handle, reason);
                ReconcileOutcome::Retryable(Error::Other(format!(
                    "reconciliation panicked: {}",
                    reason
                )))
            }
        };

        match &outcome {
            ReconcileOutcome::Completed(published) if published.correction.is_empty() => {
                self.emit_event(EngineEvent::NoChanges {
                    request: published.request.clone(),
                });
            }
            ReconcileOutcome::Completed(published) => {
                self.emit_event(EngineEvent::CorrectionPublished {
                    request: published.request.clone(),
                    additions: published.correction.additions.len(),
                    deletions: published.correction.deletions.len(),
                });
            }
            ReconcileOutcome::Retryable(err) | ReconcileOutcome::Permanent(err) => {
                let acknowledged = outcome.should_ack();
                self.reporter.report(&message, err, acknowledged);
                self.emit_event(EngineEvent::ReconcileFailed {
                    handle: message.handle.clone(),
                    error: err.to_string(),
                    retryable: !acknowledged,
                });
            }
        }

        if !outcome.should_ack() {
            return false;
        }

        match transport.ack(&message.handle).await {
            Ok(()) => {
                debug!("Acknowledged {}", message.handle);
                self.emit_event(EngineEvent::Acknowledged {
                    handle: message.handle,
                });
                true
            }
            Err(e) => {
                warn!("Failed to acknowledge {}: {}", message.handle, e);
                self.reporter.report(&message, &e, false);
                self.emit_event(EngineEvent::ReconcileFailed {
                    handle: message.handle,
                    error: e.to_string(),
                    retryable: true,
                });
                false
            }
        }
    }

    /// Main loop: pull while a worker slot is free, then drain
    async fn run(
        self,
        transport: Arc<dyn ChangeTransport>,
        stop_rx: oneshot::Receiver<Duration>,
    ) -> DrainReport {
        self.emit_event(EngineEvent::Started {
            worker_limit: self.worker_limit,
        });
        info!("Engine started with {} worker(s)", self.worker_limit);

        let mut stop_rx = Some(stop_rx);
        let semaphore = Arc::new(Semaphore::new(self.worker_limit));
        let mut messages = transport.subscribe();
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut report = DrainReport::default();
        let mut transport_open = true;

        let drain_timeout = loop {
            while let Some(result) = tasks.try_join_next() {
                record_join(result, &mut report);
            }

            if !transport_open {
                tokio::select! {
                    biased;
                    Some(timeout) = stop_requested(&mut stop_rx) => break Some(timeout),
                    _ = join_all(&mut tasks, &mut report) => break None,
                }
            }

            let permit = tokio::select! {
                biased;
                Some(timeout) = stop_requested(&mut stop_rx) => break Some(timeout),
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break None,
                },
            };

            let message = tokio::select! {
                biased;
                Some(timeout) = stop_requested(&mut stop_rx) => break Some(timeout),
                message = messages.next() => message,
            };

            let Some(message) = message else {
                info!("Transport closed, finishing {} in-flight message(s)", tasks.len());
                transport_open = false;
                continue;
            };

            let engine = self.clone();
            let transport = transport.clone();
            tasks.spawn(async move {
                let _permit = permit;
                engine.handle_message(transport.as_ref(), message).await;
            });
        };

        // Stop pulling before waiting on anything
        drop(messages);

        if let Some(timeout) = drain_timeout {
            info!(
                "Shutdown requested, draining {} in-flight message(s) for up to {:?}",
                tasks.len(),
                timeout
            );

            if tokio::time::timeout(timeout, join_all(&mut tasks, &mut report))
                .await
                .is_err()
            {
                warn!(
                    "Drain timeout elapsed, cancelling {} message(s); they stay unacknowledged",
                    tasks.len()
                );
                tasks.abort_all();
                join_all(&mut tasks, &mut report).await;
            }
        }

        info!(
            "Engine stopped: {} completed, {} cancelled, {} panicked",
            report.completed, report.cancelled, report.panicked
        );
        self.emit_event(EngineEvent::Stopped {
            completed: report.completed,
            cancelled: report.cancelled,
        });

        report
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// Resolves with the drain timeout once shutdown is requested
///
/// Resolves with `None` once if the controller was dropped; after that it
/// never resolves.
async fn stop_requested(stop_rx: &mut Option<oneshot::Receiver<Duration>>) -> Option<Duration> {
    let result = match stop_rx.as_mut() {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    };

    match result {
        Ok(timeout) => Some(timeout),
        Err(_) => {
            debug!("Drain controller dropped, engine runs until the transport closes");
            *stop_rx = None;
            None
        }
    }
}

async fn join_all(tasks: &mut JoinSet<()>, report: &mut DrainReport) {
    while let Some(result) = tasks.join_next().await {
        record_join(result, report);
    }
}

fn record_join(result: std::result::Result<(), JoinError>, report: &mut DrainReport) {
    match result {
        Ok(()) => report.completed += 1,
        Err(e) if e.is_cancelled() => report.cancelled += 1,
        Err(e) => {
            error!("Reconciliation task panicked: {}", e);
            report.panicked += 1;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
