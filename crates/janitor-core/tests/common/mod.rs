//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal test doubles that verify architectural
//! constraints without talking to a real provider.

#![allow(dead_code)]

use janitor_core::error::{Error, Result};
use janitor_core::{
    ChangeMessage, ChangeRequest, Correction, CorrectionPublisher, DnsProvider, DrainController,
    EngineConfig, EngineEvent, ErrorReporter, MemoryDesiredStateSource, MemoryTransport,
    PublishedCorrection, ReconcileEngine, RecordType, ResourceRecordSet,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Build a record set with the default TTL
pub fn rrset(name: &str, record_type: RecordType, rrdatas: &[&str]) -> ResourceRecordSet {
    ResourceRecordSet::new(
        name,
        record_type,
        300,
        rrdatas.iter().map(|s| s.to_string()).collect(),
    )
    .expect("valid record set")
}

/// Failure injected into the next provider call
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Retry budget exhausted on 5xx
    Transient,
    /// Credential refresh rejected
    Auth,
    /// Non-retryable HTTP status
    Rejected(u16),
    /// The provider panics mid-fetch
    Panic,
}

impl Failure {
    fn into_error(self) -> Error {
        match self {
            Failure::Transient => Error::transient(5, "HTTP 503 Service Unavailable"),
            Failure::Auth => Error::auth("invalid_grant"),
            Failure::Rejected(status) => Error::api(status, "rejected"),
            Failure::Panic => panic!("provider bug"),
        }
    }
}

/// A DnsProvider whose zone content the test controls
///
/// Tracks fetch calls and the peak number of concurrent fetches.
#[derive(Default)]
pub struct ScriptedDnsProvider {
    records: Mutex<Vec<ResourceRecordSet>>,
    failures: Mutex<VecDeque<Failure>>,
    delay: Mutex<Duration>,
    fetch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedDnsProvider {
    pub fn new(records: Vec<ResourceRecordSet>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Make every fetch take this long
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Fail the next fetch
    pub fn fail_next(&self, failure: Failure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    /// Apply a correction as the provider's batch change endpoint would
    pub fn apply(&self, correction: &Correction) {
        let mut records = self.records.lock().unwrap();
        records.retain(|record| !correction.deletions.iter().any(|d| d.key() == record.key()));
        records.extend(correction.additions.iter().cloned());
    }

    pub fn records(&self) -> Vec<ResourceRecordSet> {
        self.records.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the fetch is cancelled
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DnsProvider for ScriptedDnsProvider {
    async fn fetch_records(&self, _request: &ChangeRequest) -> Result<Vec<ResourceRecordSet>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(failure) = failure {
            return Err(failure.into_error());
        }
        Ok(self.records.lock().unwrap().clone())
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// A CorrectionPublisher that records everything it is given
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PublishedCorrection>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<PublishedCorrection> {
        self.published.lock().unwrap().clone()
    }

    /// Make every publish fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl CorrectionPublisher for RecordingPublisher {
    async fn publish(&self, request: &ChangeRequest, correction: &Correction) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::publish("downstream unavailable"));
        }
        self.published.lock().unwrap().push(PublishedCorrection {
            request: request.clone(),
            correction: correction.clone(),
        });
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        "recording"
    }
}

/// One call to the error reporter
#[derive(Debug, Clone)]
pub struct Report {
    pub payload: String,
    pub error: String,
    pub acknowledged: bool,
}

/// An ErrorReporter that records reports
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, message: &ChangeMessage, error: &Error, acknowledged: bool) {
        self.reports.lock().unwrap().push(Report {
            payload: message.payload.clone(),
            error: error.to_string(),
            acknowledged,
        });
    }
}

/// Everything an engine under test talks to
pub struct Harness {
    pub provider: Arc<ScriptedDnsProvider>,
    pub desired: MemoryDesiredStateSource,
    pub publisher: Arc<RecordingPublisher>,
    pub reporter: Arc<RecordingReporter>,
    pub transport: MemoryTransport,
}

impl Harness {
    pub fn new(actual: Vec<ResourceRecordSet>) -> Self {
        Self {
            provider: Arc::new(ScriptedDnsProvider::new(actual)),
            desired: MemoryDesiredStateSource::new(),
            publisher: Arc::new(RecordingPublisher::default()),
            reporter: Arc::new(RecordingReporter::default()),
            transport: MemoryTransport::new(),
        }
    }

    /// Set the desired state of zone "prod"
    pub async fn want(&self, records: Vec<ResourceRecordSet>) {
        self.desired.set_zone("prod", records).await.expect("valid desired state");
    }

    pub fn engine(&self, worker_limit: usize) -> (ReconcileEngine, mpsc::Receiver<EngineEvent>) {
        let config = engine_config(worker_limit);
        let (engine, events) = ReconcileEngine::new(
            self.provider.clone(),
            Arc::new(self.desired.clone()),
            self.publisher.clone(),
            &config,
        )
        .expect("engine construction succeeds");
        (engine.with_error_reporter(self.reporter.clone()), events)
    }

    /// Start an engine on the harness transport
    pub fn start(&self, worker_limit: usize) -> (DrainController, mpsc::Receiver<EngineEvent>) {
        let (engine, events) = self.engine(worker_limit);
        (engine.start(Arc::new(self.transport.clone())), events)
    }

    /// Queue a message for zone "prod"
    pub fn send(&self, payload: &str) {
        self.transport.publish(payload).expect("transport open");
    }
}

/// Engine settings for tests: given worker limit, apex types ignored
pub fn engine_config(worker_limit: usize) -> EngineConfig {
    EngineConfig {
        worker_limit,
        drain_timeout_secs: 5,
        event_channel_capacity: 100,
        ignored_record_types: vec![RecordType::Soa, RecordType::Ns],
    }
}

/// Receive events until `count` acknowledgments were seen
///
/// Panics after five seconds.
pub async fn wait_for_acks(events: &mut mpsc::Receiver<EngineEvent>, count: usize) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    let mut acks = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    while acks < count {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("timed out waiting for acknowledgments")
            .expect("event channel closed");
        if matches!(event, EngineEvent::Acknowledged { .. }) {
            acks += 1;
        }
        seen.push(event);
    }
    seen
}

/// Receive events until one matches
///
/// Panics after five seconds.
pub async fn wait_for_event(
    events: &mut mpsc::Receiver<EngineEvent>,
    wanted: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if wanted(&event) {
            return event;
        }
    }
}
