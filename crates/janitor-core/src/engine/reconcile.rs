//! One reconciliation run as a step function
//!
//! [`Reconciler::reconcile`] takes a message through parse → fetch actual →
//! diff against desired → publish and returns a [`ReconcileOutcome`]. It never
//! acknowledges anything itself; the caller decides from the outcome tag.

use std::sync::Arc;

use tracing::{debug, info};

use crate::diff::{compute_correction, exclude, Correction};
use crate::error::{Error, Result};
use crate::message::{ChangeMessage, ChangeRequest};
use crate::record::{ActualState, DesiredState, RecordSetMap, RecordType, ResourceRecordSet};
use crate::traits::{CorrectionPublisher, DesiredStateSource, DnsProvider, PublishedCorrection};

/// Result of one reconciliation run
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The correction (possibly empty) was published
    Completed(PublishedCorrection),
    /// Failed in a way a later delivery may fix; leave unacknowledged
    Retryable(Error),
    /// Failed for good; acknowledge anyway and report
    Permanent(Error),
}

impl ReconcileOutcome {
    /// Classify a failure by [`Error::is_retryable`]
    pub fn from_error(err: Error) -> Self {
        if err.is_retryable() {
            ReconcileOutcome::Retryable(err)
        } else {
            ReconcileOutcome::Permanent(err)
        }
    }

    /// Whether the inbound message should be acknowledged
    pub fn should_ack(&self) -> bool {
        !matches!(self, ReconcileOutcome::Retryable(_))
    }

    /// The failure, if any
    pub fn error(&self) -> Option<&Error> {
        match self {
            ReconcileOutcome::Completed(_) => None,
            ReconcileOutcome::Retryable(err) | ReconcileOutcome::Permanent(err) => Some(err),
        }
    }
}

/// Fetches, diffs and publishes for a single change request
///
/// Holds no mutable state: actual state is fetched fresh on every run and
/// dropped once the correction is computed, so runs for different messages
/// are independent.
#[derive(Clone)]
pub struct Reconciler {
    provider: Arc<dyn DnsProvider>,
    desired: Arc<dyn DesiredStateSource>,
    publisher: Arc<dyn CorrectionPublisher>,
    ignored_record_types: Vec<RecordType>,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        desired: Arc<dyn DesiredStateSource>,
        publisher: Arc<dyn CorrectionPublisher>,
    ) -> Self {
        Self {
            provider,
            desired,
            publisher,
            ignored_record_types: Vec::new(),
        }
    }

    /// Exclude these record types from both sides of every diff
    pub fn with_ignored_record_types(mut self, types: Vec<RecordType>) -> Self {
        self.ignored_record_types = types;
        self
    }

    /// Run a message through every step and tag the result
    pub async fn reconcile(&self, message: &ChangeMessage) -> ReconcileOutcome {
        let request = match message.parse() {
            Ok(request) => request,
            Err(err) => return ReconcileOutcome::from_error(err),
        };

        match self.run(&request).await {
            Ok(correction) => ReconcileOutcome::Completed(PublishedCorrection { request, correction }),
            Err(err) => ReconcileOutcome::from_error(err),
        }
    }

    /// Fetch, diff and publish for an already parsed request
    pub async fn run(&self, request: &ChangeRequest) -> Result<Correction> {
        let actual = self.fetch_actual(request).await?;
        let desired = self.fetch_desired(request).await?;

        let correction = compute_correction(&desired, &actual);
        if correction.is_empty() {
            debug!("{}: in sync ({} record set(s))", request, desired.len());
        } else {
            info!(
                "{}: {} addition(s), {} deletion(s)",
                request,
                correction.additions.len(),
                correction.deletions.len()
            );
        }

        self.publisher.publish(request, &correction).await?;
        Ok(correction)
    }

    async fn fetch_actual(&self, request: &ChangeRequest) -> Result<ActualState> {
        let records = self.provider.fetch_records(request).await?;
        debug!(
            "{}: {} returned {} record set(s)",
            request,
            self.provider.provider_name(),
            records.len()
        );

        let in_scope = records.into_iter().filter(|record| self.in_scope(request, record));
        RecordSetMap::from_records(in_scope)
    }

    async fn fetch_desired(&self, request: &ChangeRequest) -> Result<DesiredState> {
        let desired = self.desired.desired_state(request).await?;
        Ok(exclude(desired, |record| !self.in_scope(request, record)))
    }

    fn in_scope(&self, request: &ChangeRequest, record: &ResourceRecordSet) -> bool {
        request.covers(record) && !self.ignored_record_types.contains(&record.record_type)
    }
}
