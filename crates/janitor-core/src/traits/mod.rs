//! Collaborator traits for the janitor
//!
//! This module defines the seams between the reconciliation engine and the
//! outside world.
//!
//! - [`DnsProvider`]: Fetch actual record sets from the DNS provider
//! - [`DesiredStateSource`]: Supply desired record sets (source of truth)
//! - [`ChangeTransport`]: Deliver and acknowledge inbound change messages
//! - [`CorrectionPublisher`]: Accept computed corrections
//! - [`ErrorReporter`]: Receive out-of-band failure reports

pub mod dns_provider;
pub mod desired_state;
pub mod change_transport;
pub mod publisher;

pub use dns_provider::DnsProvider;
pub use desired_state::DesiredStateSource;
pub use change_transport::ChangeTransport;
pub use publisher::{CorrectionPublisher, ErrorReporter, PublishedCorrection, TracingErrorReporter};
