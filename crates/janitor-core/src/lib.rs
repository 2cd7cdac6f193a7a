// # janitor-core
//
// Core library for the DNS janitor: reconciles a source-of-truth record set
// against the records published in a DNS provider.
//
// ## Architecture Overview
//
// - **ChangeTransport**: Trait for receiving and acknowledging change messages
// - **DnsProvider**: Trait for fetching the records actually published
// - **DesiredStateSource**: Trait for reading the source of truth
// - **CorrectionPublisher**: Trait for emitting computed corrections
// - **ReconcileEngine**: Worker pool that drives messages through the Reconciler
// - **DrainController**: Bounded-time shutdown of a running engine
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from provider APIs
// 2. **Explicit Outcomes**: Each run yields completed, retryable or permanent
// 3. **At-Least-Once**: Acknowledge only after publishing; diffing is idempotent
// 4. **No Shared Cache**: Actual state is fetched fresh per run
// 5. **Bounded Shutdown**: Draining never blocks past its timeout

pub mod config;
pub mod desired;
pub mod diff;
pub mod engine;
pub mod error;
pub mod message;
pub mod publisher;
pub mod record;
pub mod traits;
pub mod transport;

// Re-export core types for convenience
pub use config::{ApiConfig, CredentialsConfig, EngineConfig, JanitorConfig, PublisherConfig};
pub use desired::{FileDesiredStateSource, MemoryDesiredStateSource};
pub use diff::{compute_correction, Correction};
pub use engine::{DrainController, DrainReport, EngineEvent, ReconcileEngine, ReconcileOutcome, Reconciler};
pub use error::{Error, Result};
pub use message::{ChangeMessage, ChangeRequest, DeliveryHandle, ReconcileTarget};
pub use publisher::{ChannelPublisher, LogPublisher};
pub use record::{
    normalize_name, ActualState, DesiredState, RecordKey, RecordSetMap, RecordType,
    ResourceRecordSet, DEFAULT_TTL,
};
pub use traits::{
    ChangeTransport, CorrectionPublisher, DesiredStateSource, DnsProvider, ErrorReporter,
    PublishedCorrection, TracingErrorReporter,
};
pub use transport::MemoryTransport;
