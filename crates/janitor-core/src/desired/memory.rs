// # Memory Desired State Source
//
// In-memory implementation of DesiredStateSource.
//
// ## Purpose
//
// Holds desired state per zone in process memory. Useful for embedding the
// engine in a host that already has the source of truth loaded, and for
// tests.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::message::ChangeRequest;
use crate::record::{DesiredState, RecordSetMap, ResourceRecordSet};
use crate::traits::DesiredStateSource;
use crate::Error;

/// In-memory desired state source
///
/// Cloning shares the underlying map. A zone that was never set is
/// malformed rather than empty, so a missing entry cannot delete every record
/// in the zone; set it to an empty list to really empty it.
#[derive(Debug, Clone, Default)]
pub struct MemoryDesiredStateSource {
    inner: Arc<RwLock<HashMap<String, DesiredState>>>,
}

impl MemoryDesiredStateSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the desired record sets of a zone
    pub async fn set_zone(
        &self,
        zone: impl Into<String>,
        records: impl IntoIterator<Item = ResourceRecordSet>,
    ) -> Result<(), Error> {
        let state = RecordSetMap::from_records(records)?;
        self.inner.write().await.insert(zone.into(), state);
        Ok(())
    }

    /// Number of zones held
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl DesiredStateSource for MemoryDesiredStateSource {
    async fn desired_state(&self, request: &ChangeRequest) -> Result<DesiredState, Error> {
        let guard = self.inner.read().await;
        guard.get(&request.zone).cloned().ok_or_else(|| {
            Error::malformed(format!("No desired state for zone {}", request.zone))
        })
    }
}
