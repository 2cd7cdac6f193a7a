// # File Desired State Source
//
// File-based implementation of DesiredStateSource.
//
// ## Purpose
//
// Lets the source of truth live in a plain JSON file maintained by another
// process (a config-management run, a CI job). The janitor only ever reads it.
//
// ## Consistency
//
// - The file is re-read on every reconciliation run, so edits are picked up
//   without a restart
// - One run sees exactly one parse of the file (a read-only snapshot)
// - Writers should replace the file atomically (write-then-rename)
//
// ## File Format
//
// ```json
// {
//   "prod-zone": [
//     {"name": "api.example.com.", "type": "A", "ttl": 300, "rrdatas": ["1.2.3.4"]},
//     {"name": "www.example.com.", "type": "CNAME", "rrdatas": ["api.example.com."]}
//   ]
// }
// ```
//
// `ttl` defaults to 300 when omitted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::message::ChangeRequest;
use crate::record::{DesiredState, RecordSetMap, ResourceRecordSet};
use crate::traits::DesiredStateSource;
use crate::Error;

/// File-based desired state source
///
/// # Missing Zones
///
/// A zone that is absent from the file is reported as malformed rather than
/// treated as empty: an empty desired state deletes every record in the
/// zone. To really empty a zone, list it with `[]`.
///
/// # Example
///
/// ```rust,no_run
/// use janitor_core::{ChangeRequest, DesiredStateSource, FileDesiredStateSource};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let source = FileDesiredStateSource::new("/etc/janitor/desired.json");
///
///     let request = ChangeRequest::all("prod-zone");
///     let desired = source.desired_state(&request).await?;
///     println!("{} record set(s) wanted", desired.len());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileDesiredStateSource {
    path: PathBuf,
}

impl FileDesiredStateSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the whole file
    ///
    /// I/O failures stay retryable (the file may be mid-replacement); content
    /// that does not parse is malformed.
    pub async fn load(&self) -> Result<HashMap<String, DesiredState>, Error> {
        let content = fs::read_to_string(&self.path).await?;

        let zones: HashMap<String, Vec<serde_json::Value>> = serde_json::from_str(&content)
            .map_err(|e| {
                Error::malformed(format!(
                    "Failed to parse desired state file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        let mut desired = HashMap::with_capacity(zones.len());
        for (zone, entries) in zones {
            let records = entries
                .into_iter()
                .map(|entry| {
                    serde_json::from_value::<ResourceRecordSet>(entry).map_err(|e| {
                        Error::malformed(format!(
                            "Invalid record set in zone {} of {}: {}",
                            zone,
                            self.path.display(),
                            e
                        ))
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;

            let state = RecordSetMap::from_records(records)?;
            desired.insert(zone, state);
        }

        tracing::trace!(
            "Loaded desired state from {}: {} zone(s)",
            self.path.display(),
            desired.len()
        );
        Ok(desired)
    }
}

#[async_trait]
impl DesiredStateSource for FileDesiredStateSource {
    async fn desired_state(&self, request: &ChangeRequest) -> Result<DesiredState, Error> {
        let mut zones = self.load().await?;
        zones.remove(&request.zone).ok_or_else(|| {
            Error::malformed(format!(
                "Zone {} is not listed in desired state file {}",
                request.zone,
                self.path.display()
            ))
        })
    }
}
