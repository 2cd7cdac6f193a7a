//! Inbound change messages
//!
//! The transport delivers opaque payloads with a delivery handle. The engine
//! parses the payload into a [`ChangeRequest`] as the first step of a run.
//!
//! ## Wire Format
//!
//! ```json
//! {"zone": "example-zone", "name": "api.example.com."}
//! {"zone": "example-zone", "all": true}
//! ```

use crate::error::{Error, Result};
use crate::record::{normalize_name, ResourceRecordSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-specific token used to acknowledge one delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryHandle(pub String);

impl DeliveryHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMessage {
    /// Raw message body
    pub payload: String,
    /// Handle for acknowledging this delivery
    pub handle: DeliveryHandle,
}

impl ChangeMessage {
    pub fn new(payload: impl Into<String>, handle: DeliveryHandle) -> Self {
        Self {
            payload: payload.into(),
            handle,
        }
    }

    /// Parse the payload into a reconciliation request
    pub fn parse(&self) -> Result<ChangeRequest> {
        ChangeRequest::from_json(&self.payload)
    }
}

/// What a reconciliation run covers within a zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileTarget {
    /// Every record set with this name (all types)
    Record(String),
    /// The full listing of the zone
    All,
}

/// A parsed reconciliation request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Provider managed-zone identifier
    pub zone: String,
    /// Scope within the zone
    pub target: ReconcileTarget,
}

#[derive(Debug, Deserialize)]
struct RawChangeRequest {
    zone: Option<String>,
    name: Option<String>,
    #[serde(default)]
    all: bool,
}

impl ChangeRequest {
    /// Request reconciliation of a single name
    pub fn record(zone: impl Into<String>, name: &str) -> Result<Self> {
        Ok(Self {
            zone: zone.into(),
            target: ReconcileTarget::Record(normalize_name(name)?),
        })
    }

    /// Request reconciliation of the whole zone
    pub fn all(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            target: ReconcileTarget::All,
        }
    }

    /// Parse the JSON wire format
    ///
    /// Exactly one of `name` or `"all": true` must be given.
    pub fn from_json(payload: &str) -> Result<Self> {
        let raw: RawChangeRequest = serde_json::from_str(payload)
            .map_err(|e| Error::malformed(format!("unparseable change message: {}", e)))?;

        let zone = raw
            .zone
            .filter(|z| !z.trim().is_empty())
            .ok_or_else(|| Error::malformed("change message has no zone"))?;

        match (raw.name, raw.all) {
            (Some(name), false) => Self::record(zone, &name),
            (None, true) => Ok(Self::all(zone)),
            (Some(_), true) => Err(Error::malformed(
                "change message names a record and requests a full listing",
            )),
            (None, false) => Err(Error::malformed(
                "change message has neither a record name nor \"all\"",
            )),
        }
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> String {
        let value = match &self.target {
            ReconcileTarget::Record(name) => serde_json::json!({"zone": self.zone, "name": name}),
            ReconcileTarget::All => serde_json::json!({"zone": self.zone, "all": true}),
        };
        value.to_string()
    }

    /// Whether a record set falls inside this request's scope
    pub fn covers(&self, record: &ResourceRecordSet) -> bool {
        match &self.target {
            ReconcileTarget::Record(name) => &record.name == name,
            ReconcileTarget::All => true,
        }
    }
}

impl fmt::Display for ChangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            ReconcileTarget::Record(name) => write!(f, "[{}] {}", self.zone, name),
            ReconcileTarget::All => write!(f, "[{}] *", self.zone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_record() {
        let request = ChangeRequest::from_json(r#"{"zone": "prod", "name": "API.example.com"}"#).unwrap();
        assert_eq!(request.zone, "prod");
        assert_eq!(request.target, ReconcileTarget::Record("api.example.com.".into()));
    }

    #[test]
    fn test_parse_reconcile_all() {
        let request = ChangeRequest::from_json(r#"{"zone": "prod", "all": true}"#).unwrap();
        assert_eq!(request, ChangeRequest::all("prod"));
    }

    #[test]
    fn test_wire_format_round_trips() {
        let request = ChangeRequest::record("prod", "www.example.com.").unwrap();
        assert_eq!(ChangeRequest::from_json(&request.to_json()).unwrap(), request);
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        for payload in [
            "not json",
            r#"{"name": "x.example.com."}"#,
            r#"{"zone": "", "all": true}"#,
            r#"{"zone": "prod"}"#,
            r#"{"zone": "prod", "name": "x.example.com.", "all": true}"#,
            r#"{"zone": "prod", "name": ""}"#,
        ] {
            let result = ChangeRequest::from_json(payload);
            assert!(
                matches!(result, Err(Error::MalformedState(_))),
                "expected {} to be malformed, got {:?}",
                payload,
                result
            );
        }
    }
}
