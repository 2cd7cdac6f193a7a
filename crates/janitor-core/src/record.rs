//! DNS resource record sets and keyed snapshots of them
//!
//! A [`ResourceRecordSet`] is identified by its [`RecordKey`] (name, type).
//! Two record sets are equal when key, TTL and the *set* of rrdatas match;
//! rrdata order is irrelevant.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// TTL applied when a desired entry omits one
pub const DEFAULT_TTL: u32 = 300;

/// DNS record type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordType {
    A,
    Aaaa,
    Caa,
    Cname,
    Ds,
    Mx,
    Naptr,
    Ns,
    Ptr,
    Soa,
    Spf,
    Srv,
    Sshfp,
    Txt,
    /// Any type the provider supports that is not listed above
    Other(String),
}

impl RecordType {
    /// Canonical upper-case mnemonic
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Caa => "CAA",
            RecordType::Cname => "CNAME",
            RecordType::Ds => "DS",
            RecordType::Mx => "MX",
            RecordType::Naptr => "NAPTR",
            RecordType::Ns => "NS",
            RecordType::Ptr => "PTR",
            RecordType::Soa => "SOA",
            RecordType::Spf => "SPF",
            RecordType::Srv => "SRV",
            RecordType::Sshfp => "SSHFP",
            RecordType::Txt => "TXT",
            RecordType::Other(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.is_empty() || !upper.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::malformed(format!("invalid record type: {:?}", s)));
        }

        Ok(match upper.as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "CAA" => RecordType::Caa,
            "CNAME" => RecordType::Cname,
            "DS" => RecordType::Ds,
            "MX" => RecordType::Mx,
            "NAPTR" => RecordType::Naptr,
            "NS" => RecordType::Ns,
            "PTR" => RecordType::Ptr,
            "SOA" => RecordType::Soa,
            "SPF" => RecordType::Spf,
            "SRV" => RecordType::Srv,
            "SSHFP" => RecordType::Sshfp,
            "TXT" => RecordType::Txt,
            _ => RecordType::Other(upper),
        })
    }
}

impl TryFrom<String> for RecordType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.as_str().to_string()
    }
}

/// Normalize a DNS name: trimmed, lower-case, with exactly one trailing dot
pub fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(Error::malformed(format!("invalid record name: {:?}", name)));
    }
    if trimmed.len() > 253 || trimmed.split('.').any(|label| label.is_empty() || label.len() > 63) {
        return Err(Error::malformed(format!("invalid record name: {:?}", name)));
    }

    Ok(format!("{}.", trimmed.to_ascii_lowercase()))
}

/// Identity of a record set within a zone
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// Fully-qualified, trailing-dot normalized name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.record_type)
    }
}

/// Wire shape of a record set before validation
#[derive(Debug, Deserialize)]
struct RawRecordSet {
    name: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    ttl: Option<i64>,
    rrdatas: Option<Vec<String>>,
}

/// A DNS resource record set
///
/// Construct with [`ResourceRecordSet::new`] (validating) or deserialize from
/// the provider's JSON shape `{name, type, ttl, rrdatas}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRecordSet")]
pub struct ResourceRecordSet {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub ttl: u32,
    pub rrdatas: Vec<String>,
}

impl ResourceRecordSet {
    /// Create a validated record set
    ///
    /// The name is normalized; an empty rrdata list is rejected.
    pub fn new(
        name: &str,
        record_type: RecordType,
        ttl: u32,
        rrdatas: Vec<String>,
    ) -> Result<Self> {
        let name = normalize_name(name)?;
        if rrdatas.is_empty() {
            return Err(Error::malformed(format!(
                "record set {} {} has no rrdatas",
                name, record_type
            )));
        }
        if rrdatas.iter().any(|data| data.trim().is_empty()) {
            return Err(Error::malformed(format!(
                "record set {} {} has an empty rrdata",
                name, record_type
            )));
        }

        Ok(Self {
            name,
            record_type,
            ttl,
            rrdatas,
        })
    }

    /// Identity key (name, type)
    pub fn key(&self) -> RecordKey {
        RecordKey {
            name: self.name.clone(),
            record_type: self.record_type.clone(),
        }
    }

    fn rrdata_set(&self) -> BTreeSet<&str> {
        self.rrdatas.iter().map(String::as_str).collect()
    }
}

impl TryFrom<RawRecordSet> for ResourceRecordSet {
    type Error = Error;

    fn try_from(raw: RawRecordSet) -> Result<Self> {
        let name = raw
            .name
            .ok_or_else(|| Error::malformed("record set is missing \"name\""))?;
        let record_type: RecordType = raw
            .record_type
            .ok_or_else(|| Error::malformed(format!("record set {} is missing \"type\"", name)))?
            .parse()?;
        let ttl = match raw.ttl {
            None => DEFAULT_TTL,
            Some(ttl) => u32::try_from(ttl).map_err(|_| {
                Error::malformed(format!("record set {} has invalid ttl {}", name, ttl))
            })?,
        };
        let rrdatas = raw
            .rrdatas
            .ok_or_else(|| Error::malformed(format!("record set {} is missing \"rrdatas\"", name)))?;

        Self::new(&name, record_type, ttl, rrdatas)
    }
}

impl PartialEq for ResourceRecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.record_type == other.record_type
            && self.ttl == other.ttl
            && self.rrdata_set() == other.rrdata_set()
    }
}

impl Eq for ResourceRecordSet {}

impl fmt::Display for ResourceRecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.name,
            self.ttl,
            self.record_type,
            self.rrdatas.join(", ")
        )
    }
}

/// Record sets keyed by identity, as one point-in-time snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSetMap {
    records: BTreeMap<RecordKey, ResourceRecordSet>,
}

/// Snapshot supplied by the source of truth for one reconciliation run
pub type DesiredState = RecordSetMap;

/// Snapshot fetched from the provider for one reconciliation run
pub type ActualState = RecordSetMap;

impl RecordSetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot, rejecting duplicate identity keys
    pub fn from_records(records: impl IntoIterator<Item = ResourceRecordSet>) -> Result<Self> {
        let mut map = Self::new();
        for record in records {
            map.insert(record)?;
        }
        Ok(map)
    }

    /// Insert a record set; a second entry for the same key is malformed
    pub fn insert(&mut self, record: ResourceRecordSet) -> Result<()> {
        let key = record.key();
        if self.records.contains_key(&key) {
            return Err(Error::malformed(format!("duplicate record set for {}", key)));
        }
        self.records.insert(key, record);
        Ok(())
    }

    pub fn get(&self, key: &RecordKey) -> Option<&ResourceRecordSet> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn remove(&mut self, key: &RecordKey) -> Option<ResourceRecordSet> {
        self.records.remove(key)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&ResourceRecordSet) -> bool) {
        self.records.retain(|_, record| keep(record));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate in identity-key order
    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &ResourceRecordSet)> {
        self.records.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &ResourceRecordSet> {
        self.records.values()
    }
}
