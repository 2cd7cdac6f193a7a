//! Desired-versus-actual diffing
//!
//! ## Rules
//!
//! For every identity key (name, type):
//!
//! | desired | actual | correction |
//! |---------|--------|------------|
//! | present | absent | add desired |
//! | present | present, equal | nothing |
//! | present | present, different rrdatas or ttl | delete actual, add desired |
//! | absent | present | delete actual |
//!
//! A change is always expressed as delete-old + add-new, because the batch
//! change endpoint has no in-place update. This includes TTL-only changes.

use crate::record::{ActualState, DesiredState, RecordSetMap, ResourceRecordSet};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Additions and deletions needed to bring actual state to desired state
///
/// Both lists are ordered by identity key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub additions: Vec<ResourceRecordSet>,
    pub deletions: Vec<ResourceRecordSet>,
}

impl Correction {
    /// `true` if nothing needs to change
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }

    /// Apply this correction to a snapshot, yielding the state the provider
    /// would hold after the batch change succeeded.
    pub fn apply_to(&self, actual: &ActualState) -> Result<ActualState> {
        let mut next = actual.clone();
        for deletion in &self.deletions {
            next.remove(&deletion.key());
        }
        for addition in &self.additions {
            next.insert(addition.clone())?;
        }
        Ok(next)
    }
}

/// Compute the correction that turns `actual` into `desired`
pub fn compute_correction(desired: &DesiredState, actual: &ActualState) -> Correction {
    let mut correction = Correction::default();

    for (key, wanted) in desired.iter() {
        match actual.get(key) {
            None => correction.additions.push(wanted.clone()),
            Some(current) if current != wanted => {
                correction.deletions.push(current.clone());
                correction.additions.push(wanted.clone());
            }
            Some(_) => {}
        }
    }

    for (key, current) in actual.iter() {
        if !desired.contains_key(key) {
            correction.deletions.push(current.clone());
        }
    }

    correction.deletions.sort_by_key(ResourceRecordSet::key);
    correction
}

/// Drop every record set matching `excluded` from a snapshot
pub fn exclude(mut state: RecordSetMap, excluded: impl Fn(&ResourceRecordSet) -> bool) -> RecordSetMap {
    state.retain(|record| !excluded(record));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    fn rrset(name: &str, record_type: RecordType, ttl: u32, rrdatas: &[&str]) -> ResourceRecordSet {
        ResourceRecordSet::new(
            name,
            record_type,
            ttl,
            rrdatas.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    fn state(records: Vec<ResourceRecordSet>) -> RecordSetMap {
        RecordSetMap::from_records(records).unwrap()
    }

    #[test]
    fn test_missing_record_is_added() {
        let desired = state(vec![rrset("api.example.com.", RecordType::A, 300, &["1.2.3.4"])]);
        let actual = state(vec![]);

        let correction = compute_correction(&desired, &actual);

        assert_eq!(
            correction.additions,
            vec![rrset("api.example.com.", RecordType::A, 300, &["1.2.3.4"])]
        );
        assert!(correction.deletions.is_empty());
    }

    #[test]
    fn test_extra_record_is_deleted() {
        let desired = state(vec![]);
        let actual = state(vec![rrset("old.example.com.", RecordType::A, 300, &["5.6.7.8"])]);

        let correction = compute_correction(&desired, &actual);

        assert!(correction.additions.is_empty());
        assert_eq!(
            correction.deletions,
            vec![rrset("old.example.com.", RecordType::A, 300, &["5.6.7.8"])]
        );
    }

    #[test]
    fn test_changed_rrdatas_delete_old_and_add_new() {
        let desired = state(vec![rrset("a-test.example.net.", RecordType::A, 300, &["10.1.2.3"])]);
        let actual = state(vec![rrset("a-test.example.net.", RecordType::A, 300, &["10.4.5.6"])]);

        let correction = compute_correction(&desired, &actual);

        assert_eq!(correction.additions[0].rrdatas, vec!["10.1.2.3"]);
        assert_eq!(correction.deletions[0].rrdatas, vec!["10.4.5.6"]);
    }

    #[test]
    fn test_ttl_only_change_is_delete_and_add() {
        let desired = state(vec![rrset("b.example.net.", RecordType::Cname, 600, &["a.example.net."])]);
        let actual = state(vec![rrset("b.example.net.", RecordType::Cname, 300, &["a.example.net."])]);

        let correction = compute_correction(&desired, &actual);

        assert_eq!(correction.additions.len(), 1);
        assert_eq!(correction.deletions.len(), 1);
        assert_eq!(correction.additions[0].ttl, 600);
        assert_eq!(correction.deletions[0].ttl, 300);
    }

    #[test]
    fn test_identical_states_produce_empty_correction() {
        let records = vec![
            rrset("a.example.net.", RecordType::A, 300, &["10.0.0.1", "10.0.0.2"]),
            rrset("c.example.net.", RecordType::Txt, 300, &["\"OHAI\""]),
        ];
        let desired = state(records.clone());
        let actual = state(vec![
            rrset("a.example.net.", RecordType::A, 300, &["10.0.0.2", "10.0.0.1"]),
            records[1].clone(),
        ]);

        assert!(compute_correction(&desired, &actual).is_empty());
    }

    #[test]
    fn test_same_name_different_type_are_independent() {
        let desired = state(vec![rrset("dual.example.com.", RecordType::Aaaa, 300, &["::1"])]);
        let actual = state(vec![rrset("dual.example.com.", RecordType::A, 300, &["127.0.0.1"])]);

        let correction = compute_correction(&desired, &actual);

        assert_eq!(correction.additions[0].record_type, RecordType::Aaaa);
        assert_eq!(correction.deletions[0].record_type, RecordType::A);
    }

    #[test]
    fn test_applying_correction_converges() {
        let desired = state(vec![
            rrset("keep.example.com.", RecordType::A, 300, &["10.0.0.1"]),
            rrset("change.example.com.", RecordType::A, 60, &["10.0.0.9"]),
            rrset("new.example.com.", RecordType::Txt, 300, &["\"v=1\""]),
        ]);
        let actual = state(vec![
            rrset("keep.example.com.", RecordType::A, 300, &["10.0.0.1"]),
            rrset("change.example.com.", RecordType::A, 300, &["10.0.0.2"]),
            rrset("gone.example.com.", RecordType::Cname, 300, &["keep.example.com."]),
        ]);

        let correction = compute_correction(&desired, &actual);
        let converged = correction.apply_to(&actual).unwrap();

        assert_eq!(converged, desired);
        assert!(compute_correction(&desired, &converged).is_empty());
    }

    #[test]
    fn test_exclude_drops_matching_types() {
        let snapshot = state(vec![
            rrset("example.com.", RecordType::Soa, 21600, &["ns1. admin. 1 21600 3600 259200 300"]),
            rrset("example.com.", RecordType::A, 300, &["10.0.0.1"]),
        ]);

        let filtered = exclude(snapshot, |r| r.record_type == RecordType::Soa);

        assert_eq!(filtered.len(), 1);
    }
}
