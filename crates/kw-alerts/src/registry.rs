//! The keyed store of tracked problems.
//!
//! [`ProblemRegistry`] owns every [`ProblemRecord`] and applies the counter
//! rules. It never talks to a notifier: it only tells the caller when a
//! report or a resolve message is due.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use kw_observe::{Detection, ProblemKind, ResourceIdentity};
use tracing::{debug, info};

use crate::types::{DedupKey, ProblemRecord};

/// How long a record may go without a detection before it is dropped.
#[must_use]
pub fn default_staleness_window() -> Duration {
    Duration::minutes(30)
}

/// What happened to a record when its problem was detected again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// The record's key.
    pub key: DedupKey,
    /// Occurrence counter after this detection.
    pub occurrences: u32,
    /// A report message should be sent now.
    pub report_due: bool,
}

/// Keyed store of problem records.
///
/// At most one record exists per [`DedupKey`].
#[derive(Debug, Clone)]
pub struct ProblemRegistry {
    records: BTreeMap<DedupKey, ProblemRecord>,
    staleness_window: Duration,
}

impl ProblemRegistry {
    /// Creates an empty registry with the default staleness window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_staleness_window(default_staleness_window())
    }

    /// Creates an empty registry with a custom staleness window.
    #[must_use]
    pub const fn with_staleness_window(staleness_window: Duration) -> Self {
        Self {
            records: BTreeMap::new(),
            staleness_window,
        }
    }

    /// Returns the staleness window.
    #[must_use]
    pub const fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Counts a detection, creating the record if needed.
    pub fn observe(&mut self, detection: &Detection, now: DateTime<Utc>) -> Observation {
        let key = DedupKey::of(detection);
        let record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| ProblemRecord::new(detection, now));

        record.observe(&detection.message, now);

        if !record.reported {
            debug!(
                key = %key,
                occurrences = record.occurrences,
                threshold = record.kind().report_threshold(),
                message = %record.message,
                "problem occurred (not reported yet)"
            );
        }

        Observation {
            key,
            occurrences: record.occurrences,
            report_due: record.report_due(),
        }
    }

    /// Flags a record as reported. Returns false if the record is gone.
    pub fn mark_reported(&mut self, key: &DedupKey) -> bool {
        match self.records.get_mut(key) {
            Some(record) => {
                record.reported = true;
                true
            }
            None => false,
        }
    }

    /// Counts a clean cycle for every record of `identity`.
    ///
    /// Records that reach their resolve threshold are removed and returned;
    /// the caller sends a resolve message for those that were reported.
    pub fn record_absence(&mut self, identity: &ResourceIdentity) -> Vec<ProblemRecord> {
        self.record_absence_except(identity, &[])
    }

    /// Like [`record_absence`](Self::record_absence), but leaves records of
    /// the `skipped` kinds untouched. A kind whose check could not run this
    /// cycle is not absent.
    pub fn record_absence_except(
        &mut self,
        identity: &ResourceIdentity,
        skipped: &[ProblemKind],
    ) -> Vec<ProblemRecord> {
        let mut due = Vec::new();

        for (key, record) in self
            .records
            .iter_mut()
            .filter(|(key, _)| &key.identity == identity && !skipped.contains(&key.kind))
        {
            record.mark_absent();
            if record.resolve_due() {
                due.push(key.clone());
            } else if record.reported {
                debug!(
                    key = %key,
                    resolutions = record.resolutions,
                    threshold = record.kind().resolve_threshold(),
                    "problem resolving (not announced yet)"
                );
            }
        }

        due.iter().filter_map(|key| self.records.remove(key)).collect()
    }

    /// Drops records not detected within the staleness window. No resolve
    /// message is due for these: the resource is presumed gone, not fixed.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> Vec<ProblemRecord> {
        let window = self.staleness_window;
        let stale: Vec<DedupKey> = self
            .records
            .iter()
            .filter(|(_, record)| record.is_stale(now, window))
            .map(|(key, _)| key.clone())
            .collect();

        let evicted: Vec<ProblemRecord> = stale
            .iter()
            .filter_map(|key| self.records.remove(key))
            .collect();

        for record in &evicted {
            info!(
                key = %record.key,
                last_observed = %record.last_observed,
                reported = record.reported,
                "evicted stale problem"
            );
        }

        evicted
    }

    /// Gets a record by key.
    #[must_use]
    pub fn get(&self, key: &DedupKey) -> Option<&ProblemRecord> {
        self.records.get(key)
    }

    /// Returns all records of one resource.
    #[must_use]
    pub fn records_for(&self, identity: &ResourceIdentity) -> Vec<&ProblemRecord> {
        self.records
            .values()
            .filter(|r| r.identity() == identity)
            .collect()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ProblemRegistry {
    fn default() -> Self {
        Self::new()
    }
}
