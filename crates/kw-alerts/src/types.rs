//! Problem records tracked across poll cycles.
//!
//! - [`DedupKey`]: identifies a record, one per (resource, problem kind)
//! - [`ProblemRecord`]: the per-key counters and report state

use chrono::{DateTime, Duration, Utc};
use kw_observe::{Detection, ProblemKind, ResourceIdentity};
use serde::{Deserialize, Serialize};

/// Stable key of a problem record: the resource plus the problem kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    /// The affected resource.
    pub identity: ResourceIdentity,
    /// The problem kind.
    pub kind: ProblemKind,
}

impl DedupKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(identity: ResourceIdentity, kind: ProblemKind) -> Self {
        Self { identity, kind }
    }

    /// The key a detection maps to.
    #[must_use]
    pub fn of(detection: &Detection) -> Self {
        Self::new(detection.identity.clone(), detection.kind)
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.identity, self.kind)
    }
}

/// A tracked problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemRecord {
    /// The record's key.
    pub key: DedupKey,
    /// Latest detection message.
    pub message: String,
    /// Cycles the problem was detected since the record was created.
    pub occurrences: u32,
    /// Consecutive cycles since the problem was last detected.
    pub resolutions: u32,
    /// Whether a report message has been sent.
    pub reported: bool,
    /// When the problem was first detected.
    pub first_observed: DateTime<Utc>,
    /// When the problem was last detected.
    pub last_observed: DateTime<Utc>,
}

impl ProblemRecord {
    /// Creates a record for a first detection. Counters start at zero;
    /// [`observe`](Self::observe) counts the detection itself.
    #[must_use]
    pub fn new(detection: &Detection, now: DateTime<Utc>) -> Self {
        Self {
            key: DedupKey::of(detection),
            message: detection.message.clone(),
            occurrences: 0,
            resolutions: 0,
            reported: false,
            first_observed: now,
            last_observed: now,
        }
    }

    /// The affected resource.
    #[must_use]
    pub const fn identity(&self) -> &ResourceIdentity {
        &self.key.identity
    }

    /// The problem kind.
    #[must_use]
    pub const fn kind(&self) -> ProblemKind {
        self.key.kind
    }

    /// Counts a detection.
    pub fn observe(&mut self, message: &str, now: DateTime<Utc>) {
        self.occurrences = self.occurrences.saturating_add(1);
        self.resolutions = 0;
        message.clone_into(&mut self.message);
        self.last_observed = now;
    }

    /// Counts a clean cycle.
    pub fn mark_absent(&mut self) {
        self.resolutions = self.resolutions.saturating_add(1);
    }

    /// True once the report threshold is reached and nothing has been sent yet.
    #[must_use]
    pub const fn report_due(&self) -> bool {
        !self.reported && self.occurrences >= self.kind().report_threshold()
    }

    /// True once the resolve threshold is reached.
    #[must_use]
    pub const fn resolve_due(&self) -> bool {
        self.resolutions >= self.kind().resolve_threshold()
    }

    /// True if the problem has not been seen within `window` of `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.last_observed) > window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn pressure() -> Detection {
        Detection::new(
            ResourceIdentity::node("worker-1"),
            ProblemKind::NodeResourcePressure,
            "cpu",
        )
    }

    #[test]
    fn key_combines_identity_and_kind() {
        let a = DedupKey::of(&pressure());
        let b = DedupKey::new(ResourceIdentity::node("worker-1"), ProblemKind::NodeCondition);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "Node worker-1/NodeResourcePressure");
    }

    #[test]
    fn new_record_is_unreported() {
        let record = ProblemRecord::new(&pressure(), t0());
        assert_eq!(record.occurrences, 0);
        assert!(!record.reported);
        assert!(!record.report_due());
    }

    #[test]
    fn observe_resets_resolutions() {
        let mut record = ProblemRecord::new(&pressure(), t0());
        record.observe("cpu", t0());
        record.mark_absent();
        record.mark_absent();
        assert_eq!(record.resolutions, 2);

        record.observe("memory", t0() + Duration::seconds(10));
        assert_eq!(record.resolutions, 0);
        assert_eq!(record.occurrences, 2);
        assert_eq!(record.message, "memory");
        assert_eq!(record.last_observed, t0() + Duration::seconds(10));
    }

    #[test]
    fn report_due_respects_threshold() {
        let mut record = ProblemRecord::new(&pressure(), t0());
        for _ in 0..9 {
            record.observe("cpu", t0());
        }
        assert!(!record.report_due());
        record.observe("cpu", t0());
        assert!(record.report_due());

        record.reported = true;
        record.observe("cpu", t0());
        assert!(!record.report_due());
    }

    #[test]
    fn resolve_due_respects_threshold() {
        let mut record = ProblemRecord::new(&pressure(), t0());
        for _ in 0..4 {
            record.mark_absent();
        }
        assert!(!record.resolve_due());
        record.mark_absent();
        assert!(record.resolve_due());
    }

    #[test]
    fn staleness() {
        let record = ProblemRecord::new(&pressure(), t0());
        let window = Duration::minutes(30);
        assert!(!record.is_stale(t0() + Duration::minutes(30), window));
        assert!(record.is_stale(t0() + Duration::minutes(31), window));
    }
}
