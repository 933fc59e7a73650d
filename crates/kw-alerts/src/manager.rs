//! The report/resolve protocol.
//!
//! [`ProblemManager`] owns the [`ProblemRegistry`] and a [`Notifier`]. The
//! reconciler hands it one classification result per resource; the manager
//! updates the counters and sends report or resolve messages when a
//! threshold is crossed.

use chrono::{DateTime, Utc};
use kw_observe::{format_report, format_resolve, Detection, ProblemKind, ResourceIdentity};
use tracing::info;

use crate::channels::Notifier;
use crate::error::Result;
use crate::registry::ProblemRegistry;
use crate::types::ProblemRecord;

/// Produces the opener of an alert message.
pub type GreetingFn = fn() -> &'static str;

/// Counters for one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Resources classified.
    pub resources_checked: usize,
    /// Resources that yielded a detection.
    pub problems_detected: usize,
    /// Report messages sent.
    pub reports_sent: usize,
    /// Resolve messages sent.
    pub resolves_sent: usize,
    /// Records removed after reaching their resolve threshold without ever being reported.
    pub silently_resolved: usize,
    /// Records dropped by the staleness sweep.
    pub stale_evicted: usize,
}

impl CycleSummary {
    /// Adds another summary's counters to this one.
    pub fn merge(&mut self, other: &Self) {
        self.resources_checked += other.resources_checked;
        self.problems_detected += other.problems_detected;
        self.reports_sent += other.reports_sent;
        self.resolves_sent += other.resolves_sent;
        self.silently_resolved += other.silently_resolved;
        self.stale_evicted += other.stale_evicted;
    }
}

/// Applies classification results to the registry and sends notifications.
#[derive(Debug)]
pub struct ProblemManager<N> {
    registry: ProblemRegistry,
    notifier: N,
    greeting: GreetingFn,
}

impl<N: Notifier> ProblemManager<N> {
    /// Creates a manager with an empty registry.
    #[must_use]
    pub fn new(notifier: N) -> Self {
        Self::with_registry(ProblemRegistry::new(), notifier)
    }

    /// Creates a manager around an existing registry.
    #[must_use]
    pub fn with_registry(registry: ProblemRegistry, notifier: N) -> Self {
        Self {
            registry,
            notifier,
            greeting: kw_observe::greeting,
        }
    }

    /// Replaces the greeting source.
    #[must_use]
    pub fn with_greeting(mut self, greeting: GreetingFn) -> Self {
        self.greeting = greeting;
        self
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &ProblemRegistry {
        &self.registry
    }

    /// Returns the notifier.
    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Feeds one resource's classification result into the protocol.
    ///
    /// # Errors
    ///
    /// Returns the notifier's error if a due message cannot be delivered.
    pub async fn handle(
        &mut self,
        identity: &ResourceIdentity,
        detection: Option<Detection>,
        now: DateTime<Utc>,
    ) -> Result<CycleSummary> {
        self.handle_except(identity, detection, now, &[]).await
    }

    /// Like [`handle`](Self::handle) for a resource whose `skipped` checks
    /// did not run this cycle: a clean result leaves records of those kinds
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns the notifier's error if a due message cannot be delivered.
    pub async fn handle_except(
        &mut self,
        identity: &ResourceIdentity,
        detection: Option<Detection>,
        now: DateTime<Utc>,
        skipped: &[ProblemKind],
    ) -> Result<CycleSummary> {
        let mut summary = CycleSummary {
            resources_checked: 1,
            ..CycleSummary::default()
        };

        match detection {
            Some(detection) => {
                summary.problems_detected = 1;
                if self.report(&detection, now).await? {
                    summary.reports_sent = 1;
                }
            }
            None => {
                let (sent, silent) = self.resolve_except(identity, skipped).await?;
                summary.resolves_sent = sent;
                summary.silently_resolved = silent;
            }
        }

        Ok(summary)
    }

    /// Counts a detection and sends the report once the threshold is met.
    ///
    /// Returns true if a report was sent. A record is reported at most once.
    ///
    /// # Errors
    ///
    /// Returns the notifier's error; the record then stays unreported.
    pub async fn report(&mut self, detection: &Detection, now: DateTime<Utc>) -> Result<bool> {
        let observation = self.registry.observe(detection, now);
        if !observation.report_due {
            return Ok(false);
        }

        let message = format_report((self.greeting)(), &detection.identity, &detection.message);
        info!(
            key = %observation.key,
            occurrences = observation.occurrences,
            channel = %self.notifier.name(),
            "sending report message"
        );
        self.notifier.send(&message).await?;
        self.registry.mark_reported(&observation.key);

        Ok(true)
    }

    /// Counts a clean cycle for every record of `identity`.
    ///
    /// Returns `(resolve messages sent, records dropped without a message)`.
    ///
    /// # Errors
    ///
    /// Returns the notifier's error.
    pub async fn resolve(&mut self, identity: &ResourceIdentity) -> Result<(usize, usize)> {
        self.resolve_except(identity, &[]).await
    }

    /// Counts a clean cycle for the records of `identity` whose kind is not
    /// in `skipped`.
    ///
    /// # Errors
    ///
    /// Returns the notifier's error.
    pub async fn resolve_except(
        &mut self,
        identity: &ResourceIdentity,
        skipped: &[ProblemKind],
    ) -> Result<(usize, usize)> {
        let resolved = self.registry.record_absence_except(identity, skipped);
        let mut sent = 0;
        let mut silent = 0;

        for record in resolved {
            if record.reported {
                self.send_resolve(&record).await?;
                sent += 1;
            } else {
                silent += 1;
            }
        }

        Ok((sent, silent))
    }

    async fn send_resolve(&self, record: &ProblemRecord) -> Result<()> {
        let message = format_resolve((self.greeting)(), record.identity());
        info!(
            key = %record.key,
            resolutions = record.resolutions,
            channel = %self.notifier.name(),
            "sending resolve message"
        );
        self.notifier.send(&message).await
    }

    /// Drops records not seen within the staleness window, silently.
    ///
    /// Returns the number of evicted records.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        self.registry.evict_stale(now).len()
    }
}
