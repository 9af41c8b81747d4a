//! # Events emitted during a run.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Cohort events**: workers spawned, present, finished or failed
//! - **Exchange events**: attempts submitted, verdicts issued, messages discarded
//! - **Stage events**: stage opened/completed and run completion
//! - **Runtime events**: shutdown, grace handling, subscriber health
//!
//! The [`Event`] struct carries optional metadata (worker, stage, score, threshold, ...)
//! set depending on the kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use stagevisor::{Event, EventKind, Outcome, WorkerId};
//!
//! let ev = Event::new(EventKind::VerdictIssued)
//!     .with_worker(WorkerId::new(2))
//!     .with_stage(1)
//!     .with_score(17)
//!     .with_threshold(20)
//!     .with_outcome(Outcome::Retry);
//!
//! assert_eq!(ev.kind, EventKind::VerdictIssued);
//! assert_eq!(ev.worker, Some(WorkerId::new(2)));
//! assert_eq!(ev.outcome, Some(Outcome::Retry));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::protocol::{Outcome, WorkerId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of run events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: `"full"` or `"closed"`
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    /// All workers stopped within the configured grace period after a fatal error or signal.
    AllStoppedWithin,

    /// Grace period exceeded; some workers were aborted.
    ///
    /// Sets:
    /// - `reason`: stuck worker list
    GraceExceeded,

    // === Cohort events ===
    /// Worker task spawned.
    ///
    /// Sets:
    /// - `worker`: worker id
    /// - `score`: the worker's skill level
    WorkerSpawned,

    /// Controller sent the roll call to every worker.
    RollCallSent,

    /// Worker answered the roll call.
    ///
    /// Sets:
    /// - `worker`: worker id
    WorkerPresent,

    /// Worker passed the last stage and exited.
    ///
    /// Sets:
    /// - `worker`: worker id
    /// - `attempt`: total attempts across all stages
    WorkerFinished,

    /// Worker hit a fatal error and exited.
    ///
    /// Sets:
    /// - `worker`: worker id
    /// - `stage`: stage being attempted
    /// - `reason`: error message
    WorkerFailed,

    // === Exchange events ===
    /// Worker submitted an attempt.
    ///
    /// Sets:
    /// - `worker`, `stage`, `score`
    /// - `attempt`: attempt number within this stage (1-based)
    /// - `delay_ms`: think time spent before the attempt
    AttemptSubmitted,

    /// Controller judged an attempt and sent the verdict.
    ///
    /// Sets:
    /// - `worker`, `stage`, `score`, `threshold`, `outcome`
    VerdictIssued,

    /// Controller dropped an inbound message.
    ///
    /// Sets:
    /// - `worker`: claimed sender
    /// - `stage`: claimed stage (attempts only)
    /// - `discard`: reason
    MessageDiscarded,

    /// Controller deferred an attempt for a stage that is not active yet.
    ///
    /// Sets:
    /// - `worker`, `stage`, `score`
    AttemptDeferred,

    // === Stage events ===
    /// Controller started processing a stage.
    ///
    /// Sets:
    /// - `stage`
    StageOpened,

    /// Every worker passed the stage (barrier satisfied).
    ///
    /// Sets:
    /// - `stage`
    /// - `attempt`: verdicts issued for this stage
    StageCompleted,

    /// All stages completed and every worker exited.
    RunCompleted,

    /// The run terminated with a fatal error.
    ///
    /// Sets:
    /// - `reason`: error message
    RunFailed,
}

/// Why the controller dropped an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Attempt for a stage that is already closed.
    Stale,
    /// Sender already passed the active stage.
    Duplicate,
    /// Sender is not part of the cohort.
    UnknownSender,
    /// Stage outside `[1, K]`.
    Malformed,
    /// Roll-call answer outside the roll call, or repeated.
    UnexpectedPresence,
}

impl DiscardReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscardReason::Stale => "stale",
            DiscardReason::Duplicate => "duplicate",
            DiscardReason::UnknownSender => "unknown_sender",
            DiscardReason::Malformed => "malformed",
            DiscardReason::UnexpectedPresence => "unexpected_presence",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker concerned, if any.
    pub worker: Option<WorkerId>,
    /// 1-based stage, if any.
    pub stage: Option<u32>,
    /// Attempt score (or skill level for `WorkerSpawned`).
    pub score: Option<u32>,
    /// Acceptance threshold the score was judged against.
    pub threshold: Option<u32>,
    /// Verdict outcome.
    pub outcome: Option<Outcome>,
    /// Attempt counter (meaning depends on the kind).
    pub attempt: Option<u32>,
    /// Think time / delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Reason for a discarded message.
    pub discard: Option<DiscardReason>,
    /// Subscriber name for subscriber health events.
    pub subscriber: Option<&'static str>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            stage: None,
            score: None,
            threshold: None,
            outcome: None,
            attempt: None,
            delay_ms: None,
            discard: None,
            subscriber: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    #[inline]
    pub fn with_stage(mut self, stage: u32) -> Self {
        self.stage = Some(stage);
        self
    }

    #[inline]
    pub fn with_score(mut self, score: u32) -> Self {
        self.score = Some(score);
        self
    }

    #[inline]
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    #[inline]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_discard(mut self, reason: DiscardReason) -> Self {
        self.discard = Some(reason);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow).with_reason(reason);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// True for events that report on subscribers themselves.
    #[inline]
    pub fn is_subscriber_health(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::StageOpened);
        let b = Event::new(EventKind::StageOpened);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_delay_is_stored_in_millis() {
        let ev = Event::new(EventKind::AttemptSubmitted).with_delay(Duration::from_millis(250));
        assert_eq!(ev.delay_ms, Some(250));
    }

    #[test]
    fn test_subscriber_health_helpers() {
        let ev = Event::subscriber_overflow("log", "full");
        assert!(ev.is_subscriber_health());
        assert_eq!(ev.subscriber, Some("log"));
        assert_eq!(ev.reason.as_deref(), Some("full"));
        assert!(!Event::new(EventKind::RunCompleted).is_subscriber_health());
    }
}
