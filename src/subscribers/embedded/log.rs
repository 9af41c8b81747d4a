//! # LogWriter: human-readable run trace
//!
//! A subscriber that prints incoming [`Event`]s to stdout, one line each.
//!
//! ## Example output
//! ```text
//! [spawned] worker=w1 skill=7
//! [present] worker=w1
//! [attempt] worker=w1 stage=1 try=1 score=19 think=312ms
//! [verdict] worker=w1 stage=1 score=19 threshold=22 outcome=retry
//! [discarded] worker=w2 stage=1 reason=stale
//! [stage-completed] stage=1 verdicts=5
//! [finished] worker=w1 attempts=9
//! [run-completed]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Trace writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Formats one event as a trace line; `None` for events that are not traced.
    pub fn format(e: &Event) -> Option<String> {
        let worker = e.worker.map(|w| w.to_string()).unwrap_or_else(|| "?".into());
        let line = match e.kind {
            EventKind::WorkerSpawned => {
                format!("[spawned] worker={worker} skill={}", opt(e.score))
            }
            EventKind::RollCallSent => "[roll-call]".to_string(),
            EventKind::WorkerPresent => format!("[present] worker={worker}"),
            EventKind::StageOpened => format!("[stage-opened] stage={}", opt(e.stage)),
            EventKind::AttemptSubmitted => format!(
                "[attempt] worker={worker} stage={} try={} score={} think={}ms",
                opt(e.stage),
                opt(e.attempt),
                opt(e.score),
                opt(e.delay_ms),
            ),
            EventKind::VerdictIssued => format!(
                "[verdict] worker={worker} stage={} score={} threshold={} outcome={}",
                opt(e.stage),
                opt(e.score),
                opt(e.threshold),
                e.outcome.map(|o| o.as_str()).unwrap_or("?"),
            ),
            EventKind::AttemptDeferred => format!(
                "[deferred] worker={worker} stage={} score={}",
                opt(e.stage),
                opt(e.score)
            ),
            EventKind::MessageDiscarded => format!(
                "[discarded] worker={worker} stage={} reason={}",
                opt(e.stage),
                e.discard.map(|d| d.as_str()).unwrap_or("?"),
            ),
            EventKind::StageCompleted => format!(
                "[stage-completed] stage={} verdicts={}",
                opt(e.stage),
                opt(e.attempt)
            ),
            EventKind::WorkerFinished => {
                format!("[finished] worker={worker} attempts={}", opt(e.attempt))
            }
            EventKind::WorkerFailed => format!(
                "[worker-failed] worker={worker} stage={} err={}",
                opt(e.stage),
                e.reason.as_deref().unwrap_or("unknown"),
            ),
            EventKind::RunCompleted => "[run-completed]".to_string(),
            EventKind::RunFailed => format!(
                "[run-failed] err={}",
                e.reason.as_deref().unwrap_or("unknown")
            ),
            EventKind::ShutdownRequested => "[shutdown-requested]".to_string(),
            EventKind::AllStoppedWithin => "[all-stopped-within-grace]".to_string(),
            EventKind::GraceExceeded => format!(
                "[grace-exceeded] stuck={}",
                e.reason.as_deref().unwrap_or("")
            ),
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => return None,
        };
        Some(line)
    }
}

fn opt(v: Option<u32>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "?".into())
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        if let Some(line) = Self::format(e) {
            println!("{line}");
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}
