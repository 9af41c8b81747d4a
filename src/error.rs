//! Error types used by the stagevisor runtime.
//!
//! This module defines two error enums:
//!
//! - [`RuntimeError`]: fatal failures of a run (transport, timeouts, protocol violations, shutdown).
//! - [`ConfigError`]: a [`Config`](crate::Config) that cannot drive a run to completion.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//!
//! Protocol anomalies seen by the controller (stale, duplicate, unknown, malformed
//! messages) are **not** errors: they are discarded and reported as
//! [`EventKind::MessageDiscarded`](crate::EventKind::MessageDiscarded) events.

use std::time::Duration;
use thiserror::Error;

use crate::protocol::WorkerId;

/// Who experienced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// The single controller.
    Controller,
    /// One worker of the cohort.
    Worker(WorkerId),
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Controller => f.write_str("controller"),
            Entity::Worker(id) => write!(f, "worker {id}"),
        }
    }
}

/// # Errors produced by a run.
///
/// Every variant is fatal for the entity that raised it. The [`Coordinator`](crate::Coordinator)
/// cancels the remaining cohort and returns the first fatal error to the caller.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A channel operation failed because the other side is gone.
    #[error("{entity}: {op} failed: channel closed")]
    Transport {
        /// Operation that failed (e.g. `"submit attempt"`).
        op: &'static str,
        /// Entity that observed the failure.
        entity: Entity,
    },

    /// A bounded wait expired.
    #[error("{entity}: {op} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        op: &'static str,
        /// Entity that observed the timeout.
        entity: Entity,
        /// Configured bound.
        after: Duration,
    },

    /// A worker received a verdict for a stage it did not submit for.
    #[error("worker {worker}: verdict for stage {got}, expected stage {expected}")]
    ProtocolViolation {
        /// Worker that received the verdict.
        worker: WorkerId,
        /// Stage the worker last submitted for.
        expected: u32,
        /// Stage carried by the verdict.
        got: u32,
    },

    /// A worker task panicked.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// The worker whose task panicked.
        worker: WorkerId,
    },

    /// The controller task panicked or was lost.
    #[error("controller task lost")]
    ControllerLost,

    /// The entity was cancelled because the run is shutting down.
    #[error("{entity}: cancelled")]
    Canceled {
        /// Entity that observed the cancellation.
        entity: Entity,
    },

    /// The run was interrupted by a termination signal.
    #[error("run interrupted by termination signal")]
    Interrupted,

    /// Shutdown grace period was exceeded; some workers had to be aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Workers that did not stop in time.
        stuck: Vec<WorkerId>,
    },

    /// The configuration cannot drive a run.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stagevisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Transport { .. } => "runtime_transport",
            RuntimeError::Timeout { .. } => "runtime_timeout",
            RuntimeError::ProtocolViolation { .. } => "runtime_protocol_violation",
            RuntimeError::WorkerPanicked { .. } => "runtime_worker_panicked",
            RuntimeError::ControllerLost => "runtime_controller_lost",
            RuntimeError::Canceled { .. } => "runtime_canceled",
            RuntimeError::Interrupted => "runtime_interrupted",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Config(e) => e.as_label(),
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Transport { op, entity } => format!("{entity}: {op}: channel closed"),
            RuntimeError::Timeout { op, entity, after } => {
                format!("{entity}: {op}: no response within {after:?}")
            }
            RuntimeError::ProtocolViolation {
                worker,
                expected,
                got,
            } => format!("worker {worker} expected stage {expected}, got {got}"),
            RuntimeError::WorkerPanicked { worker } => format!("worker {worker} panicked"),
            RuntimeError::ControllerLost => "controller task lost".to_string(),
            RuntimeError::Canceled { entity } => format!("{entity}: cancelled"),
            RuntimeError::Interrupted => "interrupted".to_string(),
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck workers={stuck:?}")
            }
            RuntimeError::Config(e) => e.to_string(),
        }
    }

    /// True for channel-level failures (closed channel or expired wait).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RuntimeError::Transport { .. } | RuntimeError::Timeout { .. }
        )
    }
}

/// # Invalid run configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `cohort_size` is zero.
    #[error("cohort must contain at least one worker")]
    EmptyCohort,

    /// `stage_weights` is empty.
    #[error("at least one stage is required")]
    NoStages,

    /// An inclusive range has `start > end`.
    #[error("range `{name}` is empty")]
    EmptyRange {
        /// Config field name.
        name: &'static str,
    },

    /// A stage can never be passed by the weakest possible worker.
    #[error("stage {stage} is unreachable: best weakest score {best} < lowest threshold {floor}")]
    Unreachable {
        /// 1-based stage number.
        stage: u32,
        /// `skill.min + bonus.max`.
        best: u32,
        /// `weight + threshold_roll.min`.
        floor: u32,
    },

    /// The longest think time reaches the controller's inbound timeout.
    #[error("think time up to {think:?} reaches the inbound timeout {inbound:?}")]
    ThinkExceedsInbound {
        /// `think_ms.end()`.
        think: Duration,
        /// `inbound_timeout`.
        inbound: Duration,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::EmptyCohort => "config_empty_cohort",
            ConfigError::NoStages => "config_no_stages",
            ConfigError::EmptyRange { .. } => "config_empty_range",
            ConfigError::Unreachable { .. } => "config_unreachable_stage",
            ConfigError::ThinkExceedsInbound { .. } => "config_think_exceeds_inbound",
        }
    }
}
