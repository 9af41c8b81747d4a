use std::fmt;

/// Opaque, unique and stable identity of a worker within one run.
///
/// Assigned by the [`Coordinator`](crate::Coordinator) at spawn time and never reused
/// within the run. Displayed as `w<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u32);

impl WorkerId {
    /// Wraps a raw identifier.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// One submission by a worker for the stage it is currently attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// Sender.
    pub worker: WorkerId,
    /// 1-based stage the sender believes it is attempting.
    pub stage: u32,
    /// Attempt strength: worker skill + fresh bonus.
    pub score: u32,
}

/// Result of judging one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stage passed; the worker moves on.
    Pass,
    /// Stage not passed; the worker attempts it again.
    Retry,
}

impl Outcome {
    /// Judges a score against a threshold: pass iff `score >= threshold`.
    #[inline]
    pub fn judge(score: u32, threshold: u32) -> Self {
        if score >= threshold {
            Outcome::Pass
        } else {
            Outcome::Retry
        }
    }

    /// Short lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Retry => "retry",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller's answer to exactly one [`Attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: Outcome,
    /// Stage of the attempt being answered.
    pub stage: u32,
}

/// Messages carried by the shared submission channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Answer to a roll call.
    Here(WorkerId),
    /// A stage attempt.
    Attempt(Attempt),
}

impl Inbound {
    /// Sender of the message.
    pub fn worker(&self) -> WorkerId {
        match self {
            Inbound::Here(id) => *id,
            Inbound::Attempt(a) => a.worker,
        }
    }
}

/// Messages carried by a worker's private reply channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// "Is this worker here?", sent once before stage 1 when roll call is enabled.
    RollCall,
    /// Verdict for the worker's last attempt.
    Verdict(Verdict),
    /// The last attempt is held until `stage` opens; its verdict follows later.
    Deferred { stage: u32 },
}
