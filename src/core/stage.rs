//! # Per-stage bookkeeping owned by the controller.
//!
//! One [`StageState`] exists while its stage is active and is dropped the moment
//! the barrier is satisfied; only its [`StageSummary`] survives.
//!
//! ## Rules
//! - A worker id enters the pass-set **at most once** per stage
//! - Pass count equals the pass-set size (never double counted)
//! - The state is written by the controller only (single serial consumer, no lock)

use std::collections::HashSet;

use crate::protocol::{Outcome, WorkerId};

/// Pass-set and tallies of the active stage.
#[derive(Debug)]
pub struct StageState {
    stage: u32,
    passed: HashSet<WorkerId>,
    verdicts: u32,
    retries: u32,
}

impl StageState {
    /// Opens bookkeeping for 1-based `stage`.
    pub fn new(stage: u32) -> Self {
        Self {
            stage,
            passed: HashSet::new(),
            verdicts: 0,
            retries: 0,
        }
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    /// True if `worker` already passed this stage.
    pub fn has_passed(&self, worker: WorkerId) -> bool {
        self.passed.contains(&worker)
    }

    /// Records one verdict; a pass adds `worker` to the pass-set.
    ///
    /// Returns `false` (and records nothing) if `worker` already passed.
    pub fn record(&mut self, worker: WorkerId, outcome: Outcome) -> bool {
        if self.has_passed(worker) {
            return false;
        }
        self.verdicts += 1;
        match outcome {
            Outcome::Pass => {
                self.passed.insert(worker);
            }
            Outcome::Retry => self.retries += 1,
        }
        true
    }

    /// Number of workers that passed this stage.
    pub fn pass_count(&self) -> usize {
        self.passed.len()
    }

    /// Barrier check: all `cohort` workers passed.
    pub fn is_complete(&self, cohort: usize) -> bool {
        self.passed.len() >= cohort
    }

    /// Consumes the state into its summary.
    pub fn finish(self) -> StageSummary {
        StageSummary {
            stage: self.stage,
            verdicts: self.verdicts,
            retries: self.retries,
        }
    }
}

/// What remains of a stage once its barrier is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSummary {
    /// 1-based stage number.
    pub stage: u32,
    /// Verdicts issued while the stage was active.
    pub verdicts: u32,
    /// Of which `retry`.
    pub retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_is_counted_once() {
        let w = WorkerId::new(1);
        let mut st = StageState::new(1);
        assert!(st.record(w, Outcome::Pass));
        assert!(!st.record(w, Outcome::Pass));
        assert!(!st.record(w, Outcome::Retry));
        assert_eq!(st.pass_count(), 1);
        assert_eq!(st.finish().verdicts, 1);
    }

    #[test]
    fn test_barrier_requires_whole_cohort() {
        let mut st = StageState::new(2);
        st.record(WorkerId::new(1), Outcome::Pass);
        st.record(WorkerId::new(2), Outcome::Retry);
        assert!(!st.is_complete(2));
        st.record(WorkerId::new(2), Outcome::Pass);
        assert!(st.is_complete(2));

        let summary = st.finish();
        assert_eq!(
            summary,
            StageSummary {
                stage: 2,
                verdicts: 3,
                retries: 1
            }
        );
    }
}
