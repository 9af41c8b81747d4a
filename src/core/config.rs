//! # Run configuration.
//!
//! Provides [`Config`], the centralized settings for one run: cohort size, stage
//! weights, the ranges every random draw is taken from, wait bounds and capacities.
//!
//! ## Sentinel values
//! - `reply_timeout = 0s` → workers wait for verdicts without a bound
//! - `inbound_timeout = 0s` → the controller waits for submissions without a bound
//!
//! ## Defaults
//! The defaults model four stages weighted `[3, 6, 7, 5]`, skills in `[3, 9]`,
//! bonuses and threshold rolls in `[1, 20]`, and 100–500 ms of think time.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::error::ConfigError;

/// Smallest cohort accepted by the command line.
pub const MIN_COHORT: usize = 3;
/// Largest cohort accepted by the command line.
pub const MAX_COHORT: usize = 20;

/// Configuration for one run.
///
/// ## Field semantics
/// - `cohort_size`: number of workers `N` (the CLI enforces `3..=20`; the core only needs `>= 1`)
/// - `stage_weights`: base difficulty per stage; its length is the stage count `K`
/// - `skill`, `bonus`, `threshold_roll`, `think_ms`: inclusive ranges for random draws
/// - `reply_timeout`, `inbound_timeout`: wait bounds (`0s` = unbounded)
/// - `submission_capacity`: shared submission channel capacity (clamped to `>= cohort_size`)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `grace`: how long to wait for workers after a fatal error or signal
/// - `roll_call`: run the presence handshake before stage 1
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of workers in the cohort.
    pub cohort_size: usize,

    /// Base difficulty per stage, known to the controller only.
    pub stage_weights: Vec<u32>,

    /// Range a worker's skill level is drawn from (once per worker).
    pub skill: RangeInclusive<u32>,

    /// Range a worker's per-attempt bonus is drawn from.
    pub bonus: RangeInclusive<u32>,

    /// Range the controller's per-attempt threshold roll is drawn from.
    pub threshold_roll: RangeInclusive<u32>,

    /// Range a worker's think time before each attempt is drawn from, in milliseconds.
    pub think_ms: RangeInclusive<u32>,

    /// Maximum time a worker waits for one verdict (or the roll call).
    ///
    /// Also bounds how long the controller may block delivering a reply.
    pub reply_timeout: Duration,

    /// Maximum time the controller waits for the next submission while a stage is active.
    pub inbound_timeout: Duration,

    /// Capacity of the shared submission channel.
    ///
    /// Each worker has at most one message in flight, so any capacity `>= cohort_size`
    /// never blocks a sender.
    pub submission_capacity: usize,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    /// Maximum time to wait for workers to stop after cancellation.
    pub grace: Duration,

    /// Whether the controller performs a roll call before stage 1.
    pub roll_call: bool,
}

impl Config {
    /// Number of stages `K`.
    #[inline]
    pub fn stages(&self) -> u32 {
        self.stage_weights.len() as u32
    }

    /// Weight of 1-based `stage`, if it exists.
    #[inline]
    pub fn weight(&self, stage: u32) -> Option<u32> {
        let idx = usize::try_from(stage).ok()?.checked_sub(1)?;
        self.stage_weights.get(idx).copied()
    }

    /// Returns the worker verdict timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn reply_timeout(&self) -> Option<Duration> {
        non_zero(self.reply_timeout)
    }

    /// Returns the controller inbound timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn inbound_timeout(&self) -> Option<Duration> {
        non_zero(self.inbound_timeout)
    }

    /// Submission channel capacity, never below the cohort size.
    #[inline]
    pub fn submission_capacity_clamped(&self) -> usize {
        self.submission_capacity.max(self.cohort_size).max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Checks that the configuration can drive a run to completion.
    ///
    /// Besides shape checks, every stage must be passable by the weakest possible
    /// worker: `skill.min + bonus.max >= weight + threshold_roll.min`. Under that
    /// condition every attempt passes with non-zero probability, so each worker
    /// passes every stage with probability 1 over unbounded attempts.
    ///
    /// With a bounded `inbound_timeout`, the longest think time must stay below it;
    /// otherwise a cohort that is merely thinking looks stalled to the controller.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cohort_size == 0 {
            return Err(ConfigError::EmptyCohort);
        }
        if self.stage_weights.is_empty() {
            return Err(ConfigError::NoStages);
        }
        for (name, range) in [
            ("skill", &self.skill),
            ("bonus", &self.bonus),
            ("threshold_roll", &self.threshold_roll),
            ("think_ms", &self.think_ms),
        ] {
            if range.is_empty() {
                return Err(ConfigError::EmptyRange { name });
            }
        }

        let best = self.skill.start().saturating_add(*self.bonus.end());
        for (idx, weight) in self.stage_weights.iter().enumerate() {
            let floor = weight.saturating_add(*self.threshold_roll.start());
            if best < floor {
                return Err(ConfigError::Unreachable {
                    stage: idx as u32 + 1,
                    best,
                    floor,
                });
            }
        }

        if let Some(inbound) = self.inbound_timeout() {
            let think = Duration::from_millis(u64::from(*self.think_ms.end()));
            if think >= inbound {
                return Err(ConfigError::ThinkExceedsInbound { think, inbound });
            }
        }
        Ok(())
    }
}

#[inline]
fn non_zero(d: Duration) -> Option<Duration> {
    if d == Duration::ZERO { None } else { Some(d) }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `cohort_size = 3`, `stage_weights = [3, 6, 7, 5]`
    /// - `skill = 3..=9`, `bonus = 1..=20`, `threshold_roll = 1..=20`, `think_ms = 100..=500`
    /// - `reply_timeout = 30s`, `inbound_timeout = 30s`
    /// - `submission_capacity = 1024`, `bus_capacity = 4096`, `grace = 5s`
    /// - `roll_call = true`
    fn default() -> Self {
        Self {
            cohort_size: MIN_COHORT,
            stage_weights: vec![3, 6, 7, 5],
            skill: 3..=9,
            bonus: 1..=20,
            threshold_roll: 1..=20,
            think_ms: 100..=500,
            reply_timeout: Duration::from_secs(30),
            inbound_timeout: Duration::from_secs(30),
            submission_capacity: 1024,
            bus_capacity: 4096,
            grace: Duration::from_secs(5),
            roll_call: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.stages(), 4);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn test_weight_lookup_is_one_based() {
        let cfg = Config::default();
        assert_eq!(cfg.weight(0), None);
        assert_eq!(cfg.weight(1), Some(3));
        assert_eq!(cfg.weight(4), Some(5));
        assert_eq!(cfg.weight(5), None);
    }

    #[test]
    fn test_unreachable_stage_is_rejected() {
        let cfg = Config {
            stage_weights: vec![3, 40],
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Unreachable {
                stage: 2,
                best: 23,
                floor: 41
            })
        );
    }

    #[test]
    fn test_think_time_must_stay_below_inbound_timeout() {
        let cfg = Config {
            think_ms: 40_000..=40_000,
            roll_call: false,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ThinkExceedsInbound {
                think: Duration::from_secs(40),
                inbound: Duration::from_secs(30),
            })
        );

        let cfg = Config {
            think_ms: 100..=30_000,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate().map_err(|e| e.as_label()),
            Err("config_think_exceeds_inbound")
        );

        let cfg = Config {
            think_ms: 100..=29_999,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Ok(()));

        // No bound, nothing to exceed.
        let cfg = Config {
            think_ms: 40_000..=40_000,
            inbound_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn test_shape_errors() {
        let cfg = Config {
            cohort_size: 0,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyCohort));

        let cfg = Config {
            stage_weights: vec![],
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoStages));

        #[allow(clippy::reversed_empty_ranges)]
        let cfg = Config {
            bonus: 20..=1,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmptyRange { name: "bonus" })
        );
    }

    #[test]
    fn test_sentinels_and_clamps() {
        let cfg = Config {
            cohort_size: 8,
            submission_capacity: 2,
            bus_capacity: 0,
            reply_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(cfg.reply_timeout(), None);
        assert_eq!(cfg.inbound_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.submission_capacity_clamped(), 8);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
