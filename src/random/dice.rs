use std::ops::RangeInclusive;

use rand::{Rng, RngCore};

/// What a random value is drawn for.
///
/// Lets deterministic sources script each purpose independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Draw {
    /// Worker skill level, drawn once per worker at spawn.
    Skill,
    /// Worker think time before an attempt, in milliseconds.
    ThinkTime,
    /// Worker bonus added to skill on every attempt.
    Bonus,
    /// Controller roll added to the stage weight on every judged attempt.
    Threshold,
}

/// Per-entity source of random integers.
pub trait Dice: Send + 'static {
    /// Returns a value for `draw` within the inclusive `range`.
    fn roll(&mut self, draw: Draw, range: RangeInclusive<u32>) -> u32;
}

impl Dice for Box<dyn Dice> {
    fn roll(&mut self, draw: Draw, range: RangeInclusive<u32>) -> u32 {
        (**self).roll(draw, range)
    }
}

/// [`Dice`] backed by any `rand` generator. The draw purpose is ignored.
#[derive(Debug, Clone)]
pub struct RngDice<R> {
    rng: R,
}

impl<R> RngDice<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: RngCore + Send + 'static> Dice for RngDice<R> {
    /// Uniform in `range`; an empty range yields its start.
    fn roll(&mut self, _draw: Draw, range: RangeInclusive<u32>) -> u32 {
        if range.is_empty() {
            return *range.start();
        }
        self.rng.random_range(range)
    }
}
