use std::collections::{HashMap, VecDeque};
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::protocol::WorkerId;

use super::{
    dice::{Dice, Draw},
    entropy::Entropy,
};

#[derive(Debug, Clone, Default)]
struct Script {
    queue: VecDeque<u32>,
    last: Option<u32>,
}

/// Deterministic [`Dice`] replaying scripted values per [`Draw`].
///
/// ## Rules
/// - Values are returned **verbatim** (not clamped to the requested range).
/// - When a draw's script is exhausted, its last value repeats.
/// - An unscripted draw returns `range.start()`.
///
/// # Example
/// ```
/// use stagevisor::{Dice, Draw, ScriptedDice};
///
/// let mut dice = ScriptedDice::new().with(Draw::Bonus, [5, 5, 25]);
/// assert_eq!(dice.roll(Draw::Bonus, 1..=20), 5);
/// assert_eq!(dice.roll(Draw::Bonus, 1..=20), 5);
/// assert_eq!(dice.roll(Draw::Bonus, 1..=20), 25);
/// assert_eq!(dice.roll(Draw::Bonus, 1..=20), 25);
/// assert_eq!(dice.roll(Draw::ThinkTime, 100..=500), 100);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    scripts: HashMap<Draw, Script>,
}

impl ScriptedDice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `values` to the script for `draw`.
    pub fn with(mut self, draw: Draw, values: impl IntoIterator<Item = u32>) -> Self {
        self.scripts
            .entry(draw)
            .or_default()
            .queue
            .extend(values);
        self
    }

    /// Scripts `draw` to always return `value`.
    pub fn fixed(self, draw: Draw, value: u32) -> Self {
        self.with(draw, [value])
    }
}

impl Dice for ScriptedDice {
    fn roll(&mut self, draw: Draw, range: RangeInclusive<u32>) -> u32 {
        let Some(script) = self.scripts.get_mut(&draw) else {
            return *range.start();
        };
        match script.queue.pop_front() {
            Some(v) => {
                script.last = Some(v);
                v
            }
            None => script.last.unwrap_or(*range.start()),
        }
    }
}

/// [`Entropy`] handing out clones of scripted dice.
///
/// Workers without an explicit script get the default worker dice.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEntropy {
    controller: ScriptedDice,
    default_worker: ScriptedDice,
    workers: HashMap<WorkerId, ScriptedDice>,
}

impl ScriptedEntropy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script used by the controller.
    pub fn with_controller(mut self, dice: ScriptedDice) -> Self {
        self.controller = dice;
        self
    }

    /// Script used by every worker without its own script.
    pub fn with_default_worker(mut self, dice: ScriptedDice) -> Self {
        self.default_worker = dice;
        self
    }

    /// Script used by worker `id`.
    pub fn with_worker(mut self, id: WorkerId, dice: ScriptedDice) -> Self {
        self.workers.insert(id, dice);
        self
    }

    /// Wraps into a shared handle.
    pub fn arc(self) -> Arc<dyn Entropy> {
        Arc::new(self)
    }
}

impl Entropy for ScriptedEntropy {
    fn controller(&self) -> Box<dyn Dice> {
        Box::new(self.controller.clone())
    }

    fn worker(&self, id: WorkerId) -> Box<dyn Dice> {
        let dice = self
            .workers
            .get(&id)
            .unwrap_or(&self.default_worker)
            .clone();
        Box::new(dice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_repeats_last_value() {
        let mut d = ScriptedDice::new().with(Draw::Threshold, [3, 9]);
        assert_eq!(d.roll(Draw::Threshold, 1..=20), 3);
        assert_eq!(d.roll(Draw::Threshold, 1..=20), 9);
        assert_eq!(d.roll(Draw::Threshold, 1..=20), 9);
    }

    #[test]
    fn test_unscripted_draw_uses_range_start() {
        let mut d = ScriptedDice::new().fixed(Draw::Skill, 4);
        assert_eq!(d.roll(Draw::Bonus, 1..=20), 1);
        assert_eq!(d.roll(Draw::Skill, 3..=9), 4);
    }

    #[test]
    fn test_entropy_routes_per_worker() {
        let e = ScriptedEntropy::new()
            .with_default_worker(ScriptedDice::new().fixed(Draw::Skill, 1))
            .with_worker(WorkerId::new(2), ScriptedDice::new().fixed(Draw::Skill, 9));
        assert_eq!(e.worker(WorkerId::new(1)).roll(Draw::Skill, 3..=9), 1);
        assert_eq!(e.worker(WorkerId::new(2)).roll(Draw::Skill, 3..=9), 9);
        assert_eq!(e.controller().roll(Draw::Threshold, 1..=20), 1);
    }
}
