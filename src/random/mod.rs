//! Pseudo-random source for the controller and the workers.
//!
//! Every entity owns its own [`Dice`]; nothing random is shared between tasks.
//! An [`Entropy`] hands out one independent dice per entity at spawn time.
//!
//! ## Contents
//! - [`Draw`] names what a value is drawn for (skill, think time, bonus, threshold)
//! - [`Dice`] / [`RngDice`] the per-entity generator over any `rand` RNG
//! - [`Entropy`] with [`OsEntropy`] (fresh, unseeded) and [`SeededEntropy`] (reproducible)
//! - [`ScriptedEntropy`] / [`ScriptedDice`] exact value scripts for deterministic runs
//!
//! ## Quick wiring
//! ```text
//! Coordinator::run()
//!   ├─► entropy.controller() ─► Controller (Draw::Threshold)
//!   └─► entropy.worker(id)   ─► Worker     (Draw::Skill once, then ThinkTime + Bonus per attempt)
//! ```

mod dice;
mod entropy;
mod scripted;

pub use dice::{Dice, Draw, RngDice};
pub use entropy::{Entropy, OsEntropy, SeededEntropy};
pub use scripted::{ScriptedDice, ScriptedEntropy};
