//! # stagevisor
//!
//! **Stagevisor** runs a cohort of concurrent workers through a fixed sequence of
//! stages under the control of a single controller.
//!
//! Each worker repeatedly submits scored attempts for its current stage; the
//! controller judges every attempt against a freshly randomized threshold and
//! replies `pass` or `retry`. A stage is complete only once **every** worker has
//! passed it, and no attempt for the next stage is judged before that.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Worker 1   │   │   Worker 2   │   │   Worker N   │
//!     │ (skill, loop)│   │ (skill, loop)│   │ (skill, loop)│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ Inbound::Attempt │                  │
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │           submission channel (bounded mpsc, many → one)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                   ┌────────────────────────────────┐
//!                   │  Controller (serial consumer)  │
//!                   │  - current stage, weights      │
//!                   │  - pass-set per stage          │
//!                   │  - deferred future attempts    │
//!                   └──┬──────────────┬───────────┬──┘
//!        Reply::Verdict│              │           │
//!                      ▼              ▼           ▼
//!                 [reply w1]     [reply w2]   [reply wN]   (capacity 1 each)
//!
//! every component ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                     ┌─────────┼─────────┐
//!                                                     ▼         ▼         ▼
//!                                              AliveTracker  LogWriter  user subs
//! ```
//!
//! ### Stage protocol
//! ```text
//! worker:      think ─► score = skill + bonus ─► submit ─► await verdict
//!                                                            ├─ pass  ─► next stage
//!                                                            └─ retry ─► same stage
//! controller:  threshold = weight[stage] + roll(1..=20)
//!              pass  ⇔ score >= threshold
//!              stage s+1 opens once pass_count(s) == N
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                        |
//! |-------------------|-------------------------------------------------------------|-------------------------------------------|
//! | **Lifecycle**     | Spawn the cohort, run it, tear it down on failure.          | [`Coordinator`], [`RunReport`]            |
//! | **Configuration** | Cohort size, weights, random ranges, wait bounds.           | [`Config`]                                |
//! | **Randomness**    | Injectable, per-entity sources of every draw.               | [`Entropy`], [`Dice`], [`ScriptedEntropy`]|
//! | **Subscriber API**| Hook into the run trace (logging, collectors).              | [`Subscribe`], [`Event`]                  |
//! | **Errors**        | Typed fatal errors and configuration errors.                | [`RuntimeError`], [`ConfigError`]         |
//!
//! ## Optional features
//! - `logging` (default): exports the human-readable trace writer [`LogWriter`] and builds the binary (`clap`, `anyhow`, `tracing-subscriber`).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use stagevisor::{Config, Coordinator, Draw, ScriptedDice, ScriptedEntropy};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { think_ms: 0..=0, ..Config::default() };
//!
//!     // Strong workers, easy thresholds: every attempt passes.
//!     let entropy = ScriptedEntropy::new()
//!         .with_controller(ScriptedDice::new().fixed(Draw::Threshold, 1))
//!         .with_default_worker(ScriptedDice::new().fixed(Draw::Bonus, 20))
//!         .arc();
//!
//!     let report = Coordinator::builder(cfg).with_entropy(entropy).build().run().await?;
//!     assert_eq!(report.controller.total_verdicts(), 12);
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod protocol;
mod random;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    AliveTracker, Config, Controller, ControllerParams, ControllerReport, Coordinator,
    CoordinatorBuilder, MAX_COHORT, MIN_COHORT, RunReport, StageState, StageSummary, Worker,
    WorkerParams, WorkerReport,
};
pub use error::{ConfigError, Entity, RuntimeError};
pub use events::{Bus, DiscardReason, Event, EventKind};
pub use protocol::{Attempt, Inbound, Outcome, Reply, Verdict, WorkerId};
pub use random::{
    Dice, Draw, Entropy, OsEntropy, RngDice, ScriptedDice, ScriptedEntropy, SeededEntropy,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Human-readable trace writer.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
