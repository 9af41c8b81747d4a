//! Runtime core: cohort lifecycle, stage logic and channel plumbing.
//!
//! The public entry point is [`Coordinator`], which spawns the cohort, drives a
//! run to completion and tears it down on failure.
//!
//! Internal modules:
//! - [`config`]: run settings and their validation;
//! - [`coordinator`]: spawns workers and the controller, handles signals and grace;
//! - [`controller`]: the serial stage loop, verdicts and the per-stage barrier;
//! - [`worker`]: one cohort member's attempt loop;
//! - [`stage`]: per-stage pass-set bookkeeping;
//! - [`exchange`]: bounded, cancellable channel operations;
//! - [`alive`]: sequence-ordered tracker of running workers;
//! - [`shutdown`]: cross-platform termination signals.

mod alive;
mod builder;
mod config;
mod controller;
mod coordinator;
mod exchange;
mod shutdown;
mod stage;
mod worker;

pub use alive::AliveTracker;
pub use builder::CoordinatorBuilder;
pub use config::{Config, MAX_COHORT, MIN_COHORT};
pub use controller::{Controller, ControllerParams, ControllerReport};
pub use coordinator::{Coordinator, RunReport};
pub use stage::{StageState, StageSummary};
pub use worker::{Worker, WorkerParams, WorkerReport};
