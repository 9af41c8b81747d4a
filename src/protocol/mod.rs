//! Wire types exchanged between workers and the controller.
//!
//! ## Contents
//! - [`WorkerId`] opaque, stable worker identity (routing and deduplication key)
//! - [`Attempt`], [`Verdict`], [`Outcome`] the stage-attempt exchange
//! - [`Inbound`] everything a worker can put on the shared submission channel
//! - [`Reply`] everything the controller can put on a worker's private reply channel
//!
//! ## Channels
//! ```text
//!   Worker 1 ──┐
//!   Worker 2 ──┼──► submission (mpsc, many → one) ──► Controller
//!   Worker N ──┘                                          │
//!      ▲                                                  │
//!      └──────────── reply (mpsc, one → one, per worker) ◄┘
//! ```

mod message;

pub use message::{Attempt, Inbound, Outcome, Reply, Verdict, WorkerId};
