//! Run events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the coordinator, the controller
//! and the workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`DiscardReason`] why the controller dropped an inbound message
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Coordinator`, `Controller`, `Worker`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the per-run listener spawned by `Coordinator::run()` (fans out to
//!   `SubscriberSet`, which includes the `AliveTracker`), and any receiver obtained
//!   through `Coordinator::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{DiscardReason, Event, EventKind};
