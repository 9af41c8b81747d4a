//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and built-in implementations
//! for handling run events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Worker/Controller ── publish(Event) ──► Bus ──► run listener ──► SubscriberSet::emit(&Event)
//!                                                                      │
//!                                                        ┌─────────────┼─────────────┐
//!                                                        ▼             ▼             ▼
//!                                                    LogWriter    AliveTracker     Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use stagevisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct RetryCounter;
//!
//! #[async_trait]
//! impl Subscribe for RetryCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::VerdictIssued {
//!             // count retries ...
//!         }
//!     }
//! }
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod embedded;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
