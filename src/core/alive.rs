//! # Worker lifecycle tracker with sequence-based ordering.
//!
//! Maintains which workers are currently running, using event sequence numbers
//! to handle out-of-order delivery.
//!
//! ## Architecture
//! ```text
//! Worker ──► Bus ──► run listener ──► SubscriberSet ──► AliveTracker::update()
//!                                                              │
//!                                                              ▼
//!                                                HashMap<WorkerId, WorkerState>
//!                                                    (id → {seq, alive})
//! ```
//!
//! ## Rules
//! - Only `WorkerSpawned` / `WorkerFinished` / `WorkerFailed` change alive state
//! - Other worker events **update seq** but don't affect alive status
//! - Events with `seq <= last_seq` are **rejected** (stale)

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::{Event, EventKind};
use crate::protocol::WorkerId;
use crate::subscribers::Subscribe;

#[derive(Debug, Clone, Copy)]
struct WorkerState {
    last_seq: u64,
    alive: bool,
}

/// Tracker of running workers, fed by the event bus.
///
/// Used by the [`Coordinator`](crate::Coordinator) to name the workers that did
/// not stop within the grace period.
#[derive(Default)]
pub struct AliveTracker {
    state: RwLock<HashMap<WorkerId, WorkerState>>,
}

impl AliveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `ev` if it is newer than the last event seen for its worker.
    ///
    /// ```text
    /// update(WorkerFinished, seq=100) → alive=false, last_seq=100
    /// update(WorkerSpawned,  seq=99)  → rejected (stale)
    /// ```
    ///
    /// Returns `true` if the alive state was written.
    pub async fn update(&self, ev: &Event) -> bool {
        let Some(id) = ev.worker else {
            return false;
        };

        let mut state = self.state.write().await;
        let entry = state.entry(id).or_insert(WorkerState {
            last_seq: 0,
            alive: false,
        });
        if ev.seq <= entry.last_seq {
            return false;
        }
        entry.last_seq = ev.seq;
        match ev.kind {
            EventKind::WorkerSpawned => {
                entry.alive = true;
                true
            }
            EventKind::WorkerFinished | EventKind::WorkerFailed => {
                entry.alive = false;
                true
            }
            _ => false,
        }
    }

    /// Sorted ids of workers still considered running.
    pub async fn snapshot(&self) -> Vec<WorkerId> {
        let state = self.state.read().await;
        let mut alive: Vec<WorkerId> = state
            .iter()
            .filter(|(_, ws)| ws.alive)
            .map(|(id, _)| *id)
            .collect();
        alive.sort_unstable();
        alive
    }

    pub async fn is_alive(&self, id: WorkerId) -> bool {
        self.state
            .read()
            .await
            .get(&id)
            .is_some_and(|ws| ws.alive)
    }
}

#[async_trait]
impl Subscribe for AliveTracker {
    async fn on_event(&self, e: &Event) {
        self.update(e).await;
    }

    fn name(&self) -> &'static str {
        "AliveTracker"
    }

    fn queue_capacity(&self) -> usize {
        2048
    }
}
