//! # Coordinator: owns worker lifetimes, wires the channels, drives one run.
//!
//! The [`Coordinator`] owns the event bus, the subscribers and the entropy source.
//! Each [`Coordinator::run`] builds a fresh cohort: `N` workers, one controller,
//! one shared submission channel and `N` private reply channels.
//!
//! ## Architecture
//! ```text
//! run():
//!   cfg.validate()
//!   event listener: Bus.subscribe() ─► SubscriberSet::emit(&Event)  (incl. AliveTracker)
//!
//!   submission channel (N → 1)          reply channels (1 → 1, capacity 1)
//!   ┌──────────┐                         ┌──────────┐
//!   │ Worker 1 │──┐                  ┌──►│ Worker 1 │
//!   │ Worker 2 │──┼──► Controller ───┼──►│ Worker 2 │
//!   │ Worker N │──┘                  └──►│ Worker N │
//!   └──────────┘                         └──────────┘
//!       all spawned into one JoinSet, each with a child CancellationToken
//!
//!   wait for:
//!     ├─ controller + every worker done ─► publish RunCompleted ─► Ok(RunReport)
//!     ├─ any fatal error                 ─► teardown
//!     └─ OS termination signal (or the
//!        future given to run_with_shutdown) ─► publish ShutdownRequested ─► teardown
//!
//!   teardown:
//!     run_token.cancel()
//!     join everything within cfg.grace
//!       ├─ Ok      ─► publish AllStoppedWithin
//!       └─ expired ─► publish GraceExceeded (AliveTracker.snapshot()), abort stragglers
//!     publish RunFailed ─► Err(..)
//!
//!   finally: stop listener, drain bus, SubscriberSet::shutdown()
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use stagevisor::{Config, Coordinator, SeededEntropy, Subscribe};
//! #[cfg(feature = "logging")]
//! use stagevisor::LogWriter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { cohort_size: 5, ..Config::default() };
//!
//!     let mut subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!     #[cfg(feature = "logging")]
//!     subs.push(Arc::new(LogWriter::new()));
//!
//!     let coordinator = Coordinator::builder(cfg)
//!         .with_subscribers(subs)
//!         .with_entropy(Arc::new(SeededEntropy::new(42)))
//!         .build();
//!
//!     let report = coordinator.run().await?;
//!     println!("verdicts: {}", report.controller.total_verdicts());
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{
    sync::{broadcast, mpsc},
    task::{JoinHandle, JoinSet},
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        Config,
        alive::AliveTracker,
        builder::CoordinatorBuilder,
        controller::{Controller, ControllerParams, ControllerReport},
        shutdown,
        worker::{Worker, WorkerParams, WorkerReport},
    },
    error::RuntimeError,
    events::{Bus, Event, EventKind},
    protocol::{Inbound, Reply, WorkerId},
    random::Entropy,
    subscribers::{Subscribe, SubscriberSet},
};

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Per-stage tallies from the controller.
    pub controller: ControllerReport,
    /// One report per worker, sorted by id.
    pub workers: Vec<WorkerReport>,
}

/// How one task of the run ended.
enum Exit {
    Worker(WorkerId, Result<WorkerReport, RuntimeError>),
    Controller(Result<ControllerReport, RuntimeError>),
}

/// Runs cohorts of workers through every stage.
pub struct Coordinator {
    cfg: Config,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    entropy: Arc<dyn Entropy>,
}

impl Coordinator {
    /// Starts building a coordinator for `cfg`.
    pub fn builder(cfg: Config) -> CoordinatorBuilder {
        CoordinatorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subscribers: Vec<Arc<dyn Subscribe>>,
        entropy: Arc<dyn Entropy>,
    ) -> Self {
        Self {
            cfg,
            bus,
            subscribers,
            entropy,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Receives every event published from now on.
    ///
    /// Subscribe before [`run`](Self::run) to observe a run from its first event.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Runs one cohort through all stages.
    ///
    /// Returns when every worker passed every stage, or with the first fatal error
    /// once the cohort has been torn down. The trace is flushed to all subscribers
    /// before this returns. A termination signal interrupts the run.
    pub async fn run(&self) -> Result<RunReport, RuntimeError> {
        self.run_with_shutdown(signal_name()).await
    }

    /// Like [`run`](Self::run), but interrupted when `shutdown` resolves instead of
    /// on OS signals. The resolved value is the `ShutdownRequested` reason.
    pub async fn run_with_shutdown<F>(&self, shutdown: F) -> Result<RunReport, RuntimeError>
    where
        F: Future<Output = &'static str>,
    {
        if let Err(e) = self.cfg.validate() {
            tracing::error!(error = %e, label = e.as_label(), "invalid configuration");
            return Err(e.into());
        }

        let alive = Arc::new(AliveTracker::new());
        let mut subs = self.subscribers.clone();
        subs.push(alive.clone());
        let stop = CancellationToken::new();
        let listener = self.event_listener(SubscriberSet::new(subs, self.bus.clone()), stop.clone());

        let token = CancellationToken::new();
        let res = self.drive(&token, &alive, shutdown).await;

        stop.cancel();
        if let Err(e) = listener.await {
            tracing::warn!(error = %e, "event listener ended abnormally");
        }
        res
    }

    async fn drive(
        &self,
        token: &CancellationToken,
        alive: &AliveTracker,
        shutdown: impl Future<Output = &'static str>,
    ) -> Result<RunReport, RuntimeError> {
        let mut set = JoinSet::new();
        let (submit, inbound) = mpsc::channel(self.cfg.submission_capacity_clamped());
        let replies = self.spawn_workers(&mut set, token, submit);
        self.spawn_controller(&mut set, token, inbound, replies);

        let mut workers = Vec::with_capacity(self.cfg.cohort_size);
        let mut controller = None;
        tokio::pin!(shutdown);

        let fatal = loop {
            if controller.is_some() && set.is_empty() {
                break None;
            }
            tokio::select! {
                joined = set.join_next() => match joined {
                    Some(Ok(Exit::Worker(_, Ok(report)))) => workers.push(report),
                    Some(Ok(Exit::Controller(Ok(report)))) => controller = Some(report),
                    Some(Ok(Exit::Worker(_, Err(e)) | Exit::Controller(Err(e)))) => break Some(e),
                    // Panics are caught inside the tasks; only runtime shutdown ends up here.
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "run task cancelled by the runtime");
                        break Some(RuntimeError::Interrupted);
                    }
                    None => break None,
                },
                name = &mut shutdown => {
                    tracing::warn!(reason = name, "shutdown requested");
                    self.bus.publish(Event::new(EventKind::ShutdownRequested).with_reason(name));
                    break Some(RuntimeError::Interrupted);
                }
            }
        };

        match (fatal, controller) {
            (None, Some(controller)) => {
                workers.sort_by_key(|w| w.id);
                self.bus.publish(Event::new(EventKind::RunCompleted));
                Ok(RunReport {
                    controller,
                    workers,
                })
            }
            (Some(e), _) => Err(self.teardown(&mut set, token, alive, e).await),
            (None, None) => Err(self.teardown(&mut set, token, alive, RuntimeError::ControllerLost).await),
        }
    }

    /// Spawns `N` workers with ids `1..=N`; returns their reply senders.
    fn spawn_workers(
        &self,
        set: &mut JoinSet<Exit>,
        token: &CancellationToken,
        submit: mpsc::Sender<Inbound>,
    ) -> HashMap<WorkerId, mpsc::Sender<Reply>> {
        let params = WorkerParams::from_config(&self.cfg);
        let mut replies = HashMap::with_capacity(self.cfg.cohort_size);

        for raw in 1..=self.cfg.cohort_size as u32 {
            let id = WorkerId::new(raw);
            let (tx, rx) = mpsc::channel(1);
            let worker = Worker::new(
                id,
                self.entropy.worker(id),
                self.cfg.skill.clone(),
                params.clone(),
                submit.clone(),
                rx,
                self.bus.clone(),
            );
            self.bus.publish(
                Event::new(EventKind::WorkerSpawned)
                    .with_worker(id)
                    .with_score(worker.skill()),
            );

            let child = token.child_token();
            let bus = self.bus.clone();
            set.spawn(async move {
                let res = match AssertUnwindSafe(worker.run(child)).catch_unwind().await {
                    Ok(res) => res,
                    Err(_) => {
                        let err = RuntimeError::WorkerPanicked { worker: id };
                        bus.publish(
                            Event::new(EventKind::WorkerFailed)
                                .with_worker(id)
                                .with_reason(err.to_string()),
                        );
                        Err(err)
                    }
                };
                Exit::Worker(id, res)
            });
            replies.insert(id, tx);
        }
        replies
    }

    fn spawn_controller(
        &self,
        set: &mut JoinSet<Exit>,
        token: &CancellationToken,
        inbound: mpsc::Receiver<Inbound>,
        replies: HashMap<WorkerId, mpsc::Sender<Reply>>,
    ) {
        let controller = Controller::new(
            ControllerParams::from_config(&self.cfg),
            self.entropy.controller(),
            inbound,
            replies,
            self.bus.clone(),
        );
        let child = token.child_token();
        set.spawn(async move {
            let res = AssertUnwindSafe(controller.run(child))
                .catch_unwind()
                .await
                .unwrap_or(Err(RuntimeError::ControllerLost));
            Exit::Controller(res)
        });
    }

    /// Cancels the cohort and joins it within `cfg.grace`.
    ///
    /// Returns the error to report: `err` itself, or `GraceExceeded` if tasks had
    /// to be aborted.
    async fn teardown(
        &self,
        set: &mut JoinSet<Exit>,
        token: &CancellationToken,
        alive: &AliveTracker,
        err: RuntimeError,
    ) -> RuntimeError {
        tracing::error!(error = %err, label = err.as_label(), "run failed; cancelling cohort");
        token.cancel();

        let grace = self.cfg.grace;
        let joined = time::timeout(grace, async { while set.join_next().await.is_some() {} }).await;
        let reported = match joined {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                None
            }
            Err(_elapsed) => {
                let stuck = alive.snapshot().await;
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(format!("{stuck:?}")),
                );
                set.abort_all();
                while set.join_next().await.is_some() {}
                Some(RuntimeError::GraceExceeded { grace, stuck })
            }
        };

        self.bus
            .publish(Event::new(EventKind::RunFailed).with_reason(err.to_string()));
        reported.unwrap_or(err)
    }

    /// Forwards bus events to `set` until `stop`, then drains and shuts it down.
    fn event_listener(&self, set: SubscriberSet, stop: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event listener lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => set.emit(&ev),
                                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                                    tracing::warn!(skipped, "event listener lagged behind the bus");
                                }
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        })
    }
}

/// Resolves with the signal name; never resolves if registration fails.
async fn signal_name() -> &'static str {
    match shutdown::wait_for_shutdown_signal().await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(error = %e, "signal handlers unavailable; runs cannot be interrupted");
            std::future::pending().await
        }
    }
}
