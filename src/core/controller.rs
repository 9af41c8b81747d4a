//! # Controller: serial consumer of the submission channel.
//!
//! Owns the current stage, the stage weights and the per-stage pass-set. Nothing
//! else reads or writes them, so no lock is involved: one message is handled at a
//! time and there is never more than one verdict computation in flight.
//!
//! ## Stage loop
//! ```text
//! [roll call] send RollCall to all ─► collect N × Here
//!
//! for stage s in 1..=K {
//!   ├─► StageState::new(s), publish StageOpened
//!   ├─► replay deferred attempts for s (arrival order)
//!   └─► while pass_count(s) < N {
//!         recv Inbound (bounded, cancellable)
//!           ├─ unknown sender          ─► discard
//!           ├─ stage ∉ [1, K]          ─► discard (malformed)
//!           ├─ stage < s               ─► discard (stale)
//!           ├─ stage > s               ─► defer until s' opens, send Reply::Deferred
//!           ├─ sender already passed s ─► discard (duplicate)
//!           └─ judge:
//!                threshold = weight[s] + roll(1..=20)   (fresh per attempt)
//!                outcome   = score >= threshold ? Pass : Retry
//!                record, publish VerdictIssued, send Reply::Verdict
//!       }
//!       publish StageCompleted         (barrier satisfied)
//! }
//! ```
//!
//! ## Rules
//! - Stage `s+1` attempts are **never judged** before all `N` workers passed `s`
//! - Discards are silent towards workers and never fatal
//! - A failed reply delivery is fatal (that worker can no longer progress)

use std::collections::{HashMap, VecDeque};
use std::ops::RangeInclusive;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{Config, exchange::Wait, stage::StageState, stage::StageSummary},
    error::{Entity, RuntimeError},
    events::{Bus, DiscardReason, Event, EventKind},
    protocol::{Attempt, Inbound, Outcome, Reply, Verdict, WorkerId},
    random::{Dice, Draw},
};

/// Stage `0` is the roll call: every well-formed attempt is deferred.
const ROLL_CALL_STAGE: u32 = 0;

/// Controller settings extracted from [`Config`].
#[derive(Clone, Debug)]
pub struct ControllerParams {
    /// Base difficulty per stage; its length is `K`.
    pub weights: Vec<u32>,
    /// Range of the per-attempt threshold roll.
    pub threshold_roll: RangeInclusive<u32>,
    /// Bound on waiting for the next submission (`None` = unbounded).
    pub inbound_timeout: Option<Duration>,
    /// Bound on delivering a reply (`None` = unbounded).
    pub reply_timeout: Option<Duration>,
    /// Run the roll call before stage 1.
    pub roll_call: bool,
}

impl ControllerParams {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            weights: cfg.stage_weights.clone(),
            threshold_roll: cfg.threshold_roll.clone(),
            inbound_timeout: cfg.inbound_timeout(),
            reply_timeout: cfg.reply_timeout(),
            roll_call: cfg.roll_call,
        }
    }
}

/// Controller tallies for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerReport {
    /// One summary per stage, in order.
    pub stages: Vec<StageSummary>,
    /// Inbound messages dropped (stale, duplicate, unknown, malformed).
    pub discarded: u32,
    /// Attempts held back until their stage opened.
    pub deferred: u32,
}

impl ControllerReport {
    pub fn total_verdicts(&self) -> u32 {
        self.stages.iter().map(|s| s.verdicts).sum()
    }

    pub fn total_retries(&self) -> u32 {
        self.stages.iter().map(|s| s.retries).sum()
    }
}

enum Disposition {
    Judge,
    Defer,
    Discard(DiscardReason),
}

/// Drives the cohort through every stage.
pub struct Controller {
    params: ControllerParams,
    dice: Box<dyn Dice>,
    inbound: mpsc::Receiver<Inbound>,
    replies: HashMap<WorkerId, mpsc::Sender<Reply>>,
    deferred: VecDeque<Attempt>,
    bus: Bus,
    report: ControllerReport,
}

impl Controller {
    /// Creates a controller for the cohort described by `replies` (one sender per worker).
    pub fn new(
        params: ControllerParams,
        dice: Box<dyn Dice>,
        inbound: mpsc::Receiver<Inbound>,
        replies: HashMap<WorkerId, mpsc::Sender<Reply>>,
        bus: Bus,
    ) -> Self {
        Self {
            params,
            dice,
            inbound,
            replies,
            deferred: VecDeque::new(),
            bus,
            report: ControllerReport::default(),
        }
    }

    /// Cohort size `N`.
    pub fn cohort(&self) -> usize {
        self.replies.len()
    }

    /// Stage count `K`.
    pub fn stages(&self) -> u32 {
        self.params.weights.len() as u32
    }

    /// Runs the roll call (if enabled) and every stage.
    ///
    /// Returns once the last stage's barrier is satisfied; the submission channel
    /// is no longer consumed after that.
    pub async fn run(mut self, token: CancellationToken) -> Result<ControllerReport, RuntimeError> {
        if self.params.roll_call {
            self.roll_call(&token).await?;
        }
        for stage in 1..=self.stages() {
            let summary = self.run_stage(stage, &token).await?;
            self.report.stages.push(summary);
        }
        Ok(self.report)
    }

    /// Sends the roll call to every worker and waits for all of them to answer.
    async fn roll_call(&mut self, token: &CancellationToken) -> Result<(), RuntimeError> {
        let mut ids: Vec<WorkerId> = self.replies.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            self.reply(id, Reply::RollCall, token).await?;
        }
        self.bus.publish(Event::new(EventKind::RollCallSent));

        let mut state = StageState::new(ROLL_CALL_STAGE);
        while !state.is_complete(self.cohort()) {
            match self.next(token).await? {
                Inbound::Here(id) if self.replies.contains_key(&id) && !state.has_passed(id) => {
                    state.record(id, Outcome::Pass);
                    self.bus
                        .publish(Event::new(EventKind::WorkerPresent).with_worker(id));
                }
                Inbound::Here(id) => self.discard_presence(id),
                Inbound::Attempt(a) => self.dispatch(&mut state, a, token).await?,
            }
        }
        Ok(())
    }

    /// Processes one stage until every worker passed it.
    async fn run_stage(
        &mut self,
        stage: u32,
        token: &CancellationToken,
    ) -> Result<StageSummary, RuntimeError> {
        let mut state = StageState::new(stage);
        self.bus
            .publish(Event::new(EventKind::StageOpened).with_stage(stage));

        let (ready, later): (VecDeque<Attempt>, VecDeque<Attempt>) = self
            .deferred
            .drain(..)
            .partition(|a| a.stage == stage);
        self.deferred = later;
        for a in ready {
            self.dispatch(&mut state, a, token).await?;
        }

        while !state.is_complete(self.cohort()) {
            match self.next(token).await? {
                Inbound::Here(id) => self.discard_presence(id),
                Inbound::Attempt(a) => self.dispatch(&mut state, a, token).await?,
            }
        }

        let summary = state.finish();
        self.bus.publish(
            Event::new(EventKind::StageCompleted)
                .with_stage(stage)
                .with_attempt(summary.verdicts),
        );
        Ok(summary)
    }

    async fn next(&mut self, token: &CancellationToken) -> Result<Inbound, RuntimeError> {
        Wait::new("await submission", Entity::Controller, token)
            .bounded(self.params.inbound_timeout)
            .recv(&mut self.inbound)
            .await
    }

    fn classify(&self, state: &StageState, a: &Attempt) -> Disposition {
        if !self.replies.contains_key(&a.worker) {
            Disposition::Discard(DiscardReason::UnknownSender)
        } else if a.stage == 0 || a.stage > self.stages() {
            Disposition::Discard(DiscardReason::Malformed)
        } else if a.stage < state.stage() {
            Disposition::Discard(DiscardReason::Stale)
        } else if a.stage > state.stage() {
            Disposition::Defer
        } else if state.has_passed(a.worker) {
            Disposition::Discard(DiscardReason::Duplicate)
        } else {
            Disposition::Judge
        }
    }

    async fn dispatch(
        &mut self,
        state: &mut StageState,
        a: Attempt,
        token: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        match self.classify(state, &a) {
            Disposition::Judge => self.judge(state, a, token).await,
            Disposition::Defer => {
                self.report.deferred += 1;
                self.bus.publish(
                    Event::new(EventKind::AttemptDeferred)
                        .with_worker(a.worker)
                        .with_stage(a.stage)
                        .with_score(a.score),
                );
                self.deferred.push_back(a);
                self.reply(a.worker, Reply::Deferred { stage: a.stage }, token)
                    .await
            }
            Disposition::Discard(reason) => {
                self.discard(
                    Event::new(EventKind::MessageDiscarded)
                        .with_worker(a.worker)
                        .with_stage(a.stage)
                        .with_discard(reason),
                );
                Ok(())
            }
        }
    }

    /// Rolls a fresh threshold, records the verdict and delivers it.
    async fn judge(
        &mut self,
        state: &mut StageState,
        a: Attempt,
        token: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        let weight = self.weight(a.stage);
        let roll = self
            .dice
            .roll(Draw::Threshold, self.params.threshold_roll.clone());
        let threshold = weight.saturating_add(roll);
        let outcome = Outcome::judge(a.score, threshold);
        state.record(a.worker, outcome);

        self.bus.publish(
            Event::new(EventKind::VerdictIssued)
                .with_worker(a.worker)
                .with_stage(a.stage)
                .with_score(a.score)
                .with_threshold(threshold)
                .with_outcome(outcome),
        );
        let verdict = Verdict {
            outcome,
            stage: a.stage,
        };
        self.reply(a.worker, Reply::Verdict(verdict), token).await
    }

    async fn reply(
        &mut self,
        worker: WorkerId,
        msg: Reply,
        token: &CancellationToken,
    ) -> Result<(), RuntimeError> {
        let wait = Wait::new("send reply", Entity::Controller, token)
            .bounded(self.params.reply_timeout);
        match self.replies.get(&worker) {
            Some(tx) => wait.send(tx, msg).await,
            None => Err(RuntimeError::Transport {
                op: "send reply",
                entity: Entity::Controller,
            }),
        }
    }

    /// Weight of a stage already known to be in `[1, K]`.
    fn weight(&self, stage: u32) -> u32 {
        stage
            .checked_sub(1)
            .and_then(|i| self.params.weights.get(i as usize))
            .copied()
            .unwrap_or_default()
    }

    fn discard_presence(&mut self, id: WorkerId) {
        let reason = if self.replies.contains_key(&id) {
            DiscardReason::UnexpectedPresence
        } else {
            DiscardReason::UnknownSender
        };
        self.discard(
            Event::new(EventKind::MessageDiscarded)
                .with_worker(id)
                .with_discard(reason),
        );
    }

    fn discard(&mut self, ev: Event) {
        self.report.discarded += 1;
        tracing::debug!(worker = ?ev.worker, stage = ?ev.stage, reason = ?ev.discard, "inbound message discarded");
        self.bus.publish(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedDice;
    use tokio::task::JoinHandle;

    /// A controller wired to hand-driven fake workers.
    struct Rig {
        inbound: mpsc::Sender<Inbound>,
        replies: HashMap<WorkerId, mpsc::Receiver<Reply>>,
        events: tokio::sync::broadcast::Receiver<Event>,
        run: JoinHandle<Result<ControllerReport, RuntimeError>>,
    }

    fn rig(cohort: u32, weights: Vec<u32>, roll_call: bool, dice: ScriptedDice) -> Rig {
        let bus = Bus::new(1024);
        let events = bus.subscribe();
        let (inbound, inbound_rx) = mpsc::channel(64);
        let mut senders = HashMap::new();
        let mut replies = HashMap::new();
        for raw in 1..=cohort {
            let (tx, rx) = mpsc::channel(1);
            senders.insert(WorkerId::new(raw), tx);
            replies.insert(WorkerId::new(raw), rx);
        }
        let params = ControllerParams {
            weights,
            threshold_roll: 1..=20,
            inbound_timeout: Some(Duration::from_secs(5)),
            reply_timeout: Some(Duration::from_secs(5)),
            roll_call,
        };
        let ctl = Controller::new(params, Box::new(dice), inbound_rx, senders, bus);
        let run = tokio::spawn(ctl.run(CancellationToken::new()));
        Rig {
            inbound,
            replies,
            events,
            run,
        }
    }

    fn attempt(worker: u32, stage: u32, score: u32) -> Inbound {
        Inbound::Attempt(Attempt {
            worker: WorkerId::new(worker),
            stage,
            score,
        })
    }

    impl Rig {
        async fn submit(&self, msg: Inbound) {
            self.inbound.send(msg).await.unwrap();
        }

        async fn reply(&mut self, worker: u32) -> Reply {
            let rx = self.replies.get_mut(&WorkerId::new(worker)).unwrap();
            rx.recv().await.unwrap()
        }

        async fn verdict(&mut self, worker: u32) -> Verdict {
            match self.reply(worker).await {
                Reply::Verdict(v) => v,
                other => panic!("expected verdict, got {other:?}"),
            }
        }

        fn drain(&mut self) -> Vec<Event> {
            let mut out = Vec::new();
            while let Ok(ev) = self.events.try_recv() {
                out.push(ev);
            }
            out
        }
    }

    fn threshold_fixed(v: u32) -> ScriptedDice {
        ScriptedDice::new().fixed(Draw::Threshold, v)
    }

    #[tokio::test]
    async fn test_verdict_uses_weight_plus_roll() {
        let mut r = rig(1, vec![5], false, threshold_fixed(10));
        r.submit(attempt(1, 1, 14)).await;
        assert_eq!(
            r.verdict(1).await,
            Verdict {
                outcome: Outcome::Retry,
                stage: 1
            }
        );
        r.submit(attempt(1, 1, 15)).await;
        assert_eq!(r.verdict(1).await.outcome, Outcome::Pass);

        let report = r.run.await.unwrap().unwrap();
        assert_eq!(report.total_verdicts(), 2);
        assert_eq!(report.total_retries(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_pass_is_not_counted() {
        let mut r = rig(2, vec![0], false, threshold_fixed(1));
        r.submit(attempt(1, 1, 50)).await;
        assert_eq!(r.verdict(1).await.outcome, Outcome::Pass);
        // Same worker again for the stage it already passed.
        r.submit(attempt(1, 1, 50)).await;
        r.submit(attempt(2, 1, 50)).await;
        assert_eq!(r.verdict(2).await.outcome, Outcome::Pass);

        let report = (&mut r.run).await.unwrap().unwrap();
        assert_eq!(report.stages[0].verdicts, 2);
        assert_eq!(report.discarded, 1);

        let events = r.drain();
        let dup = events
            .iter()
            .find(|e| e.kind == EventKind::MessageDiscarded)
            .unwrap();
        assert_eq!(dup.discard, Some(DiscardReason::Duplicate));
        assert_eq!(dup.worker, Some(WorkerId::new(1)));
    }

    #[tokio::test]
    async fn test_stale_attempt_is_dropped() {
        let mut r = rig(2, vec![0, 0], false, threshold_fixed(1));
        for w in 1..=2 {
            r.submit(attempt(w, 1, 50)).await;
            assert_eq!(r.verdict(w).await.outcome, Outcome::Pass);
        }
        // Stage 2 is active now; a stage-1 message is stale.
        r.submit(attempt(1, 1, 50)).await;
        for w in 1..=2 {
            r.submit(attempt(w, 2, 50)).await;
            assert_eq!(r.verdict(w).await.stage, 2);
        }

        let report = (&mut r.run).await.unwrap().unwrap();
        assert_eq!(report.discarded, 1);
        assert_eq!(report.stages[1].verdicts, 2);
        let stale: Vec<_> = r
            .drain()
            .into_iter()
            .filter(|e| e.discard == Some(DiscardReason::Stale))
            .collect();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].stage, Some(1));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_are_dropped() {
        let mut r = rig(1, vec![0], false, threshold_fixed(1));
        r.submit(attempt(9, 1, 50)).await;
        r.submit(attempt(1, 0, 50)).await;
        r.submit(attempt(1, 7, 50)).await;
        r.submit(Inbound::Here(WorkerId::new(1))).await;
        r.submit(attempt(1, 1, 50)).await;
        assert_eq!(r.verdict(1).await.outcome, Outcome::Pass);

        let report = (&mut r.run).await.unwrap().unwrap();
        assert_eq!(report.discarded, 4);
        let reasons: Vec<_> = r
            .drain()
            .into_iter()
            .filter_map(|e| e.discard)
            .collect();
        assert_eq!(
            reasons,
            vec![
                DiscardReason::UnknownSender,
                DiscardReason::Malformed,
                DiscardReason::Malformed,
                DiscardReason::UnexpectedPresence,
            ]
        );
    }

    #[tokio::test]
    async fn test_future_stage_attempt_waits_for_barrier() {
        let mut r = rig(2, vec![0, 0], false, threshold_fixed(1));
        r.submit(attempt(1, 1, 50)).await;
        assert_eq!(r.verdict(1).await.outcome, Outcome::Pass);

        // Worker 1 is already on stage 2 while worker 2 has not passed stage 1.
        r.submit(attempt(1, 2, 50)).await;
        assert_eq!(r.reply(1).await, Reply::Deferred { stage: 2 });
        r.submit(attempt(2, 1, 0)).await;
        assert_eq!(r.verdict(2).await.outcome, Outcome::Retry);
        assert!(r.replies.get_mut(&WorkerId::new(1)).unwrap().try_recv().is_err());

        r.submit(attempt(2, 1, 50)).await;
        assert_eq!(r.verdict(2).await.outcome, Outcome::Pass);
        // Barrier satisfied: the deferred stage-2 attempt is judged first.
        assert_eq!(r.verdict(1).await.stage, 2);
        r.submit(attempt(2, 2, 50)).await;
        assert_eq!(r.verdict(2).await.stage, 2);

        let report = (&mut r.run).await.unwrap().unwrap();
        assert_eq!(report.deferred, 1);

        let events = r.drain();
        let completed_1 = events
            .iter()
            .position(|e| e.kind == EventKind::StageCompleted && e.stage == Some(1))
            .unwrap();
        let first_stage_2 = events
            .iter()
            .position(|e| e.kind == EventKind::VerdictIssued && e.stage == Some(2))
            .unwrap();
        assert!(completed_1 < first_stage_2);
    }

    #[tokio::test]
    async fn test_roll_call_precedes_stage_one() {
        let mut r = rig(2, vec![0], true, threshold_fixed(1));
        for raw in 1..=2 {
            let rx = r.replies.get_mut(&WorkerId::new(raw)).unwrap();
            assert_eq!(rx.recv().await, Some(Reply::RollCall));
        }
        // An early attempt is deferred until stage 1 opens.
        r.submit(attempt(1, 1, 50)).await;
        r.submit(Inbound::Here(WorkerId::new(1))).await;
        r.submit(Inbound::Here(WorkerId::new(1))).await;
        r.submit(Inbound::Here(WorkerId::new(2))).await;
        assert_eq!(r.reply(1).await, Reply::Deferred { stage: 1 });
        assert_eq!(r.verdict(1).await.outcome, Outcome::Pass);
        r.submit(attempt(2, 1, 50)).await;
        assert_eq!(r.verdict(2).await.outcome, Outcome::Pass);

        let report = (&mut r.run).await.unwrap().unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(report.discarded, 1);

        let kinds: Vec<_> = r.drain().into_iter().map(|e| e.kind).collect();
        let present = kinds
            .iter()
            .filter(|k| **k == EventKind::WorkerPresent)
            .count();
        assert_eq!(present, 2);
        let opened = kinds
            .iter()
            .position(|k| *k == EventKind::StageOpened)
            .unwrap();
        let last_present = kinds
            .iter()
            .rposition(|k| *k == EventKind::WorkerPresent)
            .unwrap();
        assert!(last_present < opened);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_timeout_is_fatal() {
        let bus = Bus::new(16);
        let (_inbound, inbound_rx) = mpsc::channel(4);
        let (tx, _rx) = mpsc::channel(1);
        let params = ControllerParams {
            weights: vec![1],
            threshold_roll: 1..=20,
            inbound_timeout: Some(Duration::from_millis(30)),
            reply_timeout: None,
            roll_call: false,
        };
        let ctl = Controller::new(
            params,
            Box::new(ScriptedDice::new()),
            inbound_rx,
            HashMap::from([(WorkerId::new(1), tx)]),
            bus,
        );
        let err = ctl.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Timeout {
                op: "await submission",
                entity: Entity::Controller,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_reply_to_gone_worker_is_fatal() {
        let mut r = rig(1, vec![0], false, threshold_fixed(1));
        r.replies.clear();
        r.submit(attempt(1, 1, 50)).await;
        let err = r.run.await.unwrap().unwrap_err();
        assert!(matches!(err, RuntimeError::Transport { op: "send reply", .. }));
    }
}
