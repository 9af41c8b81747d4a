//! # Worker: one cohort member's stage-attempt loop.
//!
//! A worker owns no shared memory. It talks to the controller only through the
//! shared submission channel (send) and its private reply channel (receive).
//!
//! ## Flow
//! ```text
//! Worker::run()
//!   ├─► [roll call] await Reply::RollCall ─► send Inbound::Here
//!   └─► for stage in 1..=K {
//!         loop {
//!           ├─► sleep(think time)              (cancellable)
//!           ├─► score = skill + bonus          (fresh bonus per attempt)
//!           ├─► publish AttemptSubmitted
//!           ├─► send Inbound::Attempt          (bounded, cancellable)
//!           ├─► await Reply::Verdict           (bounded, cancellable)
//!           │     ├─ Deferred(stage) ─► await verdict at the barrier (unbounded, cancellable)
//!           │     ├─ stage mismatch ─► ProtocolViolation (fatal)
//!           │     ├─ Pass  ─► next stage
//!           │     └─ Retry ─► same stage again
//!         }
//!       }
//!       publish WorkerFinished
//! ```
//!
//! ## Rules
//! - Skill is drawn **once** at construction and never changes
//! - Attempts run **sequentially**: attempt `i+1` is never sent before verdict `i`
//! - The local stage counter advances **only** on a `Pass` for that stage
//! - Any send/receive failure is fatal (the worker has no recovery path)
//! - Time spent held at a stage barrier is not charged to `reply_timeout`;
//!   the controller's inbound bound covers a stalled cohort instead

use std::ops::RangeInclusive;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        Config,
        exchange::{Wait, pause},
    },
    error::{Entity, RuntimeError},
    events::{Bus, Event, EventKind},
    protocol::{Attempt, Inbound, Outcome, Reply, Verdict, WorkerId},
    random::{Dice, Draw},
};

/// Parameters shared by every worker of a run.
#[derive(Clone, Debug)]
pub struct WorkerParams {
    /// Stage count `K`.
    pub stages: u32,
    /// Range the per-attempt bonus is drawn from.
    pub bonus: RangeInclusive<u32>,
    /// Range the think time is drawn from (milliseconds).
    pub think_ms: RangeInclusive<u32>,
    /// Bound on every send and receive (`None` = unbounded), except the wait
    /// for a verdict after a deferral notice.
    pub reply_timeout: Option<Duration>,
    /// Wait for the roll call before stage 1.
    pub roll_call: bool,
}

impl WorkerParams {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            stages: cfg.stages(),
            bonus: cfg.bonus.clone(),
            think_ms: cfg.think_ms.clone(),
            reply_timeout: cfg.reply_timeout(),
            roll_call: cfg.roll_call,
        }
    }
}

/// What a worker reports after passing every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: WorkerId,
    /// Skill level drawn at spawn.
    pub skill: u32,
    /// Attempts needed per stage (index 0 = stage 1).
    pub attempts: Vec<u32>,
}

impl WorkerReport {
    /// Attempts across all stages.
    pub fn total_attempts(&self) -> u32 {
        self.attempts.iter().sum()
    }
}

/// One cohort member.
pub struct Worker {
    id: WorkerId,
    skill: u32,
    params: WorkerParams,
    dice: Box<dyn Dice>,
    submit: mpsc::Sender<Inbound>,
    replies: mpsc::Receiver<Reply>,
    bus: Bus,
}

impl Worker {
    /// Creates a worker and draws its skill level from `skill`.
    pub fn new(
        id: WorkerId,
        mut dice: Box<dyn Dice>,
        skill: RangeInclusive<u32>,
        params: WorkerParams,
        submit: mpsc::Sender<Inbound>,
        replies: mpsc::Receiver<Reply>,
        bus: Bus,
    ) -> Self {
        let skill = dice.roll(Draw::Skill, skill);
        Self {
            id,
            skill,
            params,
            dice,
            submit,
            replies,
            bus,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn skill(&self) -> u32 {
        self.skill
    }

    /// Runs every stage to completion, or until a fatal error or cancellation.
    ///
    /// Publishes `WorkerFinished` on success and `WorkerFailed` otherwise
    /// (cancellation included).
    pub async fn run(mut self, token: CancellationToken) -> Result<WorkerReport, RuntimeError> {
        let mut attempts = Vec::with_capacity(self.params.stages as usize);
        let res = self.drive(&token, &mut attempts).await;

        match res {
            Ok(()) => {
                let report = WorkerReport {
                    id: self.id,
                    skill: self.skill,
                    attempts,
                };
                self.bus.publish(
                    Event::new(EventKind::WorkerFinished)
                        .with_worker(self.id)
                        .with_attempt(report.total_attempts()),
                );
                Ok(report)
            }
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::WorkerFailed)
                        .with_worker(self.id)
                        .with_stage(attempts.len() as u32 + 1)
                        .with_reason(e.to_string()),
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        token: &CancellationToken,
        attempts: &mut Vec<u32>,
    ) -> Result<(), RuntimeError> {
        if self.params.roll_call {
            self.answer_roll_call(token).await?;
        }
        for stage in 1..=self.params.stages {
            let n = self.pass_stage(stage, token).await?;
            attempts.push(n);
        }
        Ok(())
    }

    fn wait<'a>(&self, op: &'static str, token: &'a CancellationToken) -> Wait<'a> {
        Wait::new(op, Entity::Worker(self.id), token).bounded(self.params.reply_timeout)
    }

    /// Waits for the roll call and answers it.
    ///
    /// A verdict or deferral notice before the roll call is a protocol violation (`expected = 0`).
    async fn answer_roll_call(&mut self, token: &CancellationToken) -> Result<(), RuntimeError> {
        let got = match self.wait("await roll call", token).recv(&mut self.replies).await? {
            Reply::RollCall => None,
            Reply::Verdict(Verdict { stage, .. }) | Reply::Deferred { stage } => Some(stage),
        };
        if let Some(got) = got {
            return Err(RuntimeError::ProtocolViolation {
                worker: self.id,
                expected: 0,
                got,
            });
        }
        self.wait("answer roll call", token)
            .send(&self.submit, Inbound::Here(self.id))
            .await
    }

    /// Attempts `stage` until it is passed; returns the number of attempts.
    async fn pass_stage(&mut self, stage: u32, token: &CancellationToken) -> Result<u32, RuntimeError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt_once(stage, attempt, token).await? {
                Outcome::Pass => return Ok(attempt),
                Outcome::Retry => continue,
            }
        }
    }

    /// One attempt: think, roll, submit, await exactly one verdict.
    async fn attempt_once(
        &mut self,
        stage: u32,
        attempt: u32,
        token: &CancellationToken,
    ) -> Result<Outcome, RuntimeError> {
        let think_ms = self.dice.roll(Draw::ThinkTime, self.params.think_ms.clone());
        let think = Duration::from_millis(u64::from(think_ms));
        pause(think, Entity::Worker(self.id), token).await?;

        let bonus = self.dice.roll(Draw::Bonus, self.params.bonus.clone());
        let score = self.skill.saturating_add(bonus);

        self.bus.publish(
            Event::new(EventKind::AttemptSubmitted)
                .with_worker(self.id)
                .with_stage(stage)
                .with_score(score)
                .with_attempt(attempt)
                .with_delay(think),
        );
        let msg = Inbound::Attempt(Attempt {
            worker: self.id,
            stage,
            score,
        });
        self.wait("submit attempt", token).send(&self.submit, msg).await?;

        // Reply::RollCall mid-run is reported as `got = 0`.
        let mut wait = self.wait("await verdict", token);
        let mut held = false;
        let got = loop {
            match wait.recv(&mut self.replies).await? {
                Reply::Verdict(v) if v.stage == stage => return Ok(v.outcome),
                Reply::Deferred { stage: s } if s == stage && !held => {
                    held = true;
                    wait = Wait::new("await barrier", Entity::Worker(self.id), token);
                }
                Reply::Verdict(Verdict { stage: got, .. }) | Reply::Deferred { stage: got } => {
                    break got;
                }
                Reply::RollCall => break 0,
            }
        };
        Err(RuntimeError::ProtocolViolation {
            worker: self.id,
            expected: stage,
            got,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedDice;

    struct Harness {
        worker: Worker,
        inbound: mpsc::Receiver<Inbound>,
        replies: mpsc::Sender<Reply>,
    }

    fn harness(stages: u32, roll_call: bool, dice: ScriptedDice) -> Harness {
        let (submit, inbound) = mpsc::channel(8);
        let (replies, reply_rx) = mpsc::channel(1);
        let params = WorkerParams {
            stages,
            bonus: 1..=20,
            think_ms: 0..=0,
            reply_timeout: Some(Duration::from_secs(5)),
            roll_call,
        };
        let worker = Worker::new(
            WorkerId::new(1),
            Box::new(dice),
            3..=9,
            params,
            submit,
            reply_rx,
            Bus::new(64),
        );
        Harness {
            worker,
            inbound,
            replies,
        }
    }

    fn verdict(outcome: Outcome, stage: u32) -> Reply {
        Reply::Verdict(Verdict { outcome, stage })
    }

    #[tokio::test]
    async fn test_retries_until_pass_then_advances() {
        let dice = ScriptedDice::new()
            .fixed(Draw::Skill, 4)
            .with(Draw::Bonus, [1, 2, 3]);
        let mut h = harness(2, false, dice);
        assert_eq!(h.worker.skill(), 4);
        let run = tokio::spawn(h.worker.run(CancellationToken::new()));

        let mut scores = Vec::new();
        for (outcome, stage) in [
            (Outcome::Retry, 1),
            (Outcome::Pass, 1),
            (Outcome::Pass, 2),
        ] {
            let Some(Inbound::Attempt(a)) = h.inbound.recv().await else {
                panic!("expected attempt");
            };
            assert_eq!(a.stage, stage);
            scores.push(a.score);
            h.replies.send(verdict(outcome, stage)).await.unwrap();
        }

        let report = run.await.unwrap().unwrap();
        assert_eq!(scores, vec![5, 6, 7]);
        assert_eq!(report.attempts, vec![2, 1]);
        assert_eq!(report.total_attempts(), 3);
    }

    #[tokio::test]
    async fn test_answers_roll_call_before_attempting() {
        let mut h = harness(1, true, ScriptedDice::new());
        let run = tokio::spawn(h.worker.run(CancellationToken::new()));

        h.replies.send(Reply::RollCall).await.unwrap();
        assert_eq!(h.inbound.recv().await, Some(Inbound::Here(WorkerId::new(1))));
        assert!(matches!(h.inbound.recv().await, Some(Inbound::Attempt(_))));
        h.replies.send(verdict(Outcome::Pass, 1)).await.unwrap();

        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_verdict_for_other_stage_is_fatal() {
        let mut h = harness(2, false, ScriptedDice::new());
        let run = tokio::spawn(h.worker.run(CancellationToken::new()));

        assert!(h.inbound.recv().await.is_some());
        h.replies.send(verdict(Outcome::Pass, 2)).await.unwrap();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ProtocolViolation {
                expected: 1,
                got: 2,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_verdict_times_out() {
        let (submit, _inbound) = mpsc::channel(8);
        let (_replies, reply_rx) = mpsc::channel(1);
        let params = WorkerParams {
            stages: 1,
            bonus: 1..=20,
            think_ms: 0..=0,
            reply_timeout: Some(Duration::from_millis(30)),
            roll_call: false,
        };
        let worker = Worker::new(
            WorkerId::new(4),
            Box::new(ScriptedDice::new()),
            3..=9,
            params,
            submit,
            reply_rx,
            Bus::new(8),
        );

        let err = worker.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { op: "await verdict", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_barrier_wait_is_not_bounded_by_reply_timeout() {
        let (submit, mut inbound) = mpsc::channel(8);
        let (replies, reply_rx) = mpsc::channel(1);
        let params = WorkerParams {
            stages: 1,
            bonus: 1..=20,
            think_ms: 0..=0,
            reply_timeout: Some(Duration::from_millis(30)),
            roll_call: false,
        };
        let worker = Worker::new(
            WorkerId::new(2),
            Box::new(ScriptedDice::new()),
            3..=9,
            params,
            submit,
            reply_rx,
            Bus::new(8),
        );
        let run = tokio::spawn(worker.run(CancellationToken::new()));

        assert!(matches!(inbound.recv().await, Some(Inbound::Attempt(_))));
        replies.send(Reply::Deferred { stage: 1 }).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        replies.send(verdict(Outcome::Pass, 1)).await.unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.attempts, vec![1]);
    }

    #[tokio::test]
    async fn test_deferral_for_other_stage_is_fatal() {
        let mut h = harness(2, false, ScriptedDice::new());
        let run = tokio::spawn(h.worker.run(CancellationToken::new()));

        assert!(h.inbound.recv().await.is_some());
        h.replies.send(Reply::Deferred { stage: 2 }).await.unwrap();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ProtocolViolation {
                expected: 1,
                got: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_closed_reply_channel_is_fatal() {
        let h = harness(1, false, ScriptedDice::new());
        drop(h.replies);
        let _inbound = h.inbound;
        let err = h.worker.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Transport { op: "await verdict", .. }));
    }

    #[tokio::test]
    async fn test_cancellation_stops_worker() {
        let h = harness(1, true, ScriptedDice::new());
        let token = CancellationToken::new();
        let run = tokio::spawn(h.worker.run(token.clone()));
        token.cancel();

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, RuntimeError::Canceled { .. }));
        drop(h.replies);
    }
}
