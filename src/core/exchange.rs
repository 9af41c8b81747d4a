//! # Bounded, cancellable channel operations.
//!
//! Every suspension point of a run goes through this module so that each wait has
//! an explicit bound and a cancellation path:
//!
//! ```text
//! worker:      pause(think)  ─► send(submission) ─► recv(reply)
//! controller:  recv(submission) ─► send(reply)
//! ```
//!
//! ## Rules
//! - Cancellation wins over a ready value (`biased` select) → `Canceled`
//! - A closed channel → `Transport`
//! - An expired bound → `Timeout` (treated as a transport failure, never a silent hang)
//! - `bound = None` waits indefinitely (still cancellable)

use std::future::Future;
use std::time::Duration;

use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;

use crate::error::{Entity, RuntimeError};

/// Who is waiting, on what, and for how long.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Wait<'a> {
    pub op: &'static str,
    pub entity: Entity,
    pub bound: Option<Duration>,
    pub token: &'a CancellationToken,
}

impl<'a> Wait<'a> {
    pub fn new(op: &'static str, entity: Entity, token: &'a CancellationToken) -> Self {
        Self {
            op,
            entity,
            bound: None,
            token,
        }
    }

    pub fn bounded(mut self, bound: Option<Duration>) -> Self {
        self.bound = bound;
        self
    }

    fn closed(&self) -> RuntimeError {
        RuntimeError::Transport {
            op: self.op,
            entity: self.entity,
        }
    }

    /// Drives `fut` under this wait's bound and token.
    async fn run<T>(&self, fut: impl Future<Output = Option<T>>) -> Result<T, RuntimeError> {
        let bounded = async {
            match self.bound {
                Some(after) => match time::timeout(after, fut).await {
                    Ok(v) => v.ok_or_else(|| self.closed()),
                    Err(_elapsed) => Err(RuntimeError::Timeout {
                        op: self.op,
                        entity: self.entity,
                        after,
                    }),
                },
                None => fut.await.ok_or_else(|| self.closed()),
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RuntimeError::Canceled { entity: self.entity }),
            res = bounded => res,
        }
    }

    /// Receives one message.
    pub async fn recv<T>(&self, rx: &mut mpsc::Receiver<T>) -> Result<T, RuntimeError> {
        self.run(rx.recv()).await
    }

    /// Sends one message, waiting for capacity if needed.
    pub async fn send<T>(&self, tx: &mpsc::Sender<T>, msg: T) -> Result<(), RuntimeError> {
        self.run(async { tx.send(msg).await.ok() }).await
    }
}

/// Sleeps for `d` unless `token` is cancelled first.
pub(crate) async fn pause(
    d: Duration,
    entity: Entity,
    token: &CancellationToken,
) -> Result<(), RuntimeError> {
    if token.is_cancelled() {
        return Err(RuntimeError::Canceled { entity });
    }
    if d.is_zero() {
        return Ok(());
    }
    let sleep = time::sleep(d);
    tokio::pin!(sleep);
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RuntimeError::Canceled { entity }),
        _ = &mut sleep => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WorkerId;

    const W: Entity = Entity::Worker(WorkerId::new(1));

    #[tokio::test(start_paused = true)]
    async fn test_recv_times_out() {
        let token = CancellationToken::new();
        let (_tx, mut rx) = mpsc::channel::<u32>(1);
        let wait = Wait::new("await verdict", W, &token).bounded(Some(Duration::from_millis(20)));

        let err = wait.recv(&mut rx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { op: "await verdict", .. }));
    }

    #[tokio::test]
    async fn test_recv_on_closed_channel_is_transport_failure() {
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<u32>(1);
        drop(tx);
        let err = Wait::new("await verdict", W, &token)
            .recv(&mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver_fails() {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(rx);
        let err = Wait::new("submit", W, &token).send(&tx, 1).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_cancellation_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let (tx, mut rx) = mpsc::channel::<u32>(1);
        tx.send(5).await.unwrap();

        let err = Wait::new("await verdict", W, &token)
            .recv(&mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Canceled { .. }));
        assert!(pause(Duration::from_secs(60), W, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_unbounded_recv_delivers() {
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<u32>(1);
        tx.send(9).await.unwrap();
        assert_eq!(Wait::new("x", W, &token).recv(&mut rx).await.unwrap(), 9);
    }
}
