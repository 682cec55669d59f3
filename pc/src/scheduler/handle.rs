//! Public handle for the pacer scheduler
//!
//! A [`Pacer`] is a cheap, cloneable handle to one scheduler actor. Accepting
//! a call never blocks and never fails synchronously: `submit` only appends a
//! command and hands back the deferred result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::domain::Target;
use crate::error::{CallError, DEFAULT_ABORT_REASON, PacerError};
use crate::retry::Next;

use super::config::PacerConfig;
use super::core::PacerCore;
use super::messages::{Command, PacerStats, QueueState};

/// Handle to a running pacer scheduler
pub struct Pacer<T, E> {
    tx: mpsc::UnboundedSender<Command<T, E>>,
}

impl<T, E> Clone for Pacer<T, E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T, E> Pacer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Spawn a new scheduler actor with the given configuration
    pub fn spawn(config: PacerConfig) -> Self {
        let (core, tx) = PacerCore::new(config);
        tokio::spawn(core.run());
        Self { tx }
    }

    /// Enqueue one call and return its deferred result.
    ///
    /// The target is a re-invocable closure: it is called once per attempt,
    /// so retries get a fresh future each time.
    pub fn submit<F, Fut>(&self, mut target: F) -> CallResult<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (settle_tx, settle_rx) = oneshot::channel();
        let target: Target<T, E> = Box::new(move || Box::pin(target()));

        // a failed send drops the settlement, which the caller observes as
        // the default abort; submit itself never fails
        if self
            .tx
            .send(Command::Submit {
                target,
                settlement: settle_tx,
            })
            .is_err()
        {
            debug!("submit after scheduler stopped");
        }

        CallResult { rx: settle_rx }
    }

    /// Turn an async function into its scheduled counterpart.
    ///
    /// The argument is cloned per attempt so retries can re-invoke the
    /// function.
    pub fn wrap<A, F, Fut>(&self, f: F) -> impl Fn(A) -> CallResult<T, E>
    where
        A: Clone + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let f = Arc::new(f);
        let pacer = self.clone();
        move |arg: A| {
            let f = Arc::clone(&f);
            pacer.submit(move || f(arg.clone()))
        }
    }

    /// Register an error classifier; the most recently registered wins
    pub fn register_classifier<C>(&self, classifier: C)
    where
        C: Fn(&E, Next<'_, E>) -> bool + Send + Sync + 'static,
    {
        let _ = self.tx.send(Command::Register {
            classifier: Box::new(classifier),
        });
    }

    /// Reject all pending calls with the supplied reason (or the default).
    ///
    /// In-flight targets are not aborted; their eventual outcomes are
    /// discarded. Calls submitted after the reset are unaffected.
    pub fn reset(&self, reason: Option<String>) {
        let _ = self.tx.send(Command::Reset { reason });
    }

    /// Snapshot current queue counts
    pub async fn queue_state(&self) -> Result<QueueState, PacerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::QueueState { reply: reply_tx })
            .map_err(|_| PacerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| PacerError::ChannelClosed)
    }

    /// Snapshot lifetime counters
    pub async fn stats(&self) -> Result<PacerStats, PacerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Stats { reply: reply_tx })
            .map_err(|_| PacerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| PacerError::ChannelClosed)
    }

    /// Stop the scheduler; anything unsettled rejects with the default reason
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

/// Deferred result of one submitted call
pub struct CallResult<T, E> {
    rx: oneshot::Receiver<Result<T, CallError<E>>>,
}

impl<T, E> Future for CallResult<T, E> {
    type Output = Result<T, CallError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|settled| match settled {
            Ok(outcome) => outcome,
            // the scheduler dropped the settlement without firing it
            Err(_) => Err(CallError::Aborted(DEFAULT_ABORT_REASON.to_string())),
        })
    }
}
