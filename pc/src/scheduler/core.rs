//! Pacer actor: cycle scheduler and call lifecycle driver
//!
//! One actor task owns the entry store, the dispatch history, the classifier
//! chain, and the single armed wake-up. All state transitions and limit
//! evaluations happen on this one timeline; the public handle only sends
//! commands. Targets run as spawned tasks and report their outcome back over
//! the same command channel, so completion is never handled synchronously.

use std::time::Duration;

use entrystore::{Filter, FilterOp, IndexValue, Store};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{CallEntry, CallStatus, DispatchRecord, Settlement, Target};
use crate::error::{CallError, DEFAULT_ABORT_REASON};
use crate::retry::ClassifierChain;

use super::config::PacerConfig;
use super::limits::{concurrency_headroom, interval_headroom};
use super::messages::{Command, PacerStats, QueueState};

/// Delay before rechecking entries still in `init` (settlement not attached yet)
const INIT_SETTLE_DELAY_MS: u64 = 1;

pub(crate) struct PacerCore<T, E> {
    config: PacerConfig,
    entries: Store<CallEntry<T, E>>,
    history: Store<DispatchRecord>,
    chain: ClassifierChain<E>,

    /// Reset generation; outcomes from an older epoch are discarded
    epoch: u64,

    /// The single armed wake-up; None means idle
    next_wake: Option<Instant>,

    /// Monotonic clock origin for eligibility and history timestamps
    started: Instant,

    stats: PacerStats,
    tx: mpsc::UnboundedSender<Command<T, E>>,
    rx: mpsc::UnboundedReceiver<Command<T, E>>,
}

impl<T, E> PacerCore<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(config: PacerConfig) -> (Self, mpsc::UnboundedSender<Command<T, E>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = Self {
            config,
            entries: Store::new(),
            history: Store::new(),
            chain: ClassifierChain::new(),
            epoch: 0,
            next_wake: None,
            started: Instant::now(),
            stats: PacerStats::default(),
            tx: tx.clone(),
            rx,
        };
        (core, tx)
    }

    /// Milliseconds elapsed on this instance's monotonic clock
    fn now_ms(&self) -> i64 {
        self.started.elapsed().as_millis() as i64
    }

    /// Run the actor until shutdown or until every handle is dropped
    pub(crate) async fn run(mut self) {
        debug!(config = ?self.config, "pacer actor started");

        loop {
            let wake = self.next_wake;
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle(cmd) {
                                break;
                            }
                        }
                        // all handles dropped
                        None => break,
                    }
                }
                _ = sleep_until_opt(wake), if wake.is_some() => {
                    self.on_cycle_fire();
                }
            }
        }

        self.reject_unsettled(DEFAULT_ABORT_REASON);
        debug!("pacer actor stopped");
    }

    /// Process one command; returns true on shutdown
    fn handle(&mut self, cmd: Command<T, E>) -> bool {
        match cmd {
            Command::Submit { target, settlement } => {
                self.on_submit(target, settlement);
            }
            Command::Outcome { id, epoch, result } => {
                self.on_outcome(id, epoch, result);
            }
            Command::Register { classifier } => {
                self.chain.register_boxed(classifier);
                debug!(chain_len = self.chain.len(), "classifier registered");
            }
            Command::Reset { reason } => {
                self.on_reset(reason);
            }
            Command::QueueState { reply } => {
                let _ = reply.send(self.queue_state());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats.clone());
            }
            Command::Shutdown => {
                info!("pacer shutting down");
                return true;
            }
        }
        false
    }

    // === call acceptance ===

    fn on_submit(&mut self, target: Target<T, E>, settlement: Settlement<T, E>) {
        let entry = CallEntry::new(target, self.epoch);
        let id = self.entries.insert(entry);

        // attach the settlement and release the entry into the queue
        if let Some(entry) = self.entries.get_mut(id) {
            entry.attach_settlement(settlement);
        }

        self.stats.total_submitted += 1;
        debug!(id, "call accepted");
        self.replan();
    }

    // === cycle scheduler ===

    /// Disarm any pending wake-up and recompute it from current state.
    ///
    /// Used after every state change: a retry may need a nearer wake-up than
    /// the one armed, and planning always recomputes from the full store.
    fn replan(&mut self) {
        self.next_wake = None;
        self.plan_next_cycle();
    }

    /// Compute the delay until the next admission decision and arm the timer.
    ///
    /// No-op when a wake-up is already armed; at most one is ever outstanding.
    fn plan_next_cycle(&mut self) {
        if self.next_wake.is_some() {
            return;
        }

        let waiting = self.count_status(CallStatus::Waiting);
        let init = self.count_status(CallStatus::Init);
        if waiting == 0 && init == 0 {
            debug!("queue idle, no wake-up armed");
            return;
        }
        if waiting == 0 {
            // entries still acquiring their settlement; yield and recheck
            self.arm(INIT_SETTLE_DELAY_MS);
            return;
        }

        let now = self.now_ms();
        if interval_headroom(&self.config, &self.history, now).is_zero() {
            // headroom cannot recover sooner than one full interval
            let interval = self.config.interval_length_ms.unwrap_or(0);
            debug!(interval, "interval saturated, waking after full interval");
            self.arm(interval);
            return;
        }
        if concurrency_headroom(&self.config, &self.entries).is_zero() {
            // nothing to do until an in-flight call completes and replans
            debug!("concurrency saturated, waiting for a completion");
            return;
        }

        let due = self.entries.count(&[
            status_filter(CallStatus::Waiting),
            Filter {
                field: "eligible_at".to_string(),
                op: FilterOp::Lte,
                value: IndexValue::Int(now),
            },
        ]);
        if due > 0 {
            self.arm(0);
            return;
        }

        // wake exactly when the soonest entry becomes eligible
        let earliest = self
            .entries
            .select(&[status_filter(CallStatus::Waiting)], Some("eligible_at"), Some(1))
            .first()
            .and_then(|id| self.entries.get(*id))
            .map(|entry| entry.eligible_at)
            .unwrap_or(now);
        let delay = earliest - now;
        if delay < 0 {
            warn!(earliest, now, "negative wake-up delay, clamping to 0");
        }
        self.arm(delay.max(0) as u64);
    }

    fn arm(&mut self, delay_ms: u64) {
        self.next_wake = Some(Instant::now() + Duration::from_millis(delay_ms));
        debug!(delay_ms, "wake-up armed");
    }

    /// One dispatch cycle: recompute headroom, dispatch an eligible batch, re-plan
    fn on_cycle_fire(&mut self) {
        self.next_wake = None;

        let waiting = self.count_status(CallStatus::Waiting);
        if waiting == 0 {
            debug!("cycle fired with nothing waiting, going idle");
            return;
        }

        let now = self.now_ms();
        self.prune_history(now);

        let conc = concurrency_headroom(&self.config, &self.entries);
        let rate = interval_headroom(&self.config, &self.history, now);
        let batch = conc.cap(waiting).min(rate.cap(waiting));

        let ready = self.entries.select(
            &[
                status_filter(CallStatus::Waiting),
                Filter {
                    field: "eligible_at".to_string(),
                    op: FilterOp::Lte,
                    value: IndexValue::Int(now),
                },
            ],
            None,
            Some(batch),
        );

        if ready.is_empty() {
            self.plan_next_cycle();
            return;
        }

        debug!(batch = ready.len(), waiting, "dispatching batch");
        for id in ready {
            self.dispatch(id, now);
        }
        self.plan_next_cycle();
    }

    // === lifecycle driver ===

    /// Transition one entry to `processing` and start its target
    fn dispatch(&mut self, id: u64, now: i64) {
        let Some(entry) = self.entries.get_mut(id) else {
            warn!(id, "dispatch selected a missing entry");
            return;
        };
        entry.set_status(CallStatus::Processing);
        let epoch = entry.epoch;
        let attempt = entry.attempts + 1;
        let fut = (entry.target)();

        // history append is atomic with the waiting -> processing transition
        self.history.insert(DispatchRecord::new(id, now));
        self.stats.total_dispatched += 1;
        let processing = self.count_status(CallStatus::Processing);
        self.stats.peak_processing = self.stats.peak_processing.max(processing);
        debug!(id, attempt, "call dispatched");

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = fut.await;
            // the actor may already be gone on shutdown
            let _ = tx.send(Command::Outcome { id, epoch, result });
        });
    }

    /// Apply the outcome of one attempt: settle, fail, or reschedule
    fn on_outcome(&mut self, id: u64, epoch: u64, result: Result<T, E>) {
        if epoch != self.epoch {
            // the entry was discarded by a reset after this attempt started;
            // dropping it frees a concurrency slot, so re-plan
            debug!(id, epoch, "discarding outcome from a previous epoch");
            self.entries.remove(id);
            self.replan();
            return;
        }

        let now = self.now_ms();
        let max_attempts = self.config.max_retry_attempts;
        let retry_delay = self.config.retry_delay_ms as i64;

        match result {
            Ok(value) => {
                let Some(mut entry) = self.entries.remove(id) else {
                    warn!(id, "outcome for unknown entry");
                    return;
                };
                entry.set_status(CallStatus::Done);
                if let Some(settlement) = entry.take_settlement() {
                    let _ = settlement.send(Ok(value));
                }
                self.stats.total_completed += 1;
                debug!(id, "call completed");
            }
            Err(error) => {
                let attempts = match self.entries.get_mut(id) {
                    Some(entry) => {
                        entry.attempts += 1;
                        entry.attempts
                    }
                    None => {
                        warn!(id, "outcome for unknown entry");
                        return;
                    }
                };

                // attempt exhaustion is terminal regardless of classifier verdicts
                let exhausted = attempts >= max_attempts;
                let retry = !exhausted && self.chain.should_retry(&error);

                if retry {
                    let eligible_at = now + retry_delay;
                    if let Some(entry) = self.entries.get_mut(id) {
                        entry.eligible_at = eligible_at;
                        entry.set_status(CallStatus::Waiting);
                    }
                    self.stats.total_retries += 1;
                    debug!(id, attempts, eligible_at, "call rescheduled for retry");
                } else {
                    if let Some(mut entry) = self.entries.remove(id) {
                        entry.set_status(CallStatus::Done);
                        if let Some(settlement) = entry.take_settlement() {
                            let _ = settlement.send(Err(CallError::Failed(error)));
                        }
                    }
                    self.stats.total_failed += 1;
                    if exhausted {
                        debug!(id, attempts, "call failed terminally, attempts exhausted");
                    } else {
                        debug!(id, attempts, "call failed terminally, classifier verdict");
                    }
                }
            }
        }

        self.replan();
    }

    // === cancellation ===

    /// Reject all pending work and discard in-flight outcomes
    fn on_reset(&mut self, reason: Option<String>) {
        let reason = reason.unwrap_or_else(|| DEFAULT_ABORT_REASON.to_string());
        info!(%reason, "rejecting all pending calls");

        self.epoch += 1;
        self.next_wake = None;

        let ids = self.entries.select(&[], None, None);
        let mut aborted = 0u64;
        for id in ids {
            let Some(entry) = self.entries.get_mut(id) else {
                continue;
            };
            if let Some(settlement) = entry.take_settlement() {
                let _ = settlement.send(Err(CallError::Aborted(reason.clone())));
                aborted += 1;
            }
            // in-flight entries stay until their stale outcome arrives;
            // waiting and init entries are discarded outright
            let keep = entry.status == CallStatus::Processing;
            if !keep {
                self.entries.remove(id);
            }
        }
        self.stats.total_aborted += aborted;
        debug!(aborted, "reset complete");
    }

    /// Reject whatever is still unsettled, without touching entry bookkeeping
    fn reject_unsettled(&mut self, reason: &str) {
        let ids = self.entries.select(&[], None, None);
        for id in ids {
            if let Some(entry) = self.entries.get_mut(id) {
                if let Some(settlement) = entry.take_settlement() {
                    let _ = settlement.send(Err(CallError::Aborted(reason.to_string())));
                    self.stats.total_aborted += 1;
                }
            }
        }
    }

    // === helpers ===

    fn count_status(&self, status: CallStatus) -> usize {
        self.entries.count(&[status_filter(status)])
    }

    /// Drop history records that can no longer affect the trailing window
    fn prune_history(&mut self, now: i64) {
        let Some((_, interval_len)) = self.config.rate_limit() else {
            return;
        };
        let cutoff = now - interval_len as i64;
        let removed = self.history.delete_where(&[Filter {
            field: "dispatched_at".to_string(),
            op: FilterOp::Lt,
            value: IndexValue::Int(cutoff),
        }]);
        if removed > 0 {
            debug!(removed, "pruned dispatch history");
        }
    }

    fn queue_state(&self) -> QueueState {
        QueueState {
            waiting: self.count_status(CallStatus::Waiting),
            processing: self.count_status(CallStatus::Processing),
            armed: self.next_wake.is_some(),
            stats: self.stats.clone(),
        }
    }
}

fn status_filter(status: CallStatus) -> Filter {
    Filter {
        field: "status".to_string(),
        op: FilterOp::Eq,
        value: IndexValue::String(status.to_string()),
    }
}

/// Sleep until the deadline; pending forever when none is armed.
///
/// Only polled when the select guard sees an armed wake-up.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
