//! Paced transfer generation over a rotating pool of agents.

use std::{sync::Arc, time::Duration};

use rand::rngs::StdRng;
use tokio::{
    sync::mpsc,
    task::JoinSet,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    agent::{AccountAgent, TransactionDecorator},
    ledger::Address,
    pool::{AgentPool, PoolLease},
    script::{ScriptLoader, ScriptSource, Transform},
    tracker::TrackerEvent,
};

pub type SharedAgent = Arc<AccountAgent>;

/// Highest rate whose tick interval is still at least one nanosecond.
pub const MAX_TPS: u32 = 1_000_000_000;

/// How a transfer script is built for a given receiver.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub source: ScriptSource,
    /// Import rewrites applied before the receiver and amount.
    pub imports: Vec<Transform>,
    pub recipient_placeholder: String,
    pub amount_placeholder: String,
    pub amount: u64,
}

impl TransferPlan {
    pub fn loader(&self, receiver: Address) -> ScriptLoader {
        ScriptLoader::compose(self.source.clone(), self.imports.iter().cloned())
            .with(Transform::replace_recipient(&self.recipient_placeholder, receiver))
            .with(Transform::replace_amount(&self.amount_placeholder, self.amount))
    }
}

/// Schedules one transfer per interval. A sender is out of the pool for the
/// whole lifetime of its transfer, so no agent ever proposes two in-flight
/// transactions; receivers stay in the pool.
pub struct LoadGenerator {
    pool: Arc<AgentPool<SharedAgent>>,
    plan: Arc<TransferPlan>,
    tracker: mpsc::UnboundedSender<TrackerEvent>,
    rng: StdRng,
    interval: Duration,
    in_flight: JoinSet<()>,
}

impl LoadGenerator {
    pub(crate) fn new(
        pool: Arc<AgentPool<SharedAgent>>,
        plan: TransferPlan,
        tracker: mpsc::UnboundedSender<TrackerEvent>,
        rng: StdRng,
        tps: u32,
    ) -> Self {
        Self {
            pool,
            plan: Arc::new(plan),
            tracker,
            rng,
            interval: (Duration::from_secs(1) / tps.max(1)).max(Duration::from_nanos(1)),
            in_flight: JoinSet::new(),
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Runs one scheduling step. Returns `false` when fewer than two agents are
    /// idle and nothing was scheduled.
    pub fn tick(&mut self) -> bool {
        self.reap();

        let Some((sender, receiver)) = self.pool.take_pair(&mut self.rng) else {
            debug!(idle = self.pool.len(), "Not enough idle accounts, skipping tick");
            return false;
        };
        let receiver = receiver.address();
        let loader = self.plan.loader(receiver);
        let tracker = self.tracker.clone();
        self.in_flight.spawn(transfer(sender, receiver, loader, tracker));
        true
    }

    /// Ticks at the configured rate until `shutdown` is cancelled. Transfers
    /// still in flight are left running; see [`Self::drain`].
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_ms = self.interval.as_millis() as u64,
            pool = self.pool.len(),
            "Generating load"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }

    /// Waits for every in-flight transfer to finish.
    pub async fn drain(&mut self) {
        if !self.in_flight.is_empty() {
            info!(in_flight = self.in_flight.len(), "Draining in-flight transfers");
        }
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Transfer task failed");
            }
        }
    }

    fn reap(&mut self) {
        while let Some(joined) = self.in_flight.try_join_next() {
            if let Err(e) = joined {
                warn!(error = %e, "Transfer task failed");
            }
        }
    }
}

async fn transfer(
    sender: PoolLease<SharedAgent>,
    receiver: Address,
    loader: ScriptLoader,
    tracker: mpsc::UnboundedSender<TrackerEvent>,
) {
    let from = sender.address();
    let decorators = [TransactionDecorator::Authorize(from)];

    let promise = match sender.run_code(&loader, &decorators).await {
        Ok(promise) => promise,
        Err(e) => {
            warn!(sender = %from, receiver = %receiver, error = %e, "Transfer not submitted");
            let _ = tracker.send(TrackerEvent::Failed {
                reason: e.kind(),
                submitted: false,
            });
            return;
        }
    };
    let _ = tracker.send(TrackerEvent::Submitted);
    let submitted_at = Instant::now();

    match promise.wait().await {
        Ok(_) => {
            info!(tx = %promise.id(), sender = %from, receiver = %receiver, "Tokens transferred");
            let _ = tracker.send(TrackerEvent::Sealed {
                latency: submitted_at.elapsed(),
            });
        }
        Err(e) if e.is_timeout() => {
            warn!(tx = %promise.id(), sender = %from, error = %e, "Transfer never sealed");
            let _ = tracker.send(TrackerEvent::TimedOut);
        }
        Err(e) => {
            warn!(tx = %promise.id(), sender = %from, error = %e, "Transfer failed");
            let _ = tracker.send(TrackerEvent::Failed {
                reason: e.kind(),
                submitted: true,
            });
        }
    }
    // dropping the lease returns the sender to the pool
}
