use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Outcome events reported by transfer tasks
#[derive(Debug)]
pub(crate) enum TrackerEvent {
    /// The network accepted a transfer
    Submitted,
    /// A submitted transfer sealed without error
    Sealed { latency: Duration },
    /// A transfer failed; `submitted` tells whether the network had accepted it
    Failed {
        reason: &'static str,
        submitted: bool,
    },
    /// A submitted transfer never sealed before its deadline
    TimedOut,
    GetStats(oneshot::Sender<Stats>),
    Shutdown,
}

/// Maximum number of seal latencies to keep (reservoir sample)
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Statistics collected by the tracker
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub submitted: u64,
    pub sealed: u64,
    pub failed: u64,
    /// Failures of transfers the network had accepted
    pub rejected: u64,
    pub timed_out: u64,
    pub failure_reasons: HashMap<String, u64>,
    pub latency_count: u64,
    pub latency_sum_ms: u64,
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub latency_times: Vec<u64>,
    pub elapsed_secs: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            submitted: 0,
            sealed: 0,
            failed: 0,
            rejected: 0,
            timed_out: 0,
            failure_reasons: HashMap::new(),
            latency_count: 0,
            latency_sum_ms: 0,
            latency_min_ms: u64::MAX,
            latency_max_ms: 0,
            latency_times: Vec::new(),
            elapsed_secs: 0.0,
        }
    }
}

impl Stats {
    /// Submitted transfers without an outcome yet.
    pub const fn pending(&self) -> u64 {
        self.submitted.saturating_sub(self.sealed + self.rejected + self.timed_out)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.latency_count == 0 {
            0.0
        } else {
            self.latency_sum_ms as f64 / self.latency_count as f64
        }
    }

    pub const fn min_latency_ms(&self) -> u64 {
        if self.latency_count == 0 {
            0
        } else {
            self.latency_min_ms
        }
    }

    pub const fn max_latency_ms(&self) -> u64 {
        self.latency_max_ms
    }

    pub fn latency_percentile(&self, p: f64) -> u64 {
        if self.latency_times.is_empty() {
            return 0;
        }
        let mut sorted = self.latency_times.clone();
        sorted.sort_unstable();
        let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn tps(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            0.0
        } else {
            self.submitted as f64 / self.elapsed_secs
        }
    }

    pub fn sealed_tps(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            0.0
        } else {
            self.sealed as f64 / self.elapsed_secs
        }
    }

    fn record_latency(&mut self, latency: Duration, rng: &mut impl Rng) {
        let ms = latency.as_millis() as u64;
        self.latency_count += 1;
        self.latency_sum_ms += ms;
        self.latency_min_ms = self.latency_min_ms.min(ms);
        self.latency_max_ms = self.latency_max_ms.max(ms);

        let n = self.latency_count as usize;
        if n <= MAX_LATENCY_SAMPLES {
            self.latency_times.push(ms);
        } else {
            let j = rng.gen_range(0..n);
            if j < MAX_LATENCY_SAMPLES {
                self.latency_times[j] = ms;
            }
        }
    }
}

pub(crate) fn create_tracker_channel(
) -> (mpsc::UnboundedSender<TrackerEvent>, mpsc::UnboundedReceiver<TrackerEvent>) {
    mpsc::unbounded_channel()
}

/// Requests a stats snapshot; `None` once the tracker has stopped.
pub(crate) async fn get_stats(tracker_tx: &mpsc::UnboundedSender<TrackerEvent>) -> Option<Stats> {
    let (tx, rx) = oneshot::channel();
    tracker_tx.send(TrackerEvent::GetStats(tx)).ok()?;
    rx.await.ok()
}

/// Runs the tracker task until `Shutdown` or until every sender is gone
pub(crate) async fn run_tracker(mut rx: mpsc::UnboundedReceiver<TrackerEvent>) {
    let mut stats = Stats::default();
    let test_start = Instant::now();
    let mut rng = StdRng::from_entropy();

    while let Some(event) = rx.recv().await {
        match event {
            TrackerEvent::Submitted => stats.submitted += 1,
            TrackerEvent::Sealed { latency } => {
                stats.sealed += 1;
                stats.record_latency(latency, &mut rng);
            }
            TrackerEvent::Failed { reason, submitted } => {
                stats.failed += 1;
                if submitted {
                    stats.rejected += 1;
                }
                *stats.failure_reasons.entry(reason.to_string()).or_insert(0) += 1;
            }
            TrackerEvent::TimedOut => stats.timed_out += 1,
            TrackerEvent::GetStats(reply) => {
                stats.elapsed_secs = test_start.elapsed().as_secs_f64();
                if reply.send(stats.clone()).is_err() {
                    warn!("Failed to send stats response - receiver dropped");
                }
            }
            TrackerEvent::Shutdown => break,
        }
    }
}
