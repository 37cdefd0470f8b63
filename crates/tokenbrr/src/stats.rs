use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::tracker::{self, Stats, TrackerEvent};

const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Logs progress every report interval until cancelled
pub(crate) async fn run_stats_reporter(
    tracker_tx: mpsc::UnboundedSender<TrackerEvent>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(REPORT_INTERVAL);
    // the first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(stats) = tracker::get_stats(&tracker_tx).await {
                    log_stats(&stats);
                }
            }
            () = shutdown.cancelled() => break,
        }
    }
}

fn log_stats(stats: &Stats) {
    info!(
        submitted = stats.submitted,
        sealed = stats.sealed,
        failed = stats.failed,
        timed_out = stats.timed_out,
        pending = stats.pending(),
        tps = format!("{:.1}", stats.tps()),
        "Progress"
    );

    if stats.latency_count > 0 {
        info!(
            avg_ms = format!("{:.2}", stats.avg_latency_ms()),
            min_ms = stats.min_latency_ms(),
            max_ms = stats.max_latency_ms(),
            p50_ms = stats.latency_percentile(50.0),
            p99_ms = stats.latency_percentile(99.0),
            count = stats.latency_count,
            "Seal latency"
        );
    }
}

pub(crate) fn print_final_report(stats: &Stats) {
    info!(
        elapsed_secs = format!("{:.1}", stats.elapsed_secs),
        submitted = stats.submitted,
        sealed = stats.sealed,
        failed = stats.failed,
        timed_out = stats.timed_out,
        unresolved = stats.pending(),
        tps = format!("{:.2}", stats.tps()),
        sealed_tps = format!("{:.2}", stats.sealed_tps()),
        "Final report"
    );

    if stats.latency_count > 0 {
        info!(
            avg_ms = format!("{:.2}", stats.avg_latency_ms()),
            min_ms = stats.min_latency_ms(),
            max_ms = stats.max_latency_ms(),
            p50_ms = stats.latency_percentile(50.0),
            p99_ms = stats.latency_percentile(99.0),
            "Seal latency"
        );
    }

    let mut reasons: Vec<_> = stats.failure_reasons.iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(a.1));
    for (reason, count) in reasons {
        info!(reason = %reason, count, "Failure reason");
    }
}
