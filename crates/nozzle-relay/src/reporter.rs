//! Periodic kept/discarded summary.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use nozzle_core::{CounterSnapshot, RelayCounters};

/// Summary line for one interval, or `None` when there is nothing worth
/// reporting (no kept or no discarded events).
pub fn report_line(snapshot: CounterSnapshot, interval: Duration) -> Option<String> {
    if snapshot.kept == 0 || snapshot.discarded == 0 {
        return None;
    }
    let pct = snapshot.kept_percent()?;
    Some(format!(
        "Sent {pct}% of the {} events received in the last {}s",
        snapshot.total(),
        interval.as_secs()
    ))
}

/// Spawn the reporter. Counters are reset on every tick whether or not a
/// line is logged; the line is only logged when `verbose` is set.
pub fn spawn_reporter(
    counters: Arc<RelayCounters>,
    interval: Duration,
    verbose: bool,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip first immediate tick
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = counters.take();
                    if !verbose {
                        continue;
                    }
                    if let Some(line) = report_line(snapshot, interval) {
                        info!(
                            kept = snapshot.kept,
                            discarded = snapshot.discarded,
                            "{line}"
                        );
                    }
                }
            }
        }
        debug!("Counters reporter stopped");
    })
}
