//! Continuous collection loop driven by a fixed interval.

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::pipeline::CollectionPipeline;

/// Shortest accepted interval between cycle starts.
pub const MIN_INTERVAL: Duration = Duration::from_secs(60);

/// Run collection cycles every `interval` until `cancel` fires. A cycle that
/// overruns the interval is followed immediately by the next one. Returns the
/// number of cycles started.
pub async fn run_loop(
    pipeline: &CollectionPipeline,
    interval: Duration,
    product_filter: &[String],
    cancel: CancellationToken,
) -> u64 {
    let period = if interval < MIN_INTERVAL {
        warn!(
            requested_secs = interval.as_secs(),
            min_secs = MIN_INTERVAL.as_secs(),
            "interval too short; using the minimum"
        );
        MIN_INTERVAL
    } else {
        interval
    };

    info!(interval_secs = period.as_secs(), "watch loop started");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(cycles, "watch loop stopping");
                break;
            }
            _ = ticker.tick() => {
                cycles += 1;
                let started = Instant::now();
                match pipeline.run_once(product_filter, &cancel).await {
                    Ok(summary) => info!(
                        cycle = cycles,
                        run_id = %summary.run_id,
                        priced = summary.priced,
                        failed = summary.failed,
                        alerts = summary.alerts_fired,
                        "cycle finished"
                    ),
                    Err(err) => error!(cycle = cycles, error = %format!("{err:#}"), "cycle failed"),
                }

                let elapsed = started.elapsed();
                if elapsed >= period {
                    warn!(
                        cycle = cycles,
                        elapsed_secs = elapsed.as_secs(),
                        interval_secs = period.as_secs(),
                        "cycle overran the interval; starting the next one now"
                    );
                }
            }
        }
    }

    cycles
}
