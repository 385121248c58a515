use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{ContentScheduler, COMPONENT};
use crate::logger::LogContext;

/// Runs a processing cycle every `interval` until `cancellation_token` is cancelled.
///
/// Each cycle runs in its own task, so a panicking cycle is logged and the timer carries on.
pub(super) fn spawn(
    scheduler: ContentScheduler,
    first_tick: Instant,
    interval: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(first_tick, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cycle = tokio::spawn({
                        let scheduler = scheduler.clone();
                        async move { scheduler.process_cycle().await }
                    });
                    if let Err(err) = cycle.await {
                        tracing::error!(?err, "Processing cycle failed: {err}");
                        scheduler.logger().error(
                            format!("Processing cycle failed: {err}"),
                            LogContext::component(COMPONENT),
                        );
                    }
                }
                _ = cancellation_token.cancelled() => {
                    tracing::debug!("Shutting down the scheduler timer");
                    break;
                }
            }
        }
    })
}
