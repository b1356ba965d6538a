use crate::engine::AdmissionEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawn the housekeeping loop: every `every`, evict expired rate-limit
/// windows and cache entries. The first pass runs one full interval after
/// start. Returns when `shutdown` is notified.
pub fn spawn_sweeper(
    engine: Arc<AdmissionEngine>,
    every: Duration,
    shutdown: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        // Registered up front so a notify_waiters() during a sweep is not lost.
        let stopped = shutdown.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut stopped => {
                    tracing::info!("sweeper: stopped");
                    return;
                }
            }

            let stats = engine.sweep_expired();
            if stats.rate_limit_windows + stats.cache_entries > 0 {
                tracing::debug!(
                    "sweeper: evicted, rate_limit_windows={}, cache_entries={}",
                    stats.rate_limit_windows,
                    stats.cache_entries
                );
            }
        }
    })
}
