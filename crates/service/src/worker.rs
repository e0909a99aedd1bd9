//! Background upkeep of the outbox: redelivery of entries left pending by a
//! failed publish, and pruning of entries dispatched long ago.

use std::time::Duration;

use application::EventRelay;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// How often dispatched entries older than the retention are deleted.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Timing of the outbox relay worker.
#[derive(Debug, Clone, Copy)]
pub struct RelaySchedule {
    /// Time between redelivery passes.
    pub period: Duration,
    /// Outbox entries per redelivery pass.
    pub batch_size: usize,
    /// Age after which dispatched entries are pruned.
    pub retention: Duration,
}

/// Runs redelivery every `schedule.period` and pruning every [`PRUNE_INTERVAL`]
/// until `shutdown` flips to true.
pub fn spawn_outbox_relay(
    relay: EventRelay,
    schedule: RelaySchedule,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(schedule.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut prune_ticker = interval(PRUNE_INTERVAL);
        prune_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(?schedule, "Outbox relay started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match relay.redeliver_pending(schedule.batch_size).await {
                        Ok(0) => {}
                        Ok(count) => debug!(count, "Redelivered outbox entries"),
                        Err(e) => {
                            metrics::counter!("outbox_relay_errors_total").increment(1);
                            warn!(error = %e, "Outbox redelivery failed");
                        }
                    }
                }
                _ = prune_ticker.tick() => {
                    if let Err(e) = relay.prune_dispatched(schedule.retention).await {
                        metrics::counter!("outbox_relay_errors_total").increment(1);
                        warn!(error = %e, "Outbox pruning failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Outbox relay stopped");
    })
}
