use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::coordinator::CollaborationCoordinator;

/// Runs `cleanup_expired_sessions` every `every` until the task is aborted.
pub fn spawn_sweeper(
    coordinator: Arc<CollaborationCoordinator>,
    every: Duration,
) -> JoinHandle<()> {
    info!("Expiry sweeper running every {:?}", every);
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = coordinator.cleanup_expired_sessions();
            if report.is_empty() {
                debug!("Sweep found nothing to evict");
            }
        }
    })
}
