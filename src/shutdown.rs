use crate::notify::NotificationWorker;
use crate::observability::dispatch_metrics;
use std::time::Duration;
use tracing::{info, warn};

/// Graceful shutdown coordinator for the notification pipeline
pub struct ShutdownCoordinator {
    worker: NotificationWorker,
}

impl ShutdownCoordinator {
    pub fn new(worker: NotificationWorker) -> Self {
        Self { worker }
    }

    /// Stops accepting notification jobs and finishes the queued ones.
    pub async fn shutdown_all_services(self, drain_timeout: Duration) -> bool {
        info!("Initiating graceful shutdown of all services...");

        let drained = self.worker.drain(drain_timeout).await;
        if !drained {
            warn!("Some notifications may not have been delivered before shutdown");
        }

        dispatch_metrics().log_stats();

        info!("Graceful shutdown completed");
        drained
    }
}
