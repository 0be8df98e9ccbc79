//! Lease reaper — returns tasks with expired leases to the queue.
//!
//! Runs on startup and then every sweep interval. A running task whose
//! lease expired belongs to a worker that stopped heartbeating its work,
//! so it goes back to `pending` for someone else to claim. This is the
//! only crash-recovery path; nothing else touches abandoned tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::TaskStore;

/// Spawn the reaper background loop.
///
/// The first sweep fires immediately, which is what recovers tasks left
/// `running` by a previous process.
pub fn spawn_reaper_loop(store: Arc<dyn TaskStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Lease reaper started");

        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;
            run_reaper_cycle(&store).await;
        }
    })
}

/// Single sweep: requeue every running task whose lease expired.
///
/// Attempts counters are left as they are; a reaped claim still consumed
/// an attempt.
pub async fn run_reaper_cycle(store: &Arc<dyn TaskStore>) -> usize {
    let reaped = match store.reap_expired_leases(Utc::now()).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "Lease sweep failed");
            return 0;
        }
    };

    if reaped.is_empty() {
        debug!("No expired leases");
        return 0;
    }

    warn!(count = reaped.len(), "Requeued tasks with expired leases");
    for task_id in &reaped {
        info!(task_id = %task_id, "Lease expired, task returned to queue");
    }
    reaped.len()
}
