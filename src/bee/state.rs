//! Shared worker state.
//!
//! The work loop and the heartbeat loop run as separate tasks but report on
//! the same worker, so what they share lives here behind an `Arc`. Counters
//! are atomics; the current task id sits behind an async lock because the
//! work loop writes it at task boundaries while heartbeats read it.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agents::model::{HeartbeatMetrics, WorkerStatus};

/// State shared between the work loop and the heartbeat loop.
#[derive(Default)]
pub struct WorkerState {
    current_task: RwLock<Option<Uuid>>,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start (`Some`) or end (`None`) of a task.
    pub async fn set_current_task(&self, task_id: Option<Uuid>) {
        *self.current_task.write().await = task_id;
    }

    pub async fn current_task(&self) -> Option<Uuid> {
        *self.current_task.read().await
    }

    /// Busy whenever a task is in flight.
    pub async fn status(&self) -> WorkerStatus {
        if self.current_task.read().await.is_some() {
            WorkerStatus::Busy
        } else {
            WorkerStatus::Idle
        }
    }

    pub fn record_success(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::Relaxed)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    /// Counters as sent with each heartbeat.
    pub fn metrics(&self) -> HeartbeatMetrics {
        HeartbeatMetrics {
            tasks_completed: self.tasks_completed(),
            tasks_failed: self.tasks_failed(),
            ..Default::default()
        }
    }
}
