//! `TaskStore` trait — single async interface for all persistence.
//!
//! The store is the sole synchronization point of the dispatch core: each
//! claim method performs selection and the pending→running transition as one
//! conditional write, and each terminal write is gated on the lease id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::agents::model::{Agent, AgentState};
use crate::error::StoreError;
use crate::tasks::model::{NewTask, Task, TaskStatus};

/// The lease applied to a task on a successful claim.
#[derive(Debug, Clone)]
pub struct LeaseGrant {
    /// Worker the lease is issued to.
    pub bee_id: String,
    /// Fresh lease id, generated once per claim.
    pub lease_id: Uuid,
    /// When the lease expires and the task becomes reclaimable.
    pub expires_at: DateTime<Utc>,
}

impl LeaseGrant {
    /// Issue a new lease for `bee_id` expiring after `ttl`.
    pub fn issue(bee_id: impl Into<String>, ttl: std::time::Duration) -> Self {
        Self {
            bee_id: bee_id.into(),
            lease_id: Uuid::new_v4(),
            expires_at: Utc::now() + ttl,
        }
    }
}

/// Backend-agnostic store covering tasks and agents.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Insert a new pending task. The store assigns id and timestamps.
    async fn insert_task(&self, new: &NewTask) -> Result<Task, StoreError>;

    /// Get a task by ID.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Get tasks in a given status, oldest first, up to `limit`.
    async fn list_tasks_by_status(
        &self,
        status: TaskStatus,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError>;

    // ── Claiming ────────────────────────────────────────────────────
    //
    // Each claim method atomically selects at most one pending task
    // (highest priority first, then earliest created_at), marks it
    // running under `grant`, and increments `attempts`.

    /// Tier 1: claim a pending task whose `semantic_category` equals `category`.
    async fn claim_by_category(
        &self,
        category: &str,
        grant: &LeaseGrant,
    ) -> Result<Option<Task>, StoreError>;

    /// Tier 2: claim a pending task whose `semantic_labels` intersects `capabilities`.
    async fn claim_by_labels(
        &self,
        capabilities: &[String],
        grant: &LeaseGrant,
    ) -> Result<Option<Task>, StoreError>;

    /// Tier 3: claim any pending task.
    async fn claim_any(&self, grant: &LeaseGrant) -> Result<Option<Task>, StoreError>;

    // ── Lease-validated writes ──────────────────────────────────────
    //
    // Each returns Ok(false) when the stored lease does not match the
    // supplied one (stale report); nothing is mutated in that case.

    /// Mark a task done and store its result.
    async fn complete_task(
        &self,
        id: Uuid,
        lease_id: Uuid,
        result: &serde_json::Value,
    ) -> Result<bool, StoreError>;

    /// Return a task to pending for retry. `attempts` is left unchanged.
    async fn release_task(&self, id: Uuid, lease_id: Uuid) -> Result<bool, StoreError>;

    /// Mark a task failed and store its error.
    async fn fail_task(&self, id: Uuid, lease_id: Uuid, error: &str) -> Result<bool, StoreError>;

    // ── Reaper ──────────────────────────────────────────────────────

    /// Return every running task whose lease expired before `now` to
    /// pending, clearing lease fields. Returns the reclaimed task ids.
    async fn reap_expired_leases(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;

    // ── Agents ──────────────────────────────────────────────────────

    /// Create an agent record. Returns false (without modification) when
    /// the id is already registered.
    async fn register_agent(&self, agent: &Agent) -> Result<bool, StoreError>;

    /// Get an agent by ID.
    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError>;

    /// Replace an agent's liveness blob. Returns false for unknown agents.
    async fn record_heartbeat(&self, id: &str, state: &AgentState) -> Result<bool, StoreError>;

    /// List all registered agents, oldest first.
    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError>;
}
