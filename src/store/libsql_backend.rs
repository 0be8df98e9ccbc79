//! libSQL backend — async `TaskStore` implementation.
//!
//! Every claim is a single conditional UPDATE (selection subquery plus a
//! `status = 'pending'` guard) so two concurrent pollers can never claim the
//! same task. Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::agents::model::{Agent, AgentState};
use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::{LeaseGrant, TaskStore};
use crate::tasks::model::{NewTask, Task, TaskPriority, TaskStatus};

/// libSQL task store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use;
/// SQLite executes each statement atomically, which is what makes the
/// single-statement claims race-free.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        info!(path = %path.display(), "Task store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run one claim statement and decode the claimed row, if any.
    async fn run_claim(
        &self,
        label: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<Task>, StoreError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| StoreError::Query(format!("{label}: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("{label}: {e}")))?;

        match row {
            Some(row) => Ok(Some(row_to_task(&row)?)),
            None => Ok(None),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Try SQLite datetime() output with fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    // Try SQLite datetime() output without fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert a TaskStatus to its DB string.
fn status_to_str(status: TaskStatus) -> &'static str {
    status.as_str()
}

/// Parse a status string from the DB.
fn str_to_status(s: &str) -> TaskStatus {
    match s {
        "running" => TaskStatus::Running,
        "done" => TaskStatus::Done,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Pending,
    }
}

/// Parse a priority string from the DB.
fn str_to_priority(s: &str) -> TaskPriority {
    match s {
        "high" => TaskPriority::High,
        "low" => TaskPriority::Low,
        _ => TaskPriority::Medium,
    }
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn decode_err(e: libsql::Error) -> StoreError {
    StoreError::Query(format!("row decode: {e}"))
}

/// Map a libsql Row to a Task.
///
/// Column order matches TASK_COLUMNS:
/// 0:id, 1:type, 2:payload, 3:priority, 4:status, 5:semantic_category,
/// 6:semantic_labels, 7:lease_id, 8:lease_expires_at, 9:attempts,
/// 10:assigned_to, 11:result, 12:error, 13:created_at, 14:updated_at
fn row_to_task(row: &libsql::Row) -> Result<Task, StoreError> {
    let id_str: String = row.get(0).map_err(decode_err)?;
    let task_type: String = row.get(1).map_err(decode_err)?;
    let payload_str: String = row.get(2).map_err(decode_err)?;
    let priority_str: String = row.get(3).map_err(decode_err)?;
    let status_str: String = row.get(4).map_err(decode_err)?;
    let category: Option<String> = row.get(5).ok();
    let labels_str: String = row.get(6).map_err(decode_err)?;
    let lease_id_str: Option<String> = row.get(7).ok();
    let lease_expires_str: Option<String> = row.get(8).ok();
    let attempts: i64 = row.get(9).map_err(decode_err)?;
    let assigned_to: Option<String> = row.get(10).ok();
    let result_str: Option<String> = row.get(11).ok();
    let error: Option<String> = row.get(12).ok();
    let created_str: String = row.get(13).map_err(decode_err)?;
    let updated_str: String = row.get(14).map_err(decode_err)?;

    let id = Uuid::parse_str(&id_str)
        .map_err(|e| StoreError::Serialization(format!("task id '{id_str}': {e}")))?;
    let payload: serde_json::Value = serde_json::from_str(&payload_str)
        .map_err(|e| StoreError::Serialization(format!("task {id} payload: {e}")))?;
    let semantic_labels: Vec<String> = serde_json::from_str(&labels_str)
        .map_err(|e| StoreError::Serialization(format!("task {id} labels: {e}")))?;
    let lease_id = match lease_id_str {
        Some(s) => Some(
            Uuid::parse_str(&s)
                .map_err(|e| StoreError::Serialization(format!("task {id} lease id: {e}")))?,
        ),
        None => None,
    };
    let result = match result_str {
        Some(s) => Some(
            serde_json::from_str(&s)
                .map_err(|e| StoreError::Serialization(format!("task {id} result: {e}")))?,
        ),
        None => None,
    };

    Ok(Task {
        id,
        task_type,
        payload,
        priority: str_to_priority(&priority_str),
        status: str_to_status(&status_str),
        semantic_category: category,
        semantic_labels,
        lease_id,
        lease_expires_at: lease_expires_str.as_deref().map(parse_datetime),
        attempts: attempts.max(0) as u32,
        assigned_to,
        result,
        error,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to an Agent.
///
/// Column order matches AGENT_COLUMNS:
/// 0:id, 1:role, 2:skills, 3:state, 4:config, 5:active, 6:created_at, 7:updated_at
fn row_to_agent(row: &libsql::Row) -> Result<Agent, StoreError> {
    let id: String = row.get(0).map_err(decode_err)?;
    let role: String = row.get(1).map_err(decode_err)?;
    let skills_str: String = row.get(2).map_err(decode_err)?;
    let state_str: String = row.get(3).map_err(decode_err)?;
    let config_str: String = row.get(4).map_err(decode_err)?;
    let active: i64 = row.get(5).map_err(decode_err)?;
    let created_str: String = row.get(6).map_err(decode_err)?;
    let updated_str: String = row.get(7).map_err(decode_err)?;

    let skills: Vec<String> = serde_json::from_str(&skills_str)
        .map_err(|e| StoreError::Serialization(format!("agent {id} skills: {e}")))?;
    let state: AgentState = serde_json::from_str(&state_str)
        .map_err(|e| StoreError::Serialization(format!("agent {id} state: {e}")))?;
    let config: serde_json::Value = serde_json::from_str(&config_str)
        .map_err(|e| StoreError::Serialization(format!("agent {id} config: {e}")))?;

    Ok(Agent {
        id,
        role,
        skills,
        state,
        config,
        active: active != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const TASK_COLUMNS: &str = "id, type, payload, priority, status, semantic_category, semantic_labels, lease_id, lease_expires_at, attempts, assigned_to, result, error, created_at, updated_at";

const AGENT_COLUMNS: &str = "id, role, skills, state, config, active, created_at, updated_at";

/// Claim ordering shared by all three tiers: highest priority first, then FIFO.
const CLAIM_ORDER: &str =
    "ORDER BY CASE t.priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, t.created_at";

#[async_trait]
impl TaskStore for LibSqlStore {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn insert_task(&self, new: &NewTask) -> Result<Task, StoreError> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            task_type: new.task_type.clone(),
            payload: new.payload.clone(),
            priority: new.priority,
            status: TaskStatus::Pending,
            semantic_category: new.semantic_category.clone(),
            semantic_labels: new.semantic_labels.clone(),
            lease_id: None,
            lease_expires_at: None,
            attempts: 0,
            assigned_to: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };

        let payload_json = serde_json::to_string(&task.payload)
            .map_err(|e| StoreError::Serialization(format!("payload: {e}")))?;
        let labels_json = serde_json::to_string(&task.semantic_labels)
            .map_err(|e| StoreError::Serialization(format!("labels: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO tasks (id, type, payload, priority, status, semantic_category, semantic_labels, attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
                params![
                    task.id.to_string(),
                    task.task_type.as_str(),
                    payload_json,
                    task.priority.as_str(),
                    status_to_str(task.status),
                    opt_text(task.semantic_category.as_deref()),
                    labels_json,
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_task: {e}")))?;

        debug!(task_id = %task.id, task_type = %task.task_type, "Task inserted");
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_task: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_task: {e}")))?;

        match row {
            Some(row) => Ok(Some(row_to_task(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_tasks_by_status(
        &self,
        status: TaskStatus,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2"
                ),
                params![status_to_str(status), limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_tasks_by_status: {e}")))?;

        let mut tasks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    // ── Claiming ────────────────────────────────────────────────────

    async fn claim_by_category(
        &self,
        category: &str,
        grant: &LeaseGrant,
    ) -> Result<Option<Task>, StoreError> {
        let sql = format!(
            "UPDATE tasks SET
                status = 'running',
                lease_id = ?1,
                lease_expires_at = ?2,
                assigned_to = ?3,
                attempts = attempts + 1,
                updated_at = ?4
             WHERE id = (
                SELECT t.id FROM tasks t
                WHERE t.status = 'pending' AND t.semantic_category = ?5
                {CLAIM_ORDER}
                LIMIT 1
             )
             AND status = 'pending'
             RETURNING {TASK_COLUMNS}"
        );
        self.run_claim(
            "claim_by_category",
            &sql,
            params![
                grant.lease_id.to_string(),
                grant.expires_at.to_rfc3339(),
                grant.bee_id.as_str(),
                Utc::now().to_rfc3339(),
                category,
            ],
        )
        .await
    }

    async fn claim_by_labels(
        &self,
        capabilities: &[String],
        grant: &LeaseGrant,
    ) -> Result<Option<Task>, StoreError> {
        if capabilities.is_empty() {
            return Ok(None);
        }
        let capabilities_json = serde_json::to_string(capabilities)
            .map_err(|e| StoreError::Serialization(format!("capabilities: {e}")))?;

        // Intersection test in SQL: any task label present in the caller's
        // capability array (both sides expanded with json_each).
        let sql = format!(
            "UPDATE tasks SET
                status = 'running',
                lease_id = ?1,
                lease_expires_at = ?2,
                assigned_to = ?3,
                attempts = attempts + 1,
                updated_at = ?4
             WHERE id = (
                SELECT t.id FROM tasks t
                WHERE t.status = 'pending'
                  AND EXISTS (
                    SELECT 1 FROM json_each(t.semantic_labels) je
                    WHERE je.value IN (SELECT value FROM json_each(?5))
                  )
                {CLAIM_ORDER}
                LIMIT 1
             )
             AND status = 'pending'
             RETURNING {TASK_COLUMNS}"
        );
        self.run_claim(
            "claim_by_labels",
            &sql,
            params![
                grant.lease_id.to_string(),
                grant.expires_at.to_rfc3339(),
                grant.bee_id.as_str(),
                Utc::now().to_rfc3339(),
                capabilities_json,
            ],
        )
        .await
    }

    async fn claim_any(&self, grant: &LeaseGrant) -> Result<Option<Task>, StoreError> {
        let sql = format!(
            "UPDATE tasks SET
                status = 'running',
                lease_id = ?1,
                lease_expires_at = ?2,
                assigned_to = ?3,
                attempts = attempts + 1,
                updated_at = ?4
             WHERE id = (
                SELECT t.id FROM tasks t
                WHERE t.status = 'pending'
                {CLAIM_ORDER}
                LIMIT 1
             )
             AND status = 'pending'
             RETURNING {TASK_COLUMNS}"
        );
        self.run_claim(
            "claim_any",
            &sql,
            params![
                grant.lease_id.to_string(),
                grant.expires_at.to_rfc3339(),
                grant.bee_id.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await
    }

    // ── Lease-validated writes ──────────────────────────────────────

    async fn complete_task(
        &self,
        id: Uuid,
        lease_id: Uuid,
        result: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let result_json = serde_json::to_string(result)
            .map_err(|e| StoreError::Serialization(format!("result: {e}")))?;

        let affected = self
            .conn()
            .execute(
                "UPDATE tasks SET
                    status = 'done',
                    result = ?1,
                    lease_id = NULL,
                    lease_expires_at = NULL,
                    assigned_to = NULL,
                    updated_at = ?2
                 WHERE id = ?3 AND lease_id = ?4",
                params![
                    result_json,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    lease_id.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("complete_task: {e}")))?;

        Ok(affected == 1)
    }

    async fn release_task(&self, id: Uuid, lease_id: Uuid) -> Result<bool, StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE tasks SET
                    status = 'pending',
                    lease_id = NULL,
                    lease_expires_at = NULL,
                    assigned_to = NULL,
                    updated_at = ?1
                 WHERE id = ?2 AND lease_id = ?3",
                params![
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    lease_id.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("release_task: {e}")))?;

        Ok(affected == 1)
    }

    async fn fail_task(&self, id: Uuid, lease_id: Uuid, error: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE tasks SET
                    status = 'failed',
                    error = ?1,
                    lease_id = NULL,
                    lease_expires_at = NULL,
                    assigned_to = NULL,
                    updated_at = ?2
                 WHERE id = ?3 AND lease_id = ?4",
                params![
                    error,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    lease_id.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("fail_task: {e}")))?;

        Ok(affected == 1)
    }

    // ── Reaper ──────────────────────────────────────────────────────

    async fn reap_expired_leases(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "UPDATE tasks SET
                    status = 'pending',
                    lease_id = NULL,
                    lease_expires_at = NULL,
                    assigned_to = NULL,
                    updated_at = ?1
                 WHERE status = 'running' AND lease_expires_at < ?1
                 RETURNING id",
                params![now.to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("reap_expired_leases: {e}")))?;

        let mut ids = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id_str: String = row.get(0).map_err(decode_err)?;
            let id = Uuid::parse_str(&id_str)
                .map_err(|e| StoreError::Serialization(format!("task id '{id_str}': {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    // ── Agents ──────────────────────────────────────────────────────

    async fn register_agent(&self, agent: &Agent) -> Result<bool, StoreError> {
        let skills_json = serde_json::to_string(&agent.skills)
            .map_err(|e| StoreError::Serialization(format!("skills: {e}")))?;
        let state_json = serde_json::to_string(&agent.state)
            .map_err(|e| StoreError::Serialization(format!("state: {e}")))?;
        let config_json = serde_json::to_string(&agent.config)
            .map_err(|e| StoreError::Serialization(format!("config: {e}")))?;

        let affected = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO agents (id, role, skills, state, config, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    agent.id.as_str(),
                    agent.role.as_str(),
                    skills_json,
                    state_json,
                    config_json,
                    agent.active as i64,
                    agent.created_at.to_rfc3339(),
                    agent.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("register_agent: {e}")))?;

        Ok(affected == 1)
    }

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_agent: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_agent: {e}")))?;

        match row {
            Some(row) => Ok(Some(row_to_agent(&row)?)),
            None => Ok(None),
        }
    }

    async fn record_heartbeat(&self, id: &str, state: &AgentState) -> Result<bool, StoreError> {
        let state_json = serde_json::to_string(state)
            .map_err(|e| StoreError::Serialization(format!("state: {e}")))?;

        let affected = self
            .conn()
            .execute(
                "UPDATE agents SET state = ?1, updated_at = ?2 WHERE id = ?3",
                params![state_json, Utc::now().to_rfc3339(), id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("record_heartbeat: {e}")))?;

        Ok(affected == 1)
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at ASC"),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_agents: {e}")))?;

        let mut agents = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            agents.push(row_to_agent(&row)?);
        }
        Ok(agents)
    }
}
