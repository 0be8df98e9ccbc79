//! Wire types for the foreman protocol.
//!
//! Everything a worker and the foreman exchange is defined here, so the
//! in-process service, the HTTP adapter, and the HTTP client all speak the
//! same shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::model::{HeartbeatMetrics, WorkerStatus};
use crate::tasks::model::{Task, TaskPriority};

/// The slice of a task a worker needs to execute it.
///
/// Lease bookkeeping stays on the foreman side; the worker only sees the
/// lease id it must quote when reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    /// Task type, e.g. "document_summary". Drives executor dispatch.
    #[serde(rename = "type")]
    pub task_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: TaskPriority,
    /// How many times this task has been claimed, including this claim.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_category: Option<String>,
}

impl From<&Task> for TaskEnvelope {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type.clone(),
            payload: task.payload.clone(),
            priority: task.priority,
            attempts: task.attempts,
            semantic_category: task.semantic_category.clone(),
        }
    }
}

// ── PullTask ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullTaskRequest {
    pub bee_id: String,
    /// Role name matched against `semantic_category` (tier 1).
    pub role: String,
    /// Skills matched against `semantic_labels` (tier 2). Empty skips tier 2.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// `task: None` means nothing matched; the worker sleeps one poll interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullTaskResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl PullTaskResponse {
    pub fn empty() -> Self {
        Self {
            task: None,
            lease_id: None,
            lease_expires_at: None,
        }
    }
}

// ── ReportResult ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResultRequest {
    pub task_id: Uuid,
    /// Lease under which the work was done. Stale leases are rejected.
    pub lease_id: Uuid,
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

/// `acknowledged: false` means the lease was stale and the result discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResultResponse {
    pub acknowledged: bool,
}

// ── ReportFailure ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFailureRequest {
    pub task_id: Uuid,
    pub lease_id: Uuid,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_trace: Option<String>,
    /// Whether the worker considers the failure transient.
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFailureResponse {
    pub acknowledged: bool,
    /// True when the task went back to the queue for another attempt.
    pub will_retry: bool,
    /// Attempts consumed so far.
    pub retry_count: u32,
}

// ── Heartbeat ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub bee_id: String,
    #[serde(default)]
    pub status: WorkerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<Uuid>,
    #[serde(default)]
    pub metrics: HeartbeatMetrics,
}

/// Instruction piggybacked on a heartbeat acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Pause,
    Resume,
    Restart,
}

/// `acknowledged: false` tells the worker the foreman does not know it
/// (for example after a database reset) and it should re-register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<ControlCommand>,
}

// ── RegisterWorker ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerRequest {
    pub bee_id: String,
    pub role: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_config")]
    pub config: serde_json::Value,
}

fn default_config() -> serde_json::Value {
    serde_json::json!({})
}

/// `registered: false` means the id was already taken; the existing record
/// is left untouched and the worker keeps using it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerResponse {
    pub registered: bool,
    pub worker_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_envelope_uses_type_key() {
        let envelope = TaskEnvelope {
            id: Uuid::new_v4(),
            task_type: "document_summary".into(),
            payload: serde_json::json!({"text": "hi"}),
            priority: TaskPriority::High,
            attempts: 2,
            semantic_category: Some("DocBee".into()),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "document_summary");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["attempts"], 2);
        assert!(json.get("task_type").is_none());
    }

    #[test]
    fn empty_pull_response_omits_lease_fields() {
        let json = serde_json::to_value(PullTaskResponse::empty()).unwrap();
        assert_eq!(json, serde_json::json!({}));

        let parsed: PullTaskResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.task.is_none());
        assert!(parsed.lease_id.is_none());
    }

    #[test]
    fn pull_request_defaults_capabilities() {
        let parsed: PullTaskRequest =
            serde_json::from_str(r#"{"bee_id": "b-1", "role": "DocBee"}"#).unwrap();
        assert!(parsed.capabilities.is_empty());
    }

    #[test]
    fn control_command_is_snake_case() {
        let json = serde_json::to_string(&ControlCommand::Restart).unwrap();
        assert_eq!(json, "\"restart\"");
    }

    #[test]
    fn envelope_from_task_copies_claim_state() {
        let task = Task {
            id: Uuid::new_v4(),
            task_type: "t".into(),
            payload: serde_json::json!({"n": 1}),
            priority: TaskPriority::Medium,
            status: crate::tasks::model::TaskStatus::Running,
            semantic_category: Some("DocBee".into()),
            semantic_labels: vec![],
            lease_id: Some(Uuid::new_v4()),
            lease_expires_at: None,
            attempts: 3,
            assigned_to: Some("bee-1".into()),
            result: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let envelope = TaskEnvelope::from(&task);
        assert_eq!(envelope.id, task.id);
        assert_eq!(envelope.attempts, 3);
        assert_eq!(envelope.semantic_category.as_deref(), Some("DocBee"));
    }
}
