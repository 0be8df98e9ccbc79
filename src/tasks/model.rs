//! Task data model — the unit of dispatched work.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task.
///
/// `cancelled` exists in the schema but no transition reaches it; it is kept
/// so stores that carry such rows can still load them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// DB/wire string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a transition from `self` to `target` is allowed.
    ///
    /// `pending -> running` happens only via a successful claim;
    /// `running -> pending` via a retryable failure or lease reclamation.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, target),
            (Pending, Running) | (Running, Done) | (Running, Failed) | (Running, Pending)
        )
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tie-break weight used during matching. Not a hard guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    /// DB/wire string for this priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    /// Sort rank for claim ordering: lower rank is claimed first.
    pub fn rank(&self) -> i64 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Medium => 1,
            TaskPriority::Low => 2,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of dispatched work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique ID, assigned at creation, immutable.
    pub id: Uuid,
    /// Free-form kind of work, e.g. "document_summary".
    #[serde(rename = "type")]
    pub task_type: String,
    /// Opaque input for the executor, immutable after creation.
    pub payload: serde_json::Value,
    /// Tie-break weight during matching.
    pub priority: TaskPriority,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Externally computed classification label (tier-1 matching).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_category: Option<String>,
    /// Externally computed capability tags (tier-2 matching). Empty = none.
    #[serde(default)]
    pub semantic_labels: Vec<String>,
    /// Current lease. Set iff `status = running`, fresh UUID per claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_id: Option<Uuid>,
    /// When the current lease expires. Set iff `status = running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Claim counter — incremented once per successful claim, never reset.
    pub attempts: u32,
    /// Worker holding the current lease. Set iff `status = running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Terminal output, set once by ReportResult.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Terminal error, set once by a non-retried ReportFailure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the task was created (FIFO tie-break).
    pub created_at: DateTime<Utc>,
    /// When the task was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Whether this task currently holds the given lease.
    pub fn holds_lease(&self, lease_id: Uuid) -> bool {
        self.lease_id == Some(lease_id)
    }

    /// Whether this task is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Parameters for creating a task. The store assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    /// Free-form kind of work.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Opaque input for the executor.
    pub payload: serde_json::Value,
    /// Tie-break weight; defaults to medium.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Externally computed classification label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_category: Option<String>,
    /// Externally computed capability tags.
    #[serde(default)]
    pub semantic_labels: Vec<String>,
}

impl NewTask {
    /// Create a task request with default (medium) priority and no labels.
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
            priority: TaskPriority::default(),
            semantic_category: None,
            semantic_labels: Vec::new(),
        }
    }

    /// Builder: set priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set the semantic category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.semantic_category = Some(category.into());
        self
    }

    /// Builder: set the semantic labels.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.semantic_labels = labels;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_the_only_way_out_of_pending() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Done));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn running_can_finish_fail_or_requeue() {
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Done));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn terminal_statuses_never_transition() {
        for terminal in [TaskStatus::Done, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for target in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Done,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn priority_rank_orders_high_first() {
        assert!(TaskPriority::High.rank() < TaskPriority::Medium.rank());
        assert!(TaskPriority::Medium.rank() < TaskPriority::Low.rank());
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn status_serde_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");

        let parsed: TaskStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, TaskStatus::Failed);
    }

    #[test]
    fn new_task_defaults() {
        let new = NewTask::new("document_summary", serde_json::json!({"text": "hi"}));
        assert_eq!(new.priority, TaskPriority::Medium);
        assert!(new.semantic_category.is_none());
        assert!(new.semantic_labels.is_empty());
    }

    #[test]
    fn new_task_builder_methods() {
        let new = NewTask::new("code_review", serde_json::json!({}))
            .with_priority(TaskPriority::High)
            .with_category("CodeBee")
            .with_labels(vec!["review".into(), "generate_code".into()]);
        assert_eq!(new.priority, TaskPriority::High);
        assert_eq!(new.semantic_category.as_deref(), Some("CodeBee"));
        assert_eq!(new.semantic_labels.len(), 2);
    }

    #[test]
    fn task_type_serializes_as_type() {
        let new = NewTask::new("document_summary", serde_json::json!({}));
        let json = serde_json::to_string(&new).unwrap();
        assert!(json.contains("\"type\":\"document_summary\""));
    }

    #[test]
    fn holds_lease_compares_current_lease() {
        let lease = Uuid::new_v4();
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            task_type: "t".into(),
            payload: serde_json::json!({}),
            priority: TaskPriority::Medium,
            status: TaskStatus::Running,
            semantic_category: None,
            semantic_labels: Vec::new(),
            lease_id: Some(lease),
            lease_expires_at: Some(now),
            attempts: 1,
            assigned_to: Some("bee-1".into()),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        assert!(task.holds_lease(lease));
        assert!(!task.holds_lease(Uuid::new_v4()));
    }
}
