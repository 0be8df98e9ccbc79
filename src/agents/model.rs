//! Agent data model — registered worker records and the role catalog.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Worker specialization. One `Executor` implementation exists per role.
///
/// The Foreman matches on the role *string* (so new roles deploy without a
/// router change); this enum is the worker-side catalog that makes a missing
/// executor a startup error instead of a runtime string miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeeRole {
    Doc,
    Code,
    Vision,
    Data,
    Finance,
}

impl BeeRole {
    /// All known roles.
    pub const ALL: [BeeRole; 5] = [
        BeeRole::Doc,
        BeeRole::Code,
        BeeRole::Vision,
        BeeRole::Data,
        BeeRole::Finance,
    ];

    /// The role string used on the wire and in tier-1 matching.
    pub fn as_str(&self) -> &'static str {
        match self {
            BeeRole::Doc => "DocBee",
            BeeRole::Code => "CodeBee",
            BeeRole::Vision => "VisionBee",
            BeeRole::Data => "DataBee",
            BeeRole::Finance => "FinanceBee",
        }
    }

    /// Capability tags a worker of this role advertises by default.
    /// Used for registration and tier-2 matching unless overridden.
    pub fn default_skills(&self) -> &'static [&'static str] {
        match self {
            BeeRole::Doc => &["summarize", "analyze", "generate", "extract"],
            BeeRole::Code => &["generate_code", "review_code"],
            BeeRole::Vision => &["analyze_image", "process_image"],
            BeeRole::Data => &["analyze_data", "aggregate"],
            BeeRole::Finance => &["validate_revenue", "process_webhook"],
        }
    }
}

impl fmt::Display for BeeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BeeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DocBee" => Ok(BeeRole::Doc),
            "CodeBee" => Ok(BeeRole::Code),
            "VisionBee" => Ok(BeeRole::Vision),
            "DataBee" => Ok(BeeRole::Data),
            "FinanceBee" => Ok(BeeRole::Finance),
            other => Err(format!(
                "unknown role '{other}' (known: DocBee, CodeBee, VisionBee, DataBee, FinanceBee)"
            )),
        }
    }
}

/// What a worker is doing right now, as reported via heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    Idle,
    Busy,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Busy => write!(f, "busy"),
        }
    }
}

/// Advisory runtime metrics carried on each heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatMetrics {
    /// Process CPU share, percent. Zero when the worker does not sample it.
    #[serde(default)]
    pub cpu_percent: f32,
    /// Resident memory, MiB. Zero when the worker does not sample it.
    #[serde(default)]
    pub memory_mb: f32,
    /// Tasks completed since the worker started.
    #[serde(default)]
    pub tasks_completed: u64,
    /// Tasks failed since the worker started.
    #[serde(default)]
    pub tasks_failed: u64,
}

/// The liveness blob stored per agent, replaced on each heartbeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    /// idle or busy.
    #[serde(default)]
    pub status: WorkerStatus,
    /// Last heartbeat receipt time. None until the first heartbeat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Task currently leased to this worker, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<Uuid>,
    /// Latest reported metrics.
    #[serde(default)]
    pub metrics: HeartbeatMetrics,
}

/// A registered Bee worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Worker identifier, chosen by the worker (e.g. "docbee-7f3a91c2").
    pub id: String,
    /// Role string, e.g. "DocBee".
    pub role: String,
    /// Capability tags this worker claims to support.
    pub skills: Vec<String>,
    /// Liveness blob, updated by heartbeats.
    pub state: AgentState,
    /// Opaque registration config supplied by the worker.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Whether this agent participates in dispatch.
    pub active: bool,
    /// When the agent registered.
    pub created_at: DateTime<Utc>,
    /// When the agent record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Create a fresh agent record in the just-registered state.
    pub fn new(id: impl Into<String>, role: impl Into<String>, skills: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            role: role.into(),
            skills,
            state: AgentState::default(),
            config: serde_json::Value::Object(serde_json::Map::new()),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: attach the registration config blob.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_strings_round_trip() {
        for role in BeeRole::ALL {
            let parsed: BeeRole = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = "QueenBee".parse::<BeeRole>().unwrap_err();
        assert!(err.contains("QueenBee"));
    }

    #[test]
    fn every_role_has_default_skills() {
        for role in BeeRole::ALL {
            assert!(!role.default_skills().is_empty(), "{role} has no skills");
        }
        assert!(BeeRole::Doc.default_skills().contains(&"summarize"));
        assert!(BeeRole::Code.default_skills().contains(&"review_code"));
    }

    #[test]
    fn new_agent_starts_idle_and_active() {
        let agent = Agent::new("docbee-1", "DocBee", vec!["summarize".into()]);
        assert_eq!(agent.state.status, WorkerStatus::Idle);
        assert!(agent.state.last_heartbeat_at.is_none());
        assert!(agent.state.current_task_id.is_none());
        assert!(agent.active);
    }

    #[test]
    fn agent_state_serde_round_trip() {
        let state = AgentState {
            status: WorkerStatus::Busy,
            last_heartbeat_at: Some(Utc::now()),
            current_task_id: Some(Uuid::new_v4()),
            metrics: HeartbeatMetrics {
                cpu_percent: 12.5,
                memory_mb: 48.0,
                tasks_completed: 7,
                tasks_failed: 1,
            },
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"status\":\"busy\""));
        let parsed: AgentState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, WorkerStatus::Busy);
        assert_eq!(parsed.metrics.tasks_completed, 7);
    }

    #[test]
    fn agent_state_defaults_parse_from_empty_blob() {
        let parsed: AgentState = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.status, WorkerStatus::Idle);
        assert_eq!(parsed.metrics.tasks_completed, 0);
    }
}
