//! Foreman service — routes tasks to workers and tracks their liveness.
//!
//! Implements [`ForemanApi`] directly, so the HTTP adapter and in-process
//! callers (tests, embedded workers) go through the same code path.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::model::{Agent, AgentState};
use crate::config::ForemanConfig;
use crate::error::{RpcError, StoreError};
use crate::rpc::types::{
    HeartbeatRequest, HeartbeatResponse, PullTaskRequest, PullTaskResponse, RegisterWorkerRequest,
    RegisterWorkerResponse, ReportFailureRequest, ReportFailureResponse, ReportResultRequest,
    ReportResultResponse, TaskEnvelope,
};
use crate::rpc::ForemanApi;
use crate::store::{LeaseGrant, TaskStore};
use crate::tasks::model::{NewTask, Task};

/// Which matching tier satisfied a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchTier {
    Category,
    Labels,
    General,
}

impl MatchTier {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Labels => "labels",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task router. Owns the claim/report/heartbeat protocol; persistence goes
/// through the [`TaskStore`] seam.
pub struct Foreman {
    store: Arc<dyn TaskStore>,
    config: ForemanConfig,
}

impl Foreman {
    pub fn new(store: Arc<dyn TaskStore>, config: ForemanConfig) -> Self {
        Self { store, config }
    }

    /// Enqueue a new task.
    pub async fn submit_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let task = self.store.insert_task(&new).await?;
        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            priority = %task.priority.as_str(),
            category = task.semantic_category.as_deref().unwrap_or("-"),
            "Task submitted"
        );
        Ok(task)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.store.get_task(id).await
    }

    pub async fn list_workers(&self) -> Result<Vec<Agent>, StoreError> {
        self.store.list_agents().await
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &ForemanConfig {
        &self.config
    }

    /// Walk the three matching tiers in order, stopping at the first claim.
    async fn claim_for(
        &self,
        req: &PullTaskRequest,
        grant: &LeaseGrant,
    ) -> Result<Option<(Task, MatchTier)>, StoreError> {
        if let Some(task) = self.store.claim_by_category(&req.role, grant).await? {
            return Ok(Some((task, MatchTier::Category)));
        }
        if let Some(task) = self.store.claim_by_labels(&req.capabilities, grant).await? {
            return Ok(Some((task, MatchTier::Labels)));
        }
        if let Some(task) = self.store.claim_any(grant).await? {
            return Ok(Some((task, MatchTier::General)));
        }
        Ok(None)
    }
}

#[async_trait]
impl ForemanApi for Foreman {
    async fn pull_task(&self, req: PullTaskRequest) -> Result<PullTaskResponse, RpcError> {
        let grant = LeaseGrant::issue(&req.bee_id, self.config.lease_ttl);

        match self.claim_for(&req, &grant).await? {
            Some((task, tier)) => {
                info!(
                    task_id = %task.id,
                    bee_id = %req.bee_id,
                    tier = %tier,
                    attempt = task.attempts,
                    "Task claimed"
                );
                Ok(PullTaskResponse {
                    task: Some(TaskEnvelope::from(&task)),
                    lease_id: Some(grant.lease_id),
                    lease_expires_at: Some(grant.expires_at),
                })
            }
            None => {
                debug!(bee_id = %req.bee_id, role = %req.role, "No matching task");
                Ok(PullTaskResponse::empty())
            }
        }
    }

    async fn report_result(
        &self,
        req: ReportResultRequest,
    ) -> Result<ReportResultResponse, RpcError> {
        let acknowledged = self
            .store
            .complete_task(req.task_id, req.lease_id, &req.result)
            .await?;

        if acknowledged {
            info!(
                task_id = %req.task_id,
                execution_time_ms = req.execution_time_ms,
                "Task completed"
            );
        } else {
            warn!(task_id = %req.task_id, "Rejected result under stale lease");
        }
        Ok(ReportResultResponse { acknowledged })
    }

    async fn report_failure(
        &self,
        req: ReportFailureRequest,
    ) -> Result<ReportFailureResponse, RpcError> {
        let Some(task) = self.store.get_task(req.task_id).await? else {
            warn!(task_id = %req.task_id, "Failure report for unknown task");
            return Ok(ReportFailureResponse {
                acknowledged: false,
                will_retry: false,
                retry_count: 0,
            });
        };

        if !task.holds_lease(req.lease_id) {
            warn!(task_id = %task.id, "Rejected failure report under stale lease");
            return Ok(ReportFailureResponse {
                acknowledged: false,
                will_retry: false,
                retry_count: task.attempts,
            });
        }

        let will_retry = req.retryable && task.attempts < self.config.max_retries;

        let acknowledged = if will_retry {
            self.store.release_task(req.task_id, req.lease_id).await?
        } else {
            let error = match req.error_trace.as_deref() {
                Some(trace) => format!("{}\n{trace}", req.error),
                None => req.error.clone(),
            };
            self.store.fail_task(req.task_id, req.lease_id, &error).await?
        };

        // The reaper can sweep the lease between our read and this write.
        if !acknowledged {
            warn!(task_id = %req.task_id, "Lease changed while handling failure report");
            return Ok(ReportFailureResponse {
                acknowledged: false,
                will_retry: false,
                retry_count: task.attempts,
            });
        }

        if will_retry {
            info!(
                task_id = %task.id,
                attempt = task.attempts,
                max_retries = self.config.max_retries,
                "Task requeued for retry"
            );
        } else {
            warn!(
                task_id = %task.id,
                attempts = task.attempts,
                error = %req.error,
                "Task failed terminally"
            );
        }

        Ok(ReportFailureResponse {
            acknowledged: true,
            will_retry,
            retry_count: task.attempts,
        })
    }

    async fn heartbeat(&self, req: HeartbeatRequest) -> Result<HeartbeatResponse, RpcError> {
        let state = AgentState {
            status: req.status,
            last_heartbeat_at: Some(Utc::now()),
            current_task_id: req.current_task_id,
            metrics: req.metrics,
        };

        let acknowledged = self.store.record_heartbeat(&req.bee_id, &state).await?;
        if acknowledged {
            debug!(bee_id = %req.bee_id, status = %state.status, "Heartbeat recorded");
        } else {
            warn!(bee_id = %req.bee_id, "Heartbeat from unknown worker");
        }

        Ok(HeartbeatResponse {
            acknowledged,
            command: None,
        })
    }

    async fn register_worker(
        &self,
        req: RegisterWorkerRequest,
    ) -> Result<RegisterWorkerResponse, RpcError> {
        let agent =
            Agent::new(&req.bee_id, &req.role, req.skills.clone()).with_config(req.config.clone());

        let registered = self.store.register_agent(&agent).await?;
        if registered {
            info!(bee_id = %req.bee_id, role = %req.role, skills = ?req.skills, "Worker registered");
        } else {
            info!(bee_id = %req.bee_id, "Worker already registered, keeping existing record");
        }

        Ok(RegisterWorkerResponse {
            registered,
            worker_id: req.bee_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::model::WorkerStatus;
    use crate::store::LibSqlStore;
    use crate::tasks::model::{TaskPriority, TaskStatus};

    async fn foreman() -> Foreman {
        foreman_with(ForemanConfig::default()).await
    }

    async fn foreman_with(config: ForemanConfig) -> Foreman {
        let store = LibSqlStore::new_memory().await.unwrap();
        Foreman::new(Arc::new(store), config)
    }

    fn pull_req(bee_id: &str, role: &str, capabilities: &[&str]) -> PullTaskRequest {
        PullTaskRequest {
            bee_id: bee_id.into(),
            role: role.into(),
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn submit(foreman: &Foreman, new: NewTask) -> Task {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        foreman.submit_task(new).await.unwrap()
    }

    #[tokio::test]
    async fn pull_from_empty_queue_returns_empty_response() {
        let foreman = foreman().await;
        let resp = foreman
            .pull_task(pull_req("bee-1", "DocBee", &[]))
            .await
            .unwrap();
        assert!(resp.task.is_none());
        assert!(resp.lease_id.is_none());
        assert!(resp.lease_expires_at.is_none());
    }

    #[tokio::test]
    async fn pull_prefers_category_over_labels_and_general() {
        let foreman = foreman().await;
        let general = submit(&foreman, NewTask::new("general", serde_json::json!({}))).await;
        let labeled = submit(
            &foreman,
            NewTask::new("labeled", serde_json::json!({})).with_labels(vec!["summarize".into()]),
        )
        .await;
        let categorized = submit(
            &foreman,
            NewTask::new("categorized", serde_json::json!({})).with_category("DocBee"),
        )
        .await;

        let resp = foreman
            .pull_task(pull_req("bee-1", "DocBee", &["summarize"]))
            .await
            .unwrap();
        assert_eq!(resp.task.unwrap().id, categorized.id);

        // Category drained; labels are next even though the general task is older.
        let resp = foreman
            .pull_task(pull_req("bee-1", "DocBee", &["summarize"]))
            .await
            .unwrap();
        assert_eq!(resp.task.unwrap().id, labeled.id);

        let resp = foreman
            .pull_task(pull_req("bee-1", "DocBee", &["summarize"]))
            .await
            .unwrap();
        assert_eq!(resp.task.unwrap().id, general.id);
    }

    #[tokio::test]
    async fn pull_issues_fresh_lease_per_claim() {
        let foreman = foreman().await;
        let task = submit(&foreman, NewTask::new("t", serde_json::json!({}))).await;

        let first = foreman
            .pull_task(pull_req("bee-1", "DocBee", &[]))
            .await
            .unwrap();
        let first_lease = first.lease_id.unwrap();

        // Requeue and claim again; the lease must differ.
        foreman
            .report_failure(ReportFailureRequest {
                task_id: task.id,
                lease_id: first_lease,
                error: "transient".into(),
                error_trace: None,
                retryable: true,
            })
            .await
            .unwrap();

        let second = foreman
            .pull_task(pull_req("bee-2", "DocBee", &[]))
            .await
            .unwrap();
        assert_ne!(second.lease_id.unwrap(), first_lease);
        assert_eq!(second.task.unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn high_priority_claimed_before_older_medium() {
        let foreman = foreman().await;
        let _older = submit(&foreman, NewTask::new("m", serde_json::json!({}))).await;
        let high = submit(
            &foreman,
            NewTask::new("h", serde_json::json!({})).with_priority(TaskPriority::High),
        )
        .await;

        let resp = foreman
            .pull_task(pull_req("bee-1", "DocBee", &[]))
            .await
            .unwrap();
        assert_eq!(resp.task.unwrap().id, high.id);
    }

    #[tokio::test]
    async fn report_result_marks_task_done() {
        let foreman = foreman().await;
        let task = submit(&foreman, NewTask::new("t", serde_json::json!({}))).await;

        let pulled = foreman
            .pull_task(pull_req("bee-1", "DocBee", &[]))
            .await
            .unwrap();
        let lease_id = pulled.lease_id.unwrap();

        let resp = foreman
            .report_result(ReportResultRequest {
                task_id: task.id,
                lease_id,
                result: serde_json::json!({"summary": "done"}),
                execution_time_ms: Some(12),
            })
            .await
            .unwrap();
        assert!(resp.acknowledged);

        let stored = foreman.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Done);
        assert_eq!(stored.result, Some(serde_json::json!({"summary": "done"})));
    }

    #[tokio::test]
    async fn stale_lease_result_is_discarded() {
        let foreman = foreman().await;
        let task = submit(&foreman, NewTask::new("t", serde_json::json!({}))).await;
        foreman
            .pull_task(pull_req("bee-1", "DocBee", &[]))
            .await
            .unwrap();

        let resp = foreman
            .report_result(ReportResultRequest {
                task_id: task.id,
                lease_id: Uuid::new_v4(),
                result: serde_json::json!({"stale": true}),
                execution_time_ms: None,
            })
            .await
            .unwrap();
        assert!(!resp.acknowledged);

        let stored = foreman.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
        assert!(stored.result.is_none());
    }

    #[tokio::test]
    async fn retryable_failures_requeue_until_budget_exhausted() {
        let foreman = foreman().await;
        let task = submit(&foreman, NewTask::new("flaky", serde_json::json!({}))).await;

        // Default budget is three attempts.
        for attempt in 1..=3u32 {
            let pulled = foreman
                .pull_task(pull_req("bee-1", "DocBee", &[]))
                .await
                .unwrap();
            let envelope = pulled.task.unwrap();
            assert_eq!(envelope.id, task.id);
            assert_eq!(envelope.attempts, attempt);

            let resp = foreman
                .report_failure(ReportFailureRequest {
                    task_id: task.id,
                    lease_id: pulled.lease_id.unwrap(),
                    error: "boom".into(),
                    error_trace: None,
                    retryable: true,
                })
                .await
                .unwrap();
            assert!(resp.acknowledged);
            assert_eq!(resp.retry_count, attempt);
            assert_eq!(resp.will_retry, attempt < 3);
        }

        let stored = foreman.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.attempts, 3);

        // Nothing left to pull.
        let resp = foreman
            .pull_task(pull_req("bee-1", "DocBee", &[]))
            .await
            .unwrap();
        assert!(resp.task.is_none());
    }

    #[tokio::test]
    async fn non_retryable_failure_is_immediately_terminal() {
        let foreman = foreman().await;
        let task = submit(&foreman, NewTask::new("t", serde_json::json!({}))).await;
        let pulled = foreman
            .pull_task(pull_req("bee-1", "DocBee", &[]))
            .await
            .unwrap();

        let resp = foreman
            .report_failure(ReportFailureRequest {
                task_id: task.id,
                lease_id: pulled.lease_id.unwrap(),
                error: "invalid payload".into(),
                error_trace: Some("at execute()".into()),
                retryable: false,
            })
            .await
            .unwrap();
        assert!(resp.acknowledged);
        assert!(!resp.will_retry);
        assert_eq!(resp.retry_count, 1);

        let stored = foreman.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        let error = stored.error.unwrap();
        assert!(error.contains("invalid payload"));
        assert!(error.contains("at execute()"));
    }

    #[tokio::test]
    async fn stale_lease_failure_report_is_unacknowledged() {
        let foreman = foreman().await;
        let task = submit(&foreman, NewTask::new("t", serde_json::json!({}))).await;
        foreman
            .pull_task(pull_req("bee-1", "DocBee", &[]))
            .await
            .unwrap();

        let resp = foreman
            .report_failure(ReportFailureRequest {
                task_id: task.id,
                lease_id: Uuid::new_v4(),
                error: "boom".into(),
                error_trace: None,
                retryable: true,
            })
            .await
            .unwrap();
        assert!(!resp.acknowledged);
        assert!(!resp.will_retry);

        let stored = foreman.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn failure_report_for_unknown_task_is_unacknowledged() {
        let foreman = foreman().await;
        let resp = foreman
            .report_failure(ReportFailureRequest {
                task_id: Uuid::new_v4(),
                lease_id: Uuid::new_v4(),
                error: "?".into(),
                error_trace: None,
                retryable: true,
            })
            .await
            .unwrap();
        assert!(!resp.acknowledged);
        assert_eq!(resp.retry_count, 0);
    }

    #[tokio::test]
    async fn register_then_heartbeat_round_trip() {
        let foreman = foreman().await;

        let reg = foreman
            .register_worker(RegisterWorkerRequest {
                bee_id: "docbee-1".into(),
                role: "DocBee".into(),
                skills: vec!["summarize".into()],
                config: serde_json::json!({"model": "small"}),
            })
            .await
            .unwrap();
        assert!(reg.registered);
        assert_eq!(reg.worker_id, "docbee-1");

        let task_id = Uuid::new_v4();
        let hb = foreman
            .heartbeat(HeartbeatRequest {
                bee_id: "docbee-1".into(),
                status: WorkerStatus::Busy,
                current_task_id: Some(task_id),
                metrics: crate::agents::model::HeartbeatMetrics {
                    tasks_completed: 2,
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        assert!(hb.acknowledged);
        assert!(hb.command.is_none());

        let workers = foreman.list_workers().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].state.status, WorkerStatus::Busy);
        assert_eq!(workers[0].state.current_task_id, Some(task_id));
        assert!(workers[0].state.last_heartbeat_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_existing_record() {
        let foreman = foreman().await;
        for expected in [true, false] {
            let resp = foreman
                .register_worker(RegisterWorkerRequest {
                    bee_id: "docbee-1".into(),
                    role: "DocBee".into(),
                    skills: vec![],
                    config: serde_json::json!({}),
                })
                .await
                .unwrap();
            assert_eq!(resp.registered, expected);
        }
    }

    #[tokio::test]
    async fn heartbeat_from_unknown_worker_is_unacknowledged() {
        let foreman = foreman().await;
        let hb = foreman
            .heartbeat(HeartbeatRequest {
                bee_id: "ghost".into(),
                status: WorkerStatus::Idle,
                current_task_id: None,
                metrics: Default::default(),
            })
            .await
            .unwrap();
        assert!(!hb.acknowledged);
    }

    #[tokio::test]
    async fn retry_budget_follows_config() {
        let foreman = foreman_with(ForemanConfig {
            max_retries: 1,
            ..Default::default()
        })
        .await;
        let task = submit(&foreman, NewTask::new("t", serde_json::json!({}))).await;

        let pulled = foreman
            .pull_task(pull_req("bee-1", "DocBee", &[]))
            .await
            .unwrap();
        let resp = foreman
            .report_failure(ReportFailureRequest {
                task_id: task.id,
                lease_id: pulled.lease_id.unwrap(),
                error: "boom".into(),
                error_trace: None,
                retryable: true,
            })
            .await
            .unwrap();
        assert!(!resp.will_retry);

        let stored = foreman.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
    }
}
