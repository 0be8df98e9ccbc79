//! Worker engine — the poll → execute → report lifecycle.
//!
//! A [`Bee`] registers with the foreman, then runs two loops as separate
//! tokio tasks: the work loop pulls and executes tasks, the heartbeat loop
//! reports liveness on its own clock. RPC failures never kill a loop; the
//! worker logs, backs off, and keeps going until the foreman is back.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bee::executor::{Executor, ExecutorRegistry};
use crate::bee::guardian::{Guardian, GuardianStats, Verdict};
use crate::bee::state::WorkerState;
use crate::config::BeeConfig;
use crate::error::{ExecutorError, RpcError};
use crate::rpc::ForemanApi;
use crate::rpc::types::{
    HeartbeatRequest, PullTaskRequest, RegisterWorkerRequest, RegisterWorkerResponse,
    ReportFailureRequest, ReportResultRequest, TaskEnvelope,
};

/// How many times registration is attempted before giving up.
const REGISTER_ATTEMPTS: u32 = 5;

/// What one pass of the work loop did, which decides how long to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A task was claimed and reported; poll again immediately.
    Executed,
    /// Queue was empty; sleep one poll interval.
    Idle,
    /// The foreman was unreachable; sleep the error backoff.
    TransportError,
}

/// A worker: configuration, a foreman connection, and one executor.
pub struct Bee {
    config: BeeConfig,
    api: Arc<dyn ForemanApi>,
    executor: Arc<dyn Executor>,
    guardian: Guardian,
    state: Arc<WorkerState>,
}

/// Handles for the two spawned loops.
pub struct BeeHandles {
    pub work: JoinHandle<()>,
    pub heartbeat: JoinHandle<()>,
}

impl BeeHandles {
    /// Wait for both loops. They only end on abort.
    pub async fn join(self) {
        let _ = tokio::join!(self.work, self.heartbeat);
    }

    pub fn abort(&self) {
        self.work.abort();
        self.heartbeat.abort();
    }
}

impl Bee {
    /// Build a worker, resolving its executor from the registry.
    pub fn new(
        config: BeeConfig,
        api: Arc<dyn ForemanApi>,
        registry: &ExecutorRegistry,
    ) -> Result<Self, ExecutorError> {
        let executor = registry.resolve(config.role)?;
        Ok(Self {
            config,
            api,
            executor,
            guardian: Guardian::new(),
            state: Arc::new(WorkerState::new()),
        })
    }

    pub fn config(&self) -> &BeeConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<WorkerState> {
        &self.state
    }

    pub fn guardian_stats(&self) -> GuardianStats {
        self.guardian.stats()
    }

    /// Register, then spawn the work and heartbeat loops.
    pub async fn start(self) -> Result<BeeHandles, RpcError> {
        self.register().await?;
        info!(
            bee_id = %self.config.bee_id,
            role = %self.config.role,
            skills = ?self.config.capabilities,
            "Worker starting"
        );

        let engine = Arc::new(self);

        let work = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.work_loop().await })
        };
        let heartbeat = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.heartbeat_loop().await })
        };

        Ok(BeeHandles { work, heartbeat })
    }

    /// Announce this worker to the foreman, with bounded retries.
    pub async fn register(&self) -> Result<(), RpcError> {
        let mut last_err: Option<RpcError> = None;

        for attempt in 1..=REGISTER_ATTEMPTS {
            match self.register_once().await {
                Ok(resp) => {
                    if resp.registered {
                        info!(bee_id = %self.config.bee_id, role = %self.config.role, "Registered with foreman");
                    } else {
                        info!(bee_id = %self.config.bee_id, "Foreman already knows this worker");
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = REGISTER_ATTEMPTS,
                        error = %e,
                        "Registration attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < REGISTER_ATTEMPTS {
                        tokio::time::sleep(self.config.error_backoff).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(RpcError::Transport {
            reason: "registration never attempted".into(),
        }))
    }

    async fn register_once(&self) -> Result<RegisterWorkerResponse, RpcError> {
        self.api
            .register_worker(RegisterWorkerRequest {
                bee_id: self.config.bee_id.clone(),
                role: self.config.role.as_str().to_string(),
                skills: self.config.capabilities.clone(),
                config: serde_json::json!({
                    "poll_interval_secs": self.config.poll_interval.as_secs(),
                    "heartbeat_interval_secs": self.config.heartbeat_interval.as_secs(),
                }),
            })
            .await
    }

    async fn work_loop(&self) {
        loop {
            match self.run_work_cycle().await {
                CycleOutcome::Executed => {}
                CycleOutcome::Idle => tokio::time::sleep(self.config.poll_interval).await,
                CycleOutcome::TransportError => {
                    tokio::time::sleep(self.config.error_backoff).await
                }
            }
        }
    }

    async fn heartbeat_loop(&self) {
        // First tick fires immediately, announcing the worker as alive
        // right after registration.
        let mut tick = tokio::time::interval(self.config.heartbeat_interval);
        loop {
            tick.tick().await;
            self.run_heartbeat_cycle().await;
        }
    }

    /// One pass of the work loop: pull, execute, report.
    pub async fn run_work_cycle(&self) -> CycleOutcome {
        let pulled = match self
            .api
            .pull_task(PullTaskRequest {
                bee_id: self.config.bee_id.clone(),
                role: self.config.role.as_str().to_string(),
                capabilities: self.config.capabilities.clone(),
            })
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "Pull failed");
                return CycleOutcome::TransportError;
            }
        };

        let (Some(task), Some(lease_id)) = (pulled.task, pulled.lease_id) else {
            debug!("No work available");
            return CycleOutcome::Idle;
        };

        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            attempt = task.attempts,
            "Executing task"
        );

        self.state.set_current_task(Some(task.id)).await;
        let outcome = self.execute_and_report(&task, lease_id).await;
        self.state.set_current_task(None).await;
        outcome
    }

    async fn execute_and_report(&self, task: &TaskEnvelope, lease_id: Uuid) -> CycleOutcome {
        if let Verdict::Blocked { reason } = self.guardian.screen(&task.payload) {
            warn!(task_id = %task.id, reason = %reason, "Guardian blocked payload");
            self.state.record_failure();
            return self
                .send_failure(task, lease_id, format!("Guardian: {reason}"), None, false)
                .await;
        }

        let started = Instant::now();
        match self.executor.execute(task).await {
            Ok(result) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.send_result(task, lease_id, result, elapsed_ms).await
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Execution failed");
                self.state.record_failure();
                let trace = format!("{e:?}");
                self.send_failure(task, lease_id, e.to_string(), Some(trace), e.is_retryable())
                    .await
            }
        }
    }

    async fn send_result(
        &self,
        task: &TaskEnvelope,
        lease_id: Uuid,
        result: serde_json::Value,
        elapsed_ms: u64,
    ) -> CycleOutcome {
        match self
            .api
            .report_result(ReportResultRequest {
                task_id: task.id,
                lease_id,
                result,
                execution_time_ms: Some(elapsed_ms),
            })
            .await
        {
            Ok(resp) if resp.acknowledged => {
                self.state.record_success();
                info!(task_id = %task.id, elapsed_ms, "Task completed");
                CycleOutcome::Executed
            }
            Ok(_) => {
                warn!(task_id = %task.id, "Result discarded, lease was stale");
                CycleOutcome::Executed
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to report result");
                CycleOutcome::TransportError
            }
        }
    }

    async fn send_failure(
        &self,
        task: &TaskEnvelope,
        lease_id: Uuid,
        error: String,
        error_trace: Option<String>,
        retryable: bool,
    ) -> CycleOutcome {
        match self
            .api
            .report_failure(ReportFailureRequest {
                task_id: task.id,
                lease_id,
                error,
                error_trace,
                retryable,
            })
            .await
        {
            Ok(resp) => {
                if resp.will_retry {
                    info!(task_id = %task.id, retry_count = resp.retry_count, "Task will be retried");
                } else if resp.acknowledged {
                    warn!(task_id = %task.id, retry_count = resp.retry_count, "Task failed terminally");
                } else {
                    warn!(task_id = %task.id, "Failure report discarded, lease was stale");
                }
                CycleOutcome::Executed
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to report failure");
                CycleOutcome::TransportError
            }
        }
    }

    /// One heartbeat: send status and counters, re-register if forgotten.
    pub async fn run_heartbeat_cycle(&self) {
        let req = HeartbeatRequest {
            bee_id: self.config.bee_id.clone(),
            status: self.state.status().await,
            current_task_id: self.state.current_task().await,
            metrics: self.state.metrics(),
        };

        match self.api.heartbeat(req).await {
            Ok(resp) => {
                if let Some(command) = resp.command {
                    info!(?command, "Ignoring control command");
                }
                if resp.acknowledged {
                    debug!(bee_id = %self.config.bee_id, "Heartbeat acknowledged");
                } else {
                    warn!(bee_id = %self.config.bee_id, "Heartbeat unacknowledged, re-registering");
                    if let Err(e) = self.register_once().await {
                        warn!(error = %e, "Re-registration failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Heartbeat failed"),
        }
    }
}
