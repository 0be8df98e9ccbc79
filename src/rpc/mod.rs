//! Worker-facing protocol: wire types, the [`ForemanApi`] trait, and the
//! HTTP client/server adapters.
//!
//! The trait keeps the protocol transport-agnostic. The foreman service
//! implements it directly for in-process callers; [`HttpForemanClient`]
//! implements it over HTTP for remote workers. The worker engine only ever
//! sees `Arc<dyn ForemanApi>`.

pub mod client;
pub mod http;
pub mod types;

use async_trait::async_trait;

use crate::error::RpcError;
pub use client::HttpForemanClient;
pub use types::{
    ControlCommand, HeartbeatRequest, HeartbeatResponse, PullTaskRequest, PullTaskResponse,
    RegisterWorkerRequest, RegisterWorkerResponse, ReportFailureRequest, ReportFailureResponse,
    ReportResultRequest, ReportResultResponse, TaskEnvelope,
};

/// The five operations every worker needs from the foreman.
#[async_trait]
pub trait ForemanApi: Send + Sync {
    /// Ask for work. Returns an empty response when nothing matches.
    async fn pull_task(&self, req: PullTaskRequest) -> Result<PullTaskResponse, RpcError>;

    /// Report a successful execution under a lease.
    async fn report_result(
        &self,
        req: ReportResultRequest,
    ) -> Result<ReportResultResponse, RpcError>;

    /// Report a failed execution. The foreman decides whether to retry.
    async fn report_failure(
        &self,
        req: ReportFailureRequest,
    ) -> Result<ReportFailureResponse, RpcError>;

    /// Periodic liveness signal with current status and counters.
    async fn heartbeat(&self, req: HeartbeatRequest) -> Result<HeartbeatResponse, RpcError>;

    /// Announce a worker. Idempotent per `bee_id`.
    async fn register_worker(
        &self,
        req: RegisterWorkerRequest,
    ) -> Result<RegisterWorkerResponse, RpcError>;
}
