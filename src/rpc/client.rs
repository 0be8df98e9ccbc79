//! HTTP client for the foreman protocol.
//!
//! Thin [`ForemanApi`] implementation over reqwest. One POST per operation,
//! JSON both ways, with transport errors folded into [`RpcError`] so the
//! worker engine never sees reqwest types.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::RpcError;
use crate::rpc::types::{
    HeartbeatRequest, HeartbeatResponse, PullTaskRequest, PullTaskResponse, RegisterWorkerRequest,
    RegisterWorkerResponse, ReportFailureRequest, ReportFailureResponse, ReportResultRequest,
    ReportResultResponse,
};
use crate::rpc::ForemanApi;

/// HTTP client for a remote foreman.
pub struct HttpForemanClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpForemanClient {
    /// Create a client for the foreman at `base_url` (scheme + host + port,
    /// no trailing path).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                reason: e.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST a request body and decode the JSON response.
    async fn post_json<Req, Resp>(&self, path: &str, req: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.endpoint(path))
            .json(req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout {
                        timeout: self.timeout,
                    }
                } else {
                    RpcError::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                code: status.as_u16(),
                message,
            });
        }

        resp.json::<Resp>().await.map_err(|e| RpcError::Decode {
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ForemanApi for HttpForemanClient {
    async fn pull_task(&self, req: PullTaskRequest) -> Result<PullTaskResponse, RpcError> {
        self.post_json("/api/v1/tasks/pull", &req).await
    }

    async fn report_result(
        &self,
        req: ReportResultRequest,
    ) -> Result<ReportResultResponse, RpcError> {
        self.post_json("/api/v1/tasks/result", &req).await
    }

    async fn report_failure(
        &self,
        req: ReportFailureRequest,
    ) -> Result<ReportFailureResponse, RpcError> {
        self.post_json("/api/v1/tasks/failure", &req).await
    }

    async fn heartbeat(&self, req: HeartbeatRequest) -> Result<HeartbeatResponse, RpcError> {
        self.post_json("/api/v1/workers/heartbeat", &req).await
    }

    async fn register_worker(
        &self,
        req: RegisterWorkerRequest,
    ) -> Result<RegisterWorkerResponse, RpcError> {
        self.post_json("/api/v1/workers/register", &req).await
    }
}
