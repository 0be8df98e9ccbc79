//! Error types for Colony OS.

use std::time::Duration;

use uuid::Uuid;

use crate::agents::model::BeeRole;

/// Top-level error type for the dispatch core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Task store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// RPC transport errors (worker ⇄ Foreman).
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Call timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Server returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Failed to decode response: {reason}")]
    Decode { reason: String },

    #[error("Internal error: {0}")]
    Internal(#[from] StoreError),
}

/// Worker-side execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("No executor registered for role {role}")]
    MissingExecutor { role: BeeRole },

    #[error("Task {task_id} execution failed: {reason}")]
    Failed { task_id: Uuid, reason: String },

    #[error("Invalid payload for task {task_id}: {reason}")]
    InvalidPayload { task_id: Uuid, reason: String },
}

impl ExecutorError {
    /// Whether retrying the task could help. Bad payloads and missing
    /// executors fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Failed { .. } => true,
            Self::MissingExecutor { .. } | Self::InvalidPayload { .. } => false,
        }
    }
}

/// Result type alias for the dispatch core.
pub type Result<T> = std::result::Result<T, Error>;
