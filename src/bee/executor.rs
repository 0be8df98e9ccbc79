//! Executor abstraction — what a worker actually does with a task.
//!
//! One executor per role. The registry is assembled at startup and the
//! worker resolves its executor once, so a missing executor fails the
//! process at boot instead of failing tasks one by one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::model::BeeRole;
use crate::error::ExecutorError;
use crate::rpc::types::TaskEnvelope;

/// A task executor for one worker role.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The role this executor serves.
    fn role(&self) -> BeeRole;

    /// Execute a claimed task and produce its result payload.
    async fn execute(&self, task: &TaskEnvelope) -> Result<serde_json::Value, ExecutorError>;
}

/// Registry of executors, keyed by role.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<BeeRole, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own role. Replaces any previous
    /// executor for that role.
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.role(), executor);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, executor: Arc<dyn Executor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, role: BeeRole) -> Option<Arc<dyn Executor>> {
        self.executors.get(&role).cloned()
    }

    /// Resolve the executor for a role, failing when none is registered.
    pub fn resolve(&self, role: BeeRole) -> Result<Arc<dyn Executor>, ExecutorError> {
        self.get(role).ok_or(ExecutorError::MissingExecutor { role })
    }

    pub fn roles(&self) -> Vec<BeeRole> {
        self.executors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
