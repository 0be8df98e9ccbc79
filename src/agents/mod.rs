//! Agent domain — registered workers, roles, and liveness state.

pub mod model;

pub use model::{Agent, AgentState, BeeRole, HeartbeatMetrics, WorkerStatus};
