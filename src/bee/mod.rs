//! The Bee worker: executors, payload screening, and the engine that
//! drives the poll → execute → report loop against a Foreman.

pub mod builtin;
pub mod engine;
pub mod executor;
pub mod guardian;
pub mod state;

pub use builtin::DocExecutor;
pub use engine::{Bee, BeeHandles, CycleOutcome};
pub use executor::{Executor, ExecutorRegistry};
pub use guardian::{Guardian, GuardianStats, Verdict};
pub use state::WorkerState;
