//! Task domain — the unit of work moving through the dispatch core.

pub mod model;

pub use model::{NewTask, Task, TaskPriority, TaskStatus};
