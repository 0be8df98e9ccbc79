//! Foreman — the task router.
//!
//! Workers never talk to each other or to the database; everything flows
//! through the foreman, which matches tasks to pullers, issues leases, and
//! applies the retry policy. The [`reaper`] sweeps up after workers that
//! die mid-task.

pub mod reaper;
pub mod service;

pub use reaper::spawn_reaper_loop;
pub use service::Foreman;
