//! Persistence layer.
//!
//! The [`TaskStore`] trait is the seam between the foreman and its database.
//! [`LibSqlStore`] is the production backend; tests can swap in anything that
//! implements the trait.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{LeaseGrant, TaskStore};
