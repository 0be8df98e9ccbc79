//! Colony OS — lease-based task dispatch core.
//!
//! The [`foreman`] module is the router: it owns the queue, grants leases,
//! and reclaims them when workers die. The [`bee`] module is the worker:
//! it polls, executes, and reports. They speak the JSON protocol in [`rpc`]
//! over HTTP, with all durable state behind the [`store`] trait.

pub mod agents;
pub mod bee;
pub mod config;
pub mod error;
pub mod foreman;
pub mod rpc;
pub mod store;
pub mod tasks;
