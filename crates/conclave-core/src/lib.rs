//! Conclave core — the coordination substrate shared by every other crate.
//!
//! Holds the domain types (agents, tasks, messages), the error taxonomy,
//! the per-agent-inbox message broker, the SQLite store, and the YAML
//! configuration schema.

pub mod broker;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Error, Result};
