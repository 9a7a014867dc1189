//! Tool layer — the [`Tool`] trait, the startup-time registry, and the
//! built-in tools.

pub mod base;
pub mod code;
pub mod files;
pub mod registry;
pub mod web;

pub use base::Tool;
pub use registry::{ToolInfo, ToolRegistry};
