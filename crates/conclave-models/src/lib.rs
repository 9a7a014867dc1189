//! Model backends for Conclave.
//!
//! The [`ModelRouter`] hands out text generation keyed by `model_id`,
//! lazily loading one backend per model behind a per-model load guard.
//! Backends are HTTP adapters over local model servers; the router treats
//! each as an opaque "given prompt, produce text" service.

pub mod http;
pub mod router;
pub mod traits;

pub use router::ModelRouter;
pub use traits::{Generator, ModelBackend, ModelError};
