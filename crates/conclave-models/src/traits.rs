//! The model backend abstraction.
//!
//! Every model family (llama.cpp-style servers, text-generation-inference
//! servers) implements [`ModelBackend`]. The router owns one instance per
//! `model_id` and shares it across agents.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the model layer. All propagate unchanged to callers.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The model id is not present in the configuration.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The backend could not be brought up (server unreachable, bad config).
    #[error("failed to load backend for '{model_id}': {reason}")]
    BackendLoadFailure { model_id: String, reason: String },

    /// The backend accepted the request but generation failed.
    #[error("generation failed on '{model_id}': {reason}")]
    GenerationFailure { model_id: String, reason: String },
}

impl From<ModelError> for conclave_core::Error {
    fn from(e: ModelError) -> Self {
        match &e {
            ModelError::UnknownModel(_) => conclave_core::Error::NotFound(e.to_string()),
            ModelError::BackendLoadFailure { .. } | ModelError::GenerationFailure { .. } => {
                conclave_core::Error::BackendUnavailable(e.to_string())
            }
        }
    }
}

/// Anything that can complete a prompt for a named model — implemented by
/// the router and by test stubs in the agent crate.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, model_id: &str, prompt: &str) -> Result<String, ModelError>;
}

/// A loaded model instance. May block for seconds to minutes per call.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Produce a completion for `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, ModelError>;

    /// The model id this backend serves (for logging).
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::UnknownModel("mystery-13b".into());
        assert_eq!(err.to_string(), "unknown model: mystery-13b");

        let err = ModelError::GenerationFailure {
            model_id: "qwen".into(),
            reason: "server returned 500".into(),
        };
        assert!(err.to_string().contains("qwen"));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_taxonomy_mapping() {
        let core: conclave_core::Error = ModelError::UnknownModel("x".into()).into();
        assert!(matches!(core, conclave_core::Error::NotFound(_)));

        let core: conclave_core::Error = ModelError::BackendLoadFailure {
            model_id: "x".into(),
            reason: "connection refused".into(),
        }
        .into();
        assert!(matches!(core, conclave_core::Error::BackendUnavailable(_)));

        let core: conclave_core::Error = ModelError::GenerationFailure {
            model_id: "x".into(),
            reason: "oom".into(),
        }
        .into();
        assert!(matches!(core, conclave_core::Error::BackendUnavailable(_)));
    }
}
