//! Model router — lazy-loads and caches one backend per `model_id`.
//!
//! Backends consume significant memory on the serving side, so the first
//! request for a model goes through a per-model mutex that serializes
//! loading; once cached, generation calls share the backend concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use conclave_core::config::{ModelConfig, ModelProvider};

use crate::http::{GgufServerBackend, TransformerServerBackend};
use crate::traits::{ModelBackend, ModelError};

/// Routes generation requests to lazily loaded model backends.
pub struct ModelRouter {
    models: HashMap<String, ModelConfig>,
    loaded: RwLock<HashMap<String, Arc<dyn ModelBackend>>>,
    /// One load guard per configured model, built up front so the set of
    /// locks never changes after construction.
    load_locks: HashMap<String, Mutex<()>>,
}

impl ModelRouter {
    pub fn new(models: HashMap<String, ModelConfig>) -> Self {
        let load_locks = models.keys().map(|id| (id.clone(), Mutex::new(()))).collect();
        ModelRouter {
            models,
            loaded: RwLock::new(HashMap::new()),
            load_locks,
        }
    }

    /// Number of configured models (not necessarily loaded).
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Whether a model id is present in the configuration.
    pub fn knows(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Generate text with the given model. `max_tokens` and `temperature`
    /// default to the model's configured values when absent.
    pub async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        max_tokens: Option<u32>,
        temperature: Option<f64>,
    ) -> Result<String, ModelError> {
        let config = self
            .models
            .get(model_id)
            .ok_or_else(|| ModelError::UnknownModel(model_id.to_string()))?;

        let backend = self.backend(model_id, config).await?;
        backend
            .generate(
                prompt,
                max_tokens.unwrap_or(config.config.max_tokens),
                temperature.unwrap_or(config.config.temperature),
            )
            .await
    }

    /// Fetch the cached backend for `model_id`, loading it on first use.
    async fn backend(
        &self,
        model_id: &str,
        config: &ModelConfig,
    ) -> Result<Arc<dyn ModelBackend>, ModelError> {
        // Fast path: already loaded.
        if let Some(backend) = self.loaded.read().await.get(model_id) {
            return Ok(backend.clone());
        }

        // The per-model guard serializes loading. Exists for every
        // configured model by construction.
        let guard = self
            .load_locks
            .get(model_id)
            .expect("load lock exists for every configured model");
        let _held = guard.lock().await;

        // Another caller may have finished loading while we waited.
        if let Some(backend) = self.loaded.read().await.get(model_id) {
            return Ok(backend.clone());
        }

        info!(model_id = %model_id, base_url = %config.base_url, "loading model backend");
        let backend: Arc<dyn ModelBackend> = match config.provider {
            ModelProvider::GgufServer => {
                Arc::new(GgufServerBackend::connect(model_id, &config.base_url).await?)
            }
            ModelProvider::TransformerServer => {
                Arc::new(TransformerServerBackend::connect(model_id, &config.base_url).await?)
            }
        };

        self.loaded
            .write()
            .await
            .insert(model_id.to_string(), backend.clone());
        info!(model_id = %model_id, "model backend loaded");
        Ok(backend)
    }
}

#[async_trait::async_trait]
impl crate::traits::Generator for ModelRouter {
    async fn complete(&self, model_id: &str, prompt: &str) -> Result<String, ModelError> {
        self.generate(model_id, prompt, None, None).await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
