//! HTTP adapters for local model servers.
//!
//! Two wire formats cover the configured backend families:
//! - [`GgufServerBackend`] speaks the llama.cpp server `/completion` format.
//! - [`TransformerServerBackend`] speaks the text-generation-inference
//!   `/generate` format.
//!
//! Both expose a `/health` probe used by the router when a model is first
//! loaded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::{ModelBackend, ModelError};

/// Generation can take minutes on CPU-bound local servers.
const REQUEST_TIMEOUT_SECS: u64 = 600;
/// Health probes should answer immediately.
const PROBE_TIMEOUT_SECS: u64 = 5;

fn build_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .expect("failed to build HTTP client")
}

/// Probe `{base_url}/health`; any non-success answer counts as a load
/// failure, since the server either isn't there or hasn't loaded weights.
async fn probe_health(base_url: &str, model_id: &str) -> Result<(), ModelError> {
    let client = build_client(PROBE_TIMEOUT_SECS);
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ModelError::BackendLoadFailure {
            model_id: model_id.to_string(),
            reason: e.to_string(),
        })?;
    if !resp.status().is_success() {
        return Err(ModelError::BackendLoadFailure {
            model_id: model_id.to_string(),
            reason: format!("health probe returned {}", resp.status()),
        });
    }
    Ok(())
}

async fn read_error_body(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "failed to read error body".to_string());
    format!("{status} — {body}")
}

// ─────────────────────────────────────────────
// GgufServerBackend (llama.cpp wire format)
// ─────────────────────────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

/// Adapter for a llama.cpp-style server hosting a GGUF model.
#[derive(Debug)]
pub struct GgufServerBackend {
    client: reqwest::Client,
    base_url: String,
    model_id: String,
}

impl GgufServerBackend {
    /// Connect to the server and verify it is healthy.
    pub async fn connect(model_id: &str, base_url: &str) -> Result<Self, ModelError> {
        probe_health(base_url, model_id).await?;
        Ok(GgufServerBackend {
            client: build_client(REQUEST_TIMEOUT_SECS),
            base_url: base_url.trim_end_matches('/').to_string(),
            model_id: model_id.to_string(),
        })
    }
}

#[async_trait]
impl ModelBackend for GgufServerBackend {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, ModelError> {
        debug!(model_id = %self.model_id, max_tokens, "gguf-server completion request");

        let resp = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&CompletionRequest {
                prompt,
                n_predict: max_tokens,
                temperature,
            })
            .send()
            .await
            .map_err(|e| ModelError::GenerationFailure {
                model_id: self.model_id.clone(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ModelError::GenerationFailure {
                model_id: self.model_id.clone(),
                reason: read_error_body(resp).await,
            });
        }

        let body: CompletionResponse =
            resp.json()
                .await
                .map_err(|e| ModelError::GenerationFailure {
                    model_id: self.model_id.clone(),
                    reason: format!("malformed response: {e}"),
                })?;
        Ok(body.content)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ─────────────────────────────────────────────
// TransformerServerBackend (TGI wire format)
// ─────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    temperature: f64,
    do_sample: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    generated_text: String,
}

/// Adapter for a text-generation-inference-style server hosting a
/// transformer model.
#[derive(Debug)]
pub struct TransformerServerBackend {
    client: reqwest::Client,
    base_url: String,
    model_id: String,
}

impl TransformerServerBackend {
    /// Connect to the server and verify it is healthy.
    pub async fn connect(model_id: &str, base_url: &str) -> Result<Self, ModelError> {
        probe_health(base_url, model_id).await?;
        Ok(TransformerServerBackend {
            client: build_client(REQUEST_TIMEOUT_SECS),
            base_url: base_url.trim_end_matches('/').to_string(),
            model_id: model_id.to_string(),
        })
    }
}

#[async_trait]
impl ModelBackend for TransformerServerBackend {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, ModelError> {
        debug!(model_id = %self.model_id, max_tokens, "transformer-server generate request");

        let resp = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&GenerateRequest {
                inputs: prompt,
                parameters: GenerateParameters {
                    max_new_tokens: max_tokens,
                    temperature,
                    do_sample: true,
                },
            })
            .send()
            .await
            .map_err(|e| ModelError::GenerationFailure {
                model_id: self.model_id.clone(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ModelError::GenerationFailure {
                model_id: self.model_id.clone(),
                reason: read_error_body(resp).await,
            });
        }

        let body: GenerateResponse =
            resp.json()
                .await
                .map_err(|e| ModelError::GenerationFailure {
                    model_id: self.model_id.clone(),
                    reason: format!("malformed response: {e}"),
                })?;
        Ok(body.generated_text)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_gguf_generate() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "Say hi",
                "n_predict": 64
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "hi there"
            })))
            .mount(&server)
            .await;

        let backend = GgufServerBackend::connect("qwen-7b-chat-gguf", &server.uri())
            .await
            .unwrap();
        let text = backend.generate("Say hi", 64, 0.7).await.unwrap();
        assert_eq!(text, "hi there");
        assert_eq!(backend.model_id(), "qwen-7b-chat-gguf");
    }

    #[tokio::test]
    async fn test_transformer_generate() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(body_partial_json(serde_json::json!({
                "inputs": "Say hi",
                "parameters": { "max_new_tokens": 32 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "generated_text": "hello!"
            })))
            .mount(&server)
            .await;

        let backend = TransformerServerBackend::connect("llama2-7b-chat-hf", &server.uri())
            .await
            .unwrap();
        let text = backend.generate("Say hi", 32, 0.7).await.unwrap();
        assert_eq!(text, "hello!");
    }

    #[tokio::test]
    async fn test_connect_fails_when_server_down() {
        // Nothing is listening on port 1.
        let err = GgufServerBackend::connect("m", "http://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::BackendLoadFailure { .. }));
    }

    #[tokio::test]
    async fn test_connect_fails_on_unhealthy_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = TransformerServerBackend::connect("m", &server.uri())
            .await
            .unwrap_err();
        match err {
            ModelError::BackendLoadFailure { reason, .. } => {
                assert!(reason.contains("503"));
            }
            other => panic!("expected load failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_generation_error_propagates() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(ResponseTemplate::new(500).set_body_string("cuda out of memory"))
            .mount(&server)
            .await;

        let backend = GgufServerBackend::connect("m", &server.uri()).await.unwrap();
        let err = backend.generate("p", 16, 0.7).await.unwrap_err();
        match err {
            ModelError::GenerationFailure { reason, .. } => {
                assert!(reason.contains("500"));
                assert!(reason.contains("cuda out of memory"));
            }
            other => panic!("expected generation failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_response_is_generation_failure() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/completion"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let backend = GgufServerBackend::connect("m", &server.uri()).await.unwrap();
        let err = backend.generate("p", 16, 0.7).await.unwrap_err();
        assert!(matches!(err, ModelError::GenerationFailure { .. }));
    }
}
