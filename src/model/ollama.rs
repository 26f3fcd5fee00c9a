//! Ollama adapter for [`ModelClient`].
//!
//! Wire contract:
//!
//! - `POST {base}/api/embeddings` with `{model, prompt}` → `{embedding: [f64]}`
//! - `POST {base}/api/generate` with `{model, prompt, stream: false, options}` → `{response}`
//! - `GET {base}/api/tags` → any 2xx while the server is healthy

use super::{GenerationOptions, ModelClient, ModelError};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client for an Ollama-compatible model server.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    embedding_model: String,
    generation_model: String,
    embed_timeout: Duration,
    generate_timeout: Duration,
    probe_timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f64>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerationOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

impl OllamaClient {
    /// Build a client from the model-related parts of `config`.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = Client::builder().user_agent("ragbot/0.1").build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        tracing::debug!(
            url = %base_url,
            embedding_model = %config.embedding_model,
            generation_model = %config.generation_model,
            "Initialized Ollama HTTP client"
        );
        Ok(Self {
            http,
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            embed_timeout: config.request_timeout_embed,
            generate_timeout: config.request_timeout_generate,
            probe_timeout: config.request_timeout_probe,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check_status(&self, response: Response) -> Result<Response, ModelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("Ollama returned {status}: {body}");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(ModelError::ServiceUnavailable(message))
        } else {
            Err(ModelError::InvalidResponse(message))
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> ModelError {
        ModelError::ServiceUnavailable(format!(
            "failed to reach Ollama at {}: {error}",
            self.base_url
        ))
    }

    fn decode_error(error: reqwest::Error) -> ModelError {
        if error.is_timeout() {
            ModelError::ServiceUnavailable(format!("timed out reading Ollama response: {error}"))
        } else {
            ModelError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        }
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, ModelError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };
        let response = self
            .http
            .post(self.endpoint("api/embeddings"))
            .timeout(self.embed_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|error| self.transport_error(error))
            .inspect_err(|error| tracing::error!(error = %error, "Embedding request failed"))?;

        let response = self.check_status(response).await?;
        let body: EmbeddingResponse = response.json().await.map_err(Self::decode_error)?;

        match body.embedding {
            Some(vector) if !vector.is_empty() => Ok(vector),
            Some(_) => Err(ModelError::InvalidResponse(
                "Ollama returned an empty embedding".into(),
            )),
            None => Err(ModelError::InvalidResponse(
                "Ollama response is missing the embedding field".into(),
            )),
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ModelError> {
        let request = GenerateRequest {
            model: &self.generation_model,
            prompt,
            stream: false,
            options: options.clamped(),
        };
        let response = self
            .http
            .post(self.endpoint("api/generate"))
            .timeout(self.generate_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|error| self.transport_error(error))
            .inspect_err(|error| tracing::error!(error = %error, "Generation request failed"))?;

        let response = self.check_status(response).await?;
        let body: GenerateResponse = response.json().await.map_err(Self::decode_error)?;

        body.response
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                ModelError::InvalidResponse("Ollama response is missing the response field".into())
            })
    }

    async fn probe(&self) -> bool {
        let result = self
            .http
            .get(self.endpoint("api/tags"))
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Ollama liveness probe rejected");
                false
            }
            Err(error) => {
                tracing::warn!(error = %error, "Ollama service not available");
                false
            }
        }
    }
}
