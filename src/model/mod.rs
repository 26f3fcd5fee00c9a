//! Client contract for the remote model server: embeddings, generation, and liveness.
//!
//! The client never retries. A failed call is reported once, typed as either
//! [`ModelError::ServiceUnavailable`] (worth retrying later) or [`ModelError::InvalidResponse`]
//! (the server answered but the payload was unusable), and the caller decides what to do.

mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by model-serving backends.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Endpoint unreachable, timed out, or overloaded.
    #[error("Model service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Endpoint responded with a payload we could not use.
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Whether the caller may reasonably retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_))
    }
}

/// Sampling options forwarded to the generation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f64,
    /// Nucleus sampling mass in `[0, 1]`.
    pub top_p: f64,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl GenerationOptions {
    /// Options used when answering grounded questions.
    pub const ANSWER: Self = Self {
        temperature: 0.7,
        top_p: 0.9,
        max_tokens: 500,
    };

    /// Copy with `temperature` and `top_p` clamped into `[0, 1]`.
    pub fn clamped(self) -> Self {
        Self {
            temperature: self.temperature.clamp(0.0, 1.0),
            top_p: self.top_p.clamp(0.0, 1.0),
            max_tokens: self.max_tokens,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 1000,
        }
    }
}

/// Interface implemented by model-serving backends.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f64>, ModelError>;

    /// Generate a completion for `prompt`; the returned text is trimmed.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ModelError>;

    /// Cheap liveness check. Never fails; any problem reads as `false`.
    async fn probe(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_service_unavailable_is_retryable() {
        assert!(ModelError::ServiceUnavailable("down".into()).is_retryable());
        assert!(!ModelError::InvalidResponse("junk".into()).is_retryable());
    }

    #[test]
    fn clamped_options_stay_in_unit_range() {
        let options = GenerationOptions {
            temperature: 1.7,
            top_p: -0.2,
            max_tokens: 42,
        }
        .clamped();
        assert_eq!(options.temperature, 1.0);
        assert_eq!(options.top_p, 0.0);
        assert_eq!(options.max_tokens, 42);
    }
}
