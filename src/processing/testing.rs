//! In-process model double for unit tests.

use crate::model::{GenerationOptions, ModelClient, ModelError};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Returns a fixed vector for every text, with per-text overrides and failures.
pub(crate) struct StubModel {
    default_vector: Vec<f64>,
    overrides: Vec<(String, Vec<f64>)>,
    failing_marker: Option<String>,
    delays: Vec<(String, Duration)>,
    answer: String,
    available: AtomicBool,
    prompts: Mutex<Vec<String>>,
    embedded: Mutex<Vec<String>>,
}

impl StubModel {
    pub(crate) fn new(default_vector: Vec<f64>) -> Self {
        Self {
            default_vector,
            overrides: Vec::new(),
            failing_marker: None,
            delays: Vec::new(),
            answer: "stub answer".to_string(),
            available: AtomicBool::new(true),
            prompts: Mutex::new(Vec::new()),
            embedded: Mutex::new(Vec::new()),
        }
    }

    /// Embedding fails for any text containing `marker`.
    pub(crate) fn failing_on(mut self, marker: &str) -> Self {
        self.failing_marker = Some(marker.to_string());
        self
    }

    /// Texts containing `marker` embed to `vector`.
    pub(crate) fn with_vector_for(mut self, marker: &str, vector: Vec<f64>) -> Self {
        self.overrides.push((marker.to_string(), vector));
        self
    }

    /// Embedding of texts containing `marker` completes after `delay`.
    pub(crate) fn delaying(mut self, marker: &str, delay: Duration) -> Self {
        self.delays.push((marker.to_string(), delay));
        self
    }

    pub(crate) fn answering(mut self, answer: &str) -> Self {
        self.answer = answer.to_string();
        self
    }

    pub(crate) fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    /// Texts in the order their embeddings completed.
    pub(crate) fn embedded(&self) -> Vec<String> {
        self.embedded.lock().expect("embedded lock").clone()
    }
}

#[async_trait]
impl ModelClient for StubModel {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, ModelError> {
        if let Some((_, delay)) = self
            .delays
            .iter()
            .find(|(marker, _)| text.contains(marker.as_str()))
        {
            tokio::time::sleep(*delay).await;
        }
        if self
            .failing_marker
            .as_deref()
            .is_some_and(|marker| text.contains(marker))
        {
            return Err(ModelError::ServiceUnavailable("stub refused".into()));
        }
        self.embedded
            .lock()
            .expect("embedded lock")
            .push(text.to_string());
        Ok(self
            .overrides
            .iter()
            .find(|(marker, _)| text.contains(marker.as_str()))
            .map(|(_, vector)| vector.clone())
            .unwrap_or_else(|| self.default_vector.clone()))
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, ModelError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        Ok(self.answer.clone())
    }

    async fn probe(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
