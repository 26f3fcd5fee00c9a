//! Answering questions from a tenant's stored chunks.

use crate::{
    index::SimilarityIndex,
    model::{GenerationOptions, ModelClient},
    processing::{
        prompt::{REFUSAL, build_rag_prompt},
        types::{AnsweredQuery, RetrievalError},
    },
};
use std::sync::Arc;

/// Embeds a question, retrieves matching chunks, and asks the model for a grounded answer.
///
/// Callers check that the tenant is active, has chunks, and that the model is reachable
/// before calling [`RetrievalEngine::answer`].
pub struct RetrievalEngine {
    model: Arc<dyn ModelClient>,
    index: Arc<dyn SimilarityIndex>,
}

impl RetrievalEngine {
    /// Engine over the given model and index.
    pub fn new(model: Arc<dyn ModelClient>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self { model, index }
    }

    /// Answer `question` using at most `k` chunks with similarity `>= min_similarity`.
    ///
    /// When no chunk qualifies the fixed refusal is returned without calling the generator.
    pub async fn answer(
        &self,
        tenant_id: &str,
        question: &str,
        k: usize,
        min_similarity: f64,
    ) -> Result<AnsweredQuery, RetrievalError> {
        let query_vector = self.model.embed(question).await?;
        let hits = self
            .index
            .query(tenant_id, &query_vector, k, min_similarity)
            .await?;

        if hits.is_empty() {
            tracing::info!(
                tenant = tenant_id,
                min_similarity,
                "No context above threshold"
            );
            return Ok(AnsweredQuery {
                answer: REFUSAL.to_string(),
                contexts_used: Vec::new(),
                similarity_scores: Vec::new(),
            });
        }

        let (contexts_used, similarity_scores): (Vec<String>, Vec<f64>) =
            hits.into_iter().map(|hit| (hit.text, hit.similarity)).unzip();
        tracing::debug!(
            tenant = tenant_id,
            contexts = contexts_used.len(),
            top_similarity = similarity_scores.first().copied().unwrap_or_default(),
            "Retrieved context"
        );

        let prompt = build_rag_prompt(&contexts_used, question);
        let answer = self
            .model
            .generate(&prompt, &GenerationOptions::ANSWER)
            .await?;

        Ok(AnsweredQuery {
            answer,
            contexts_used,
            similarity_scores,
        })
    }
}
