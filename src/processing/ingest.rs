//! Chunk, embed, and store one document.

use crate::{
    config::Config,
    index::{Chunk, IndexError, SimilarityIndex},
    model::{ModelClient, ModelError},
    processing::{
        chunking::Chunker,
        types::{IngestionError, IngestionReport},
    },
};
use futures_util::{StreamExt, stream};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
enum ChunkFailure {
    #[error("embedding failed: {0}")]
    Embed(#[from] ModelError),
    #[error("storing failed: {0}")]
    Store(#[from] IndexError),
}

/// Turns raw document text into stored, embedded chunks.
///
/// Chunks are embedded with bounded concurrency. Sequence indices follow chunk order and are
/// fixed before any request is sent, so a failed chunk leaves a gap instead of shifting the
/// ones after it.
pub struct IngestionPipeline {
    model: Arc<dyn ModelClient>,
    index: Arc<dyn SimilarityIndex>,
    chunker: Chunker,
    concurrency: usize,
}

impl IngestionPipeline {
    /// Pipeline using the chunk budget and embedding concurrency from `config`.
    pub fn new(
        model: Arc<dyn ModelClient>,
        index: Arc<dyn SimilarityIndex>,
        config: &Config,
    ) -> Self {
        Self::with_settings(
            model,
            index,
            config.chunk_token_budget,
            config.embed_concurrency,
        )
    }

    /// Pipeline with explicit settings; a concurrency of zero is raised to one.
    pub fn with_settings(
        model: Arc<dyn ModelClient>,
        index: Arc<dyn SimilarityIndex>,
        chunk_token_budget: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            model,
            index,
            chunker: Chunker::new(chunk_token_budget),
            concurrency: concurrency.max(1),
        }
    }

    /// Ingest `raw_text` as document `source_name` of `tenant_id`.
    ///
    /// Succeeds when at least one chunk was stored. Per-chunk failures are logged and counted
    /// in the report; they never abort the document.
    pub async fn ingest(
        &self,
        tenant_id: &str,
        source_name: &str,
        raw_text: &str,
    ) -> Result<IngestionReport, IngestionError> {
        let chunks = self.chunker.chunk(raw_text);
        if chunks.is_empty() {
            tracing::warn!(
                tenant = tenant_id,
                source = source_name,
                "Document produced no chunks"
            );
            return Err(IngestionError::EmptyContent);
        }

        let total = chunks.len();
        tracing::debug!(
            tenant = tenant_id,
            source = source_name,
            chunks = total,
            concurrency = self.concurrency,
            "Embedding document chunks"
        );

        let outcomes: Vec<bool> = stream::iter(chunks.into_iter().enumerate())
            .map(move |(sequence_index, text)| async move {
                match self
                    .store_chunk(tenant_id, source_name, sequence_index, text)
                    .await
                {
                    Ok(()) => true,
                    Err(error) => {
                        tracing::warn!(
                            tenant = tenant_id,
                            source = source_name,
                            chunk_index = sequence_index,
                            error = %error,
                            "Skipping chunk"
                        );
                        false
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|stored| **stored).count();
        let report = IngestionReport {
            total,
            succeeded,
            failed: total - succeeded,
        };

        if succeeded == 0 {
            tracing::error!(
                tenant = tenant_id,
                source = source_name,
                total,
                "Every chunk failed"
            );
            return Err(IngestionError::NoChunksStored { report });
        }

        tracing::info!(
            tenant = tenant_id,
            source = source_name,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "Document ingested"
        );
        Ok(report)
    }

    async fn store_chunk(
        &self,
        tenant_id: &str,
        source_name: &str,
        sequence_index: usize,
        text: String,
    ) -> Result<(), ChunkFailure> {
        let embedding = self.model.embed(&text).await?;
        let chunk = Chunk::new(tenant_id, source_name, sequence_index, text, embedding);
        self.index.upsert(chunk).await?;
        Ok(())
    }
}
