//! Per-tenant similarity index over embedded chunks.

mod memory;
pub mod qdrant;
pub mod similarity;
mod types;
pub mod wire;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;
pub use types::{
    Chunk, ChunkRef, ChunkSummary, IndexError, KnowledgeBaseStats, SimilaritySearchResult,
    estimate_tokens, format_timestamp, parse_timestamp,
};

use crate::config::{Config, IndexBackend};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage and nearest-neighbour search of chunks, partitioned by tenant.
///
/// Every operation takes the tenant id explicitly; no call ever observes another tenant's
/// chunks. Chunks are keyed by (tenant, source name, sequence index) and an upsert with an
/// existing key replaces the stored chunk.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Embedding dimension every stored and query vector must have.
    fn dimension(&self) -> usize;

    /// Insert or replace a chunk.
    async fn upsert(&self, chunk: Chunk) -> Result<(), IndexError>;

    /// Up to `k` chunks of `tenant_id` with similarity `>= min_similarity`, best first.
    ///
    /// Ties are broken by ascending sequence index, then source name.
    async fn query(
        &self,
        tenant_id: &str,
        query_vector: &[f64],
        k: usize,
        min_similarity: f64,
    ) -> Result<Vec<SimilaritySearchResult>, IndexError>;

    /// Summaries of every chunk of a tenant ordered by source name, then sequence index.
    async fn list_chunks(&self, tenant_id: &str) -> Result<Vec<ChunkSummary>, IndexError>;

    /// Number of chunks stored for a tenant.
    async fn count(&self, tenant_id: &str) -> Result<usize, IndexError> {
        Ok(self.list_chunks(tenant_id).await?.len())
    }

    /// Aggregate statistics for a tenant's knowledge base.
    async fn stats(&self, tenant_id: &str) -> Result<KnowledgeBaseStats, IndexError> {
        let summaries = self.list_chunks(tenant_id).await?;
        Ok(KnowledgeBaseStats::from_summaries(&summaries))
    }

    /// Remove all chunks of a tenant and return how many were removed.
    async fn clear(&self, tenant_id: &str) -> Result<usize, IndexError>;

    /// Flush state to durable storage, if the backend keeps any locally.
    async fn persist(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Build the index backend selected by configuration.
pub async fn build_index(config: &Config) -> Result<Arc<dyn SimilarityIndex>, IndexError> {
    let dimension = config.embedding_dimension;
    match &config.index_backend {
        IndexBackend::Memory {
            snapshot_path: Some(path),
        } => Ok(Arc::new(MemoryIndex::open(dimension, path.clone()).await?)),
        IndexBackend::Memory { snapshot_path: None } => Ok(Arc::new(MemoryIndex::new(dimension))),
        IndexBackend::Qdrant {
            url,
            collection,
            api_key,
        } => Ok(Arc::new(
            QdrantIndex::connect(url, collection, api_key.clone(), dimension).await?,
        )),
    }
}
