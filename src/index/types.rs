//! Chunk entities, search results, and index errors.

use super::qdrant::QdrantError;
use std::collections::HashSet;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Errors raised by similarity index backends.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Vector length differs from the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was created with.
        expected: usize,
        /// Dimension of the rejected vector.
        actual: usize,
    },
    /// Qdrant request failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Snapshot file could not be read or written.
    #[error("Snapshot I/O failed: {0}")]
    Snapshot(#[from] std::io::Error),
    /// A persisted row could not be decoded back into a chunk.
    #[error("Corrupt chunk record: {0}")]
    CorruptRecord(String),
}

/// Approximate token count: UTF-8 byte length divided by four, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Unit of retrievable text with its embedding.
///
/// Text and embedding are fixed at construction; a chunk is replaced as a whole or deleted,
/// never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    tenant_id: String,
    source_name: String,
    sequence_index: usize,
    text: String,
    token_estimate: usize,
    embedding: Vec<f64>,
    created_at: OffsetDateTime,
}

impl Chunk {
    /// Create a chunk stamped with the current time.
    pub fn new(
        tenant_id: impl Into<String>,
        source_name: impl Into<String>,
        sequence_index: usize,
        text: impl Into<String>,
        embedding: Vec<f64>,
    ) -> Self {
        let text = text.into();
        Self {
            tenant_id: tenant_id.into(),
            source_name: source_name.into(),
            sequence_index,
            token_estimate: estimate_tokens(&text),
            text,
            embedding,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Rebuild a chunk from stored fields.
    pub(crate) fn restore(
        key: ChunkRef,
        text: String,
        token_estimate: usize,
        embedding: Vec<f64>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            tenant_id: key.tenant_id,
            source_name: key.source_name,
            sequence_index: key.sequence_index,
            text,
            token_estimate,
            embedding,
            created_at,
        }
    }

    /// Owning tenant.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Originating document name.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Zero-based position within the source document.
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// Normalized chunk text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Approximate token count of [`Self::text`].
    pub fn token_estimate(&self) -> usize {
        self.token_estimate
    }

    /// Embedding vector.
    pub fn embedding(&self) -> &[f64] {
        &self.embedding
    }

    /// Creation time.
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Identity of this chunk within the index.
    pub fn key(&self) -> ChunkRef {
        ChunkRef {
            tenant_id: self.tenant_id.clone(),
            source_name: self.source_name.clone(),
            sequence_index: self.sequence_index,
        }
    }

    pub(crate) fn summary(&self) -> ChunkSummary {
        ChunkSummary {
            source_name: self.source_name.clone(),
            sequence_index: self.sequence_index,
            token_estimate: self.token_estimate,
            created_at: Some(self.created_at),
        }
    }
}

/// Identity of a stored chunk: unique per (tenant, source, index).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkRef {
    /// Owning tenant.
    pub tenant_id: String,
    /// Originating document name.
    pub source_name: String,
    /// Position within the source document.
    pub sequence_index: usize,
}

/// Ranked hit returned by [`super::SimilarityIndex::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimilaritySearchResult {
    /// Which chunk matched.
    pub chunk_ref: ChunkRef,
    /// Cosine similarity to the query vector.
    pub similarity: f64,
    /// Chunk text.
    pub text: String,
}

/// Lightweight listing entry for a stored chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSummary {
    /// Originating document name.
    pub source_name: String,
    /// Position within the source document.
    pub sequence_index: usize,
    /// Approximate token count.
    pub token_estimate: usize,
    /// Creation time, when the backend tracks it.
    pub created_at: Option<OffsetDateTime>,
}

/// Aggregate figures describing a tenant's knowledge base.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeBaseStats {
    /// Number of stored chunks.
    pub total_chunks: usize,
    /// Sum of chunk token estimates.
    pub total_tokens: usize,
    /// Distinct source documents.
    pub unique_files: usize,
    /// Most recent chunk creation time.
    pub last_updated: Option<OffsetDateTime>,
}

impl KnowledgeBaseStats {
    /// Aggregate a chunk listing.
    pub fn from_summaries(summaries: &[ChunkSummary]) -> Self {
        let files: HashSet<&str> = summaries
            .iter()
            .map(|summary| summary.source_name.as_str())
            .collect();
        Self {
            total_chunks: summaries.len(),
            total_tokens: summaries.iter().map(|summary| summary.token_estimate).sum(),
            unique_files: files.len(),
            last_updated: summaries.iter().filter_map(|summary| summary.created_at).max(),
        }
    }
}

/// Render a timestamp for storage and API payloads.
pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Parse an RFC 3339 timestamp, returning `None` on malformed input.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value.trim(), &Rfc3339).ok()
}
