//! Storage-side encoding of chunks: the `[v1,v2,...]` vector literal and the row layout
//! persisted for each chunk.

use super::types::{Chunk, ChunkRef, IndexError, format_timestamp, parse_timestamp};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Render a vector as a bracketed, comma-separated literal.
pub fn vector_to_wire(vector: &[f64]) -> String {
    let mut out = String::with_capacity(vector.len() * 8 + 2);
    out.push('[');
    for (position, value) in vector.iter().enumerate() {
        if position > 0 {
            out.push(',');
        }
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}

/// Parse a literal produced by [`vector_to_wire`].
pub fn wire_to_vector(literal: &str) -> Result<Vec<f64>, IndexError> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| IndexError::CorruptRecord(format!("not a vector literal: {literal:?}")))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|component| {
            component.trim().parse::<f64>().map_err(|_| {
                IndexError::CorruptRecord(format!("invalid vector component {component:?}"))
            })
        })
        .collect()
}

/// Persisted row for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Owning tenant.
    pub tenant_id: String,
    /// Originating document name.
    pub filename: String,
    /// Position within the document.
    pub chunk_index: usize,
    /// Normalized chunk text.
    pub chunk_text: String,
    /// Approximate token count.
    pub token_count: usize,
    /// Embedding in vector-literal form.
    pub embedding: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl ChunkRecord {
    /// Encode a chunk as a storage row.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            tenant_id: chunk.tenant_id().to_string(),
            filename: chunk.source_name().to_string(),
            chunk_index: chunk.sequence_index(),
            chunk_text: chunk.text().to_string(),
            token_count: chunk.token_estimate(),
            embedding: vector_to_wire(chunk.embedding()),
            created_at: format_timestamp(chunk.created_at()),
        }
    }

    /// Decode a storage row; an unparseable timestamp falls back to the Unix epoch.
    pub fn into_chunk(self) -> Result<Chunk, IndexError> {
        let embedding = wire_to_vector(&self.embedding)?;
        let created_at =
            parse_timestamp(&self.created_at).unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Ok(Chunk::restore(
            ChunkRef {
                tenant_id: self.tenant_id,
                source_name: self.filename,
                sequence_index: self.chunk_index,
            },
            self.chunk_text,
            self.token_count,
            embedding,
            created_at,
        ))
    }
}
