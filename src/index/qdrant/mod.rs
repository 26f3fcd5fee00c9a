//! Qdrant-backed [`SimilarityIndex`].
//!
//! All tenants share one cosine collection. The tenant id lives in each point's payload and
//! every search, count, scroll, and delete is filtered on it. Point ids are derived from the
//! chunk key, so re-ingesting a chunk overwrites the previous point instead of duplicating it.

mod client;
mod types;

pub use client::QdrantClient;
pub use types::{QdrantError, ScoredPoint};

use super::{
    SimilarityIndex,
    similarity::rank_results,
    types::{
        Chunk, ChunkRef, ChunkSummary, IndexError, SimilaritySearchResult, format_timestamp,
        parse_timestamp,
    },
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const INDEXED_FIELDS: [&str; 2] = ["tenant_id", "filename"];
/// Points fetched beyond `k` so ties at the cutoff are ranked locally.
const TIE_MARGIN: usize = 8;
/// Ceiling for the search limit while ties keep reaching the end of a page.
const MAX_QUERY_LIMIT: usize = 1024;

/// Similarity index stored in a Qdrant collection.
pub struct QdrantIndex {
    client: QdrantClient,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    /// Connect and make sure the collection and its payload indexes exist.
    pub async fn connect(
        url: &str,
        collection: &str,
        api_key: Option<String>,
        dimension: usize,
    ) -> Result<Self, IndexError> {
        let client = QdrantClient::new(url, api_key)?;
        client
            .create_collection_if_not_exists(collection, dimension)
            .await?;
        client
            .ensure_keyword_indexes(collection, &INDEXED_FIELDS)
            .await?;
        tracing::debug!(collection, dimension, "Qdrant collection ready");
        Ok(Self::with_client(client, collection, dimension))
    }

    pub(crate) fn with_client(client: QdrantClient, collection: &str, dimension: usize) -> Self {
        Self {
            client,
            collection: collection.to_string(),
            dimension,
        }
    }

    fn check_dimension(&self, actual: usize) -> Result<(), IndexError> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }
}

/// Deterministic point id for a chunk key.
pub fn point_id(key: &ChunkRef) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.tenant_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.source_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.sequence_index.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

fn tenant_filter(tenant_id: &str) -> Value {
    json!({
        "must": [
            {
                "key": "tenant_id",
                "match": { "value": tenant_id }
            }
        ]
    })
}

fn build_payload(chunk: &Chunk) -> Value {
    json!({
        "tenant_id": chunk.tenant_id(),
        "filename": chunk.source_name(),
        "chunk_index": chunk.sequence_index(),
        "chunk_text": chunk.text(),
        "token_count": chunk.token_estimate(),
        "created_at": format_timestamp(chunk.created_at()),
    })
}

fn payload_str<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

fn payload_usize(payload: &Map<String, Value>, key: &str) -> Option<usize> {
    payload
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|value| usize::try_from(value).ok())
}

fn map_scored_point(tenant_id: &str, point: ScoredPoint) -> Option<SimilaritySearchResult> {
    let payload = &point.payload;
    let source_name = payload_str(payload, "filename")?;
    let sequence_index = payload_usize(payload, "chunk_index")?;
    let text = payload_str(payload, "chunk_text")?;
    Some(SimilaritySearchResult {
        chunk_ref: ChunkRef {
            tenant_id: tenant_id.to_string(),
            source_name: source_name.to_string(),
            sequence_index,
        },
        similarity: point.score,
        text: text.to_string(),
    })
}

/// Whether the lowest fetched score still equals the `k`-th best, so unfetched points may tie.
fn ties_reach_tail(points: &[ScoredPoint], k: usize) -> bool {
    let mut scores: Vec<f64> = points.iter().map(|point| point.score).collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    match (scores.get(k.saturating_sub(1)), scores.last()) {
        (Some(cutoff), Some(lowest)) => lowest >= cutoff,
        _ => false,
    }
}

fn map_summary(payload: &Map<String, Value>) -> Option<ChunkSummary> {
    Some(ChunkSummary {
        source_name: payload_str(payload, "filename")?.to_string(),
        sequence_index: payload_usize(payload, "chunk_index")?,
        token_estimate: payload_usize(payload, "token_count").unwrap_or(0),
        created_at: payload_str(payload, "created_at").and_then(parse_timestamp),
    })
}

#[async_trait]
impl SimilarityIndex for QdrantIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, chunk: Chunk) -> Result<(), IndexError> {
        self.check_dimension(chunk.embedding().len())?;
        let point = json!({
            "id": point_id(&chunk.key()),
            "vector": chunk.embedding(),
            "payload": build_payload(&chunk),
        });
        self.client
            .upsert_points(&self.collection, vec![point])
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        tenant_id: &str,
        query_vector: &[f64],
        k: usize,
        min_similarity: f64,
    ) -> Result<Vec<SimilaritySearchResult>, IndexError> {
        self.check_dimension(query_vector.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut limit = k.saturating_add(TIE_MARGIN);
        let points = loop {
            let points = self
                .client
                .query_points(
                    &self.collection,
                    query_vector,
                    tenant_filter(tenant_id),
                    limit,
                    min_similarity,
                )
                .await?;
            if points.len() < limit || limit >= MAX_QUERY_LIMIT || !ties_reach_tail(&points, k) {
                break points;
            }
            tracing::debug!(tenant = tenant_id, limit, "Tied scores fill the page; widening search");
            limit = limit.saturating_mul(2).min(MAX_QUERY_LIMIT);
        };

        let hits = points
            .into_iter()
            .filter_map(|point| {
                let mapped = map_scored_point(tenant_id, point);
                if mapped.is_none() {
                    tracing::warn!(tenant = tenant_id, "Skipping Qdrant point with incomplete payload");
                }
                mapped
            })
            .collect();

        Ok(rank_results(hits, k, min_similarity))
    }

    async fn list_chunks(&self, tenant_id: &str) -> Result<Vec<ChunkSummary>, IndexError> {
        let payloads = self
            .client
            .scroll_payloads(
                &self.collection,
                json!(["filename", "chunk_index", "token_count", "created_at"]),
                tenant_filter(tenant_id),
            )
            .await?;
        let mut summaries: Vec<ChunkSummary> = payloads.iter().filter_map(map_summary).collect();
        summaries.sort_by(|a, b| {
            a.source_name
                .cmp(&b.source_name)
                .then(a.sequence_index.cmp(&b.sequence_index))
        });
        Ok(summaries)
    }

    async fn count(&self, tenant_id: &str) -> Result<usize, IndexError> {
        Ok(self
            .client
            .count_points(&self.collection, tenant_filter(tenant_id))
            .await?)
    }

    async fn clear(&self, tenant_id: &str) -> Result<usize, IndexError> {
        let existing = self.count(tenant_id).await?;
        if existing == 0 {
            return Ok(0);
        }
        self.client
            .delete_points(&self.collection, tenant_filter(tenant_id))
            .await?;
        tracing::info!(tenant = tenant_id, removed = existing, "Cleared tenant chunks");
        Ok(existing)
    }
}
