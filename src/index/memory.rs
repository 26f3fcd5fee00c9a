//! Brute-force in-process index with optional JSON-lines snapshots.
//!
//! Each query scans the tenant's chunks and scores them with cosine similarity, which stays
//! fast at a few thousand chunks per tenant. When a snapshot path is configured, the index is
//! loaded from it on open and rewritten on [`SimilarityIndex::persist`].

use super::{
    SimilarityIndex,
    similarity::{cosine_similarity, rank_results},
    types::{Chunk, ChunkSummary, IndexError, SimilaritySearchResult},
    wire::ChunkRecord,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Chunks of one tenant keyed by (source name, sequence index).
type TenantChunks = BTreeMap<(String, usize), Chunk>;

/// In-memory [`SimilarityIndex`].
pub struct MemoryIndex {
    dimension: usize,
    tenants: RwLock<HashMap<String, TenantChunks>>,
    snapshot_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl MemoryIndex {
    /// Empty index without persistence.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            tenants: RwLock::new(HashMap::new()),
            snapshot_path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Open an index backed by `path`, loading existing rows when the file is present.
    ///
    /// Rows whose embedding has the wrong dimension are skipped with a warning.
    pub async fn open(dimension: usize, path: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let path = path.into();
        let mut tenants: HashMap<String, TenantChunks> = HashMap::new();

        if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            let mut loaded = 0usize;
            for (line_number, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: ChunkRecord = serde_json::from_str(line).map_err(|error| {
                    IndexError::CorruptRecord(format!("line {}: {error}", line_number + 1))
                })?;
                let chunk = record.into_chunk()?;
                if chunk.embedding().len() != dimension {
                    tracing::warn!(
                        tenant = chunk.tenant_id(),
                        source = chunk.source_name(),
                        chunk_index = chunk.sequence_index(),
                        expected = dimension,
                        actual = chunk.embedding().len(),
                        "Skipping snapshot row with mismatched dimension"
                    );
                    continue;
                }
                tenants
                    .entry(chunk.tenant_id().to_string())
                    .or_default()
                    .insert(
                        (chunk.source_name().to_string(), chunk.sequence_index()),
                        chunk,
                    );
                loaded += 1;
            }
            tracing::info!(path = %path.display(), chunks = loaded, "Loaded index snapshot");
        }

        Ok(Self {
            dimension,
            tenants: RwLock::new(tenants),
            snapshot_path: Some(path),
            persist_lock: Mutex::new(()),
        })
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

    async fn render_snapshot(&self) -> Result<String, IndexError> {
        let tenants = self.tenants.read().await;
        let mut out = String::new();
        let mut tenant_ids: Vec<&String> = tenants.keys().collect();
        tenant_ids.sort();
        for tenant_id in tenant_ids {
            for chunk in tenants[tenant_id].values() {
                let line = serde_json::to_string(&ChunkRecord::from_chunk(chunk))
                    .map_err(|error| IndexError::CorruptRecord(error.to_string()))?;
                out.push_str(&line);
                out.push('\n');
            }
        }
        Ok(out)
    }
}

async fn write_atomically(path: &Path, contents: &str) -> Result<(), IndexError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl SimilarityIndex for MemoryIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, chunk: Chunk) -> Result<(), IndexError> {
        self.check_dimension(chunk.embedding().len())?;
        let mut tenants = self.tenants.write().await;
        tenants
            .entry(chunk.tenant_id().to_string())
            .or_default()
            .insert(
                (chunk.source_name().to_string(), chunk.sequence_index()),
                chunk,
            );
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

        let tenants = self.tenants.read().await;
        let Some(chunks) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };

        let scored = chunks
            .values()
            .map(|chunk| SimilaritySearchResult {
                chunk_ref: chunk.key(),
                similarity: cosine_similarity(query_vector, chunk.embedding()),
                text: chunk.text().to_string(),
            })
            .collect();

        Ok(rank_results(scored, k, min_similarity))
    }

    async fn list_chunks(&self, tenant_id: &str) -> Result<Vec<ChunkSummary>, IndexError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant_id)
            .map(|chunks| chunks.values().map(Chunk::summary).collect())
            .unwrap_or_default())
    }

    async fn count(&self, tenant_id: &str) -> Result<usize, IndexError> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant_id).map_or(0, BTreeMap::len))
    }

    async fn clear(&self, tenant_id: &str) -> Result<usize, IndexError> {
        let mut tenants = self.tenants.write().await;
        let removed = tenants.remove(tenant_id).map_or(0, |chunks| chunks.len());
        tracing::debug!(tenant = tenant_id, removed, "Cleared tenant chunks");
        Ok(removed)
    }

    async fn persist(&self) -> Result<(), IndexError> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;
        let contents = self.render_snapshot().await?;
        write_atomically(path, &contents).await?;
        tracing::debug!(path = %path.display(), "Index snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tenant: &str, source: &str, index: usize, embedding: Vec<f64>) -> Chunk {
        Chunk::new(
            tenant,
            source,
            index,
            format!("{source} chunk number {index}"),
            embedding,
        )
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let index = MemoryIndex::new(3);
        let error = index
            .upsert(chunk("bot", "a.txt", 0, vec![1.0, 0.0]))
            .await
            .expect_err("dimension mismatch");
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(index.count("bot").await.expect("count"), 0);
    }

    #[tokio::test]
    async fn query_ranks_within_tenant_only() {
        let index = MemoryIndex::new(2);
        index
            .upsert(chunk("bot-a", "a.txt", 0, vec![1.0, 0.0]))
            .await
            .expect("upsert");
        index
            .upsert(chunk("bot-a", "a.txt", 1, vec![0.8, 0.6]))
            .await
            .expect("upsert");
        index
            .upsert(chunk("bot-a", "a.txt", 2, vec![0.0, 1.0]))
            .await
            .expect("upsert");
        index
            .upsert(chunk("bot-b", "b.txt", 0, vec![1.0, 0.0]))
            .await
            .expect("upsert");

        let results = index
            .query("bot-a", &[1.0, 0.0], 5, 0.5)
            .await
            .expect("query");

        let indices: Vec<_> = results
            .iter()
            .map(|result| result.chunk_ref.sequence_index)
            .collect();
        assert_eq!(indices, vec![0, 1]);
        assert!(
            results
                .iter()
                .all(|result| result.chunk_ref.tenant_id == "bot-a")
        );
        assert!((results[0].similarity - 1.0).abs() < 1e-12);
        assert!((results[1].similarity - 0.8).abs() < 1e-12);
    }

    #[tokio::test]
    async fn query_respects_k_and_breaks_ties_deterministically() {
        let index = MemoryIndex::new(2);
        for (source, position) in [("b.txt", 0), ("a.txt", 1), ("a.txt", 0), ("c.txt", 0)] {
            index
                .upsert(chunk("bot", source, position, vec![1.0, 1.0]))
                .await
                .expect("upsert");
        }

        let results = index
            .query("bot", &[2.0, 2.0], 3, 0.0)
            .await
            .expect("query");

        let keys: Vec<_> = results
            .iter()
            .map(|result| {
                (
                    result.chunk_ref.source_name.as_str(),
                    result.chunk_ref.sequence_index,
                )
            })
            .collect();
        assert_eq!(keys, vec![("a.txt", 0), ("b.txt", 0), ("c.txt", 0)]);
    }

    #[tokio::test]
    async fn query_with_no_qualifying_hits_is_empty() {
        let index = MemoryIndex::new(2);
        index
            .upsert(chunk("bot", "a.txt", 0, vec![0.0, 1.0]))
            .await
            .expect("upsert");

        let results = index
            .query("bot", &[1.0, 0.0], 3, 0.7)
            .await
            .expect("query");
        assert!(results.is_empty());

        let unknown = index
            .query("nobody", &[1.0, 0.0], 3, 0.0)
            .await
            .expect("query");
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_same_key() {
        let index = MemoryIndex::new(2);
        index
            .upsert(chunk("bot", "a.txt", 0, vec![1.0, 0.0]))
            .await
            .expect("upsert");
        index
            .upsert(chunk("bot", "a.txt", 0, vec![0.0, 1.0]))
            .await
            .expect("upsert");

        assert_eq!(index.count("bot").await.expect("count"), 1);
        let results = index
            .query("bot", &[0.0, 1.0], 1, 0.9)
            .await
            .expect("query");
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn clear_removes_only_target_tenant() {
        let index = MemoryIndex::new(2);
        index
            .upsert(chunk("bot-a", "a.txt", 0, vec![1.0, 0.0]))
            .await
            .expect("upsert");
        index
            .upsert(chunk("bot-a", "a.txt", 1, vec![1.0, 0.0]))
            .await
            .expect("upsert");
        index
            .upsert(chunk("bot-b", "b.txt", 0, vec![1.0, 0.0]))
            .await
            .expect("upsert");

        assert_eq!(index.clear("bot-a").await.expect("clear"), 2);
        assert_eq!(index.count("bot-a").await.expect("count"), 0);
        assert_eq!(index.count("bot-b").await.expect("count"), 1);
    }

    #[tokio::test]
    async fn stats_and_listing_follow_document_order() {
        let index = MemoryIndex::new(2);
        index
            .upsert(chunk("bot", "b.txt", 0, vec![1.0, 0.0]))
            .await
            .expect("upsert");
        index
            .upsert(chunk("bot", "a.txt", 2, vec![1.0, 0.0]))
            .await
            .expect("upsert");
        index
            .upsert(chunk("bot", "a.txt", 0, vec![1.0, 0.0]))
            .await
            .expect("upsert");

        let listing = index.list_chunks("bot").await.expect("list");
        let keys: Vec<_> = listing
            .iter()
            .map(|summary| (summary.source_name.as_str(), summary.sequence_index))
            .collect();
        assert_eq!(keys, vec![("a.txt", 0), ("a.txt", 2), ("b.txt", 0)]);

        let stats = index.stats("bot").await.expect("stats");
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.unique_files, 2);
        assert!(stats.last_updated.is_some());
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kb").join("index.jsonl");

        let index = MemoryIndex::open(2, &path).await.expect("open");
        index
            .upsert(chunk("bot", "a.txt", 0, vec![0.6, 0.8]))
            .await
            .expect("upsert");
        index
            .upsert(chunk("other", "z.txt", 4, vec![1.0, 0.0]))
            .await
            .expect("upsert");
        index.persist().await.expect("persist");

        let reopened = MemoryIndex::open(2, &path).await.expect("reopen");
        assert_eq!(reopened.count("bot").await.expect("count"), 1);
        assert_eq!(reopened.count("other").await.expect("count"), 1);
        let results = reopened
            .query("bot", &[0.6, 0.8], 1, 0.99)
            .await
            .expect("query");
        assert_eq!(results[0].text, "a.txt chunk number 0");
    }

    #[tokio::test]
    async fn snapshot_rows_with_wrong_dimension_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("index.jsonl");

        let index = MemoryIndex::open(3, &path).await.expect("open");
        index
            .upsert(chunk("bot", "a.txt", 0, vec![1.0, 0.0, 0.0]))
            .await
            .expect("upsert");
        index.persist().await.expect("persist");

        let narrower = MemoryIndex::open(2, &path).await.expect("reopen");
        assert_eq!(narrower.count("bot").await.expect("count"), 0);
    }
}
