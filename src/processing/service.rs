//! Service facade shared by the HTTP server and the admin CLI.

use crate::{
    config::Config,
    extract::{DocumentExtractor, ExtractionError, TextExtractor, extension_of},
    index::{ChunkSummary, IndexError, KnowledgeBaseStats, SimilarityIndex, build_index},
    metrics::{MetricsSnapshot, RagMetrics},
    model::{ModelClient, OllamaClient},
    processing::{
        ingest::IngestionPipeline,
        retrieval::RetrievalEngine,
        types::{
            AnsweredQuery, IngestionError, IngestionReport, QueryError, QueryRequest,
            ValidationError,
        },
    },
    tenants::{StaticTenantDirectory, TenantDirectory},
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

/// Errors raised while wiring the service together at startup.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// HTTP client for the model server could not be built.
    #[error("Failed to build model client: {0}")]
    Model(#[from] reqwest::Error),
    /// The similarity index backend could not be opened.
    #[error("Failed to open similarity index: {0}")]
    Index(#[from] IndexError),
}

/// Readiness of one chatbot.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBaseStatus {
    /// Whether the chatbot accepts queries.
    pub is_active: bool,
    /// Active and holding at least one chunk.
    pub is_ready: bool,
    /// Distinct documents stored.
    pub document_count: usize,
    /// Chunks stored.
    pub chunk_count: usize,
    /// Most recent chunk creation time.
    pub last_updated: Option<OffsetDateTime>,
    /// Whether the model server answered the liveness probe.
    pub model_available: bool,
}

/// Stored chunks of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSummary {
    /// Document name.
    pub filename: String,
    /// Chunk summaries ordered by sequence index.
    pub chunks: Vec<ChunkSummary>,
}

/// Per-document listing of a chatbot's knowledge base.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentListing {
    /// Documents ordered by filename.
    pub documents: Vec<DocumentSummary>,
    /// Aggregate figures over every document.
    pub stats: KnowledgeBaseStats,
}

/// Operations exposed to external surfaces (HTTP, CLI).
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Extract, chunk, embed, and store an uploaded document.
    async fn ingest_document(
        &self,
        tenant_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestionReport, IngestionError>;

    /// Answer a question from the chatbot's knowledge base.
    async fn query(
        &self,
        tenant_id: &str,
        request: QueryRequest,
    ) -> Result<AnsweredQuery, QueryError>;

    /// Readiness summary for a chatbot.
    async fn status(&self, tenant_id: &str) -> Result<KnowledgeBaseStatus, IndexError>;

    /// Stored chunks grouped by document.
    async fn documents(&self, tenant_id: &str) -> Result<DocumentListing, IndexError>;

    /// Aggregate knowledge base figures.
    async fn stats(&self, tenant_id: &str) -> Result<KnowledgeBaseStats, IndexError>;

    /// Delete every chunk of a chatbot and return how many were removed.
    async fn clear(&self, tenant_id: &str) -> Result<usize, IndexError>;

    /// Whether the model server is reachable right now.
    async fn model_available(&self) -> bool;

    /// Current ingestion and query counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Default [`RagApi`] implementation.
///
/// Owns the model client, index, and collaborators for the life of the process; construct it
/// once at startup and share it through an `Arc`.
pub struct RagService {
    model: Arc<dyn ModelClient>,
    index: Arc<dyn SimilarityIndex>,
    tenants: Arc<dyn TenantDirectory>,
    extractor: Arc<dyn TextExtractor>,
    pipeline: IngestionPipeline,
    engine: RetrievalEngine,
    metrics: RagMetrics,
    max_document_bytes: usize,
}

impl RagService {
    /// Build the Ollama client, index backend, and default collaborators from `config`.
    pub async fn new(config: &Config) -> Result<Self, ServiceInitError> {
        tracing::info!(base_url = %config.base_url, "Initializing model client");
        let model: Arc<dyn ModelClient> = Arc::new(OllamaClient::new(config)?);
        let index = build_index(config).await?;
        tracing::info!(
            dimension = index.dimension(),
            backend = ?config.index_backend,
            "Similarity index ready"
        );
        let tenants = Arc::new(StaticTenantDirectory::new(
            config.inactive_chatbots.iter().cloned(),
        ));
        Ok(Self::from_parts(
            model,
            index,
            tenants,
            Arc::new(DocumentExtractor),
            config,
        ))
    }

    /// Assemble the service from explicit collaborators.
    pub fn from_parts(
        model: Arc<dyn ModelClient>,
        index: Arc<dyn SimilarityIndex>,
        tenants: Arc<dyn TenantDirectory>,
        extractor: Arc<dyn TextExtractor>,
        config: &Config,
    ) -> Self {
        Self {
            pipeline: IngestionPipeline::new(model.clone(), index.clone(), config),
            engine: RetrievalEngine::new(model.clone(), index.clone()),
            model,
            index,
            tenants,
            extractor,
            metrics: RagMetrics::new(),
            max_document_bytes: config.max_document_bytes,
        }
    }

    fn validate_upload(&self, filename: &str, bytes: &[u8]) -> Result<String, IngestionError> {
        if filename.trim().is_empty() {
            return Err(ValidationError::new("filename", "is required").into());
        }
        if bytes.len() > self.max_document_bytes {
            return Err(ValidationError::new(
                "file",
                format!("must not be greater than {} bytes", self.max_document_bytes),
            )
            .into());
        }
        let extension = extension_of(filename);
        if !self.extractor.supports(&extension) {
            return Err(ExtractionError::UnsupportedType(extension).into());
        }
        Ok(extension)
    }

    async fn extract(&self, bytes: Vec<u8>, extension: String) -> Result<String, IngestionError> {
        let extractor = self.extractor.clone();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &extension))
            .await
            .map_err(|error| {
                ExtractionError::ExtractionFailed(format!("extraction task failed: {error}"))
            })??;
        Ok(text)
    }
}

fn group_by_document(summaries: Vec<ChunkSummary>) -> Vec<DocumentSummary> {
    let mut grouped: BTreeMap<String, Vec<ChunkSummary>> = BTreeMap::new();
    for summary in summaries {
        grouped
            .entry(summary.source_name.clone())
            .or_default()
            .push(summary);
    }
    grouped
        .into_iter()
        .map(|(filename, mut chunks)| {
            chunks.sort_by_key(|chunk| chunk.sequence_index);
            DocumentSummary { filename, chunks }
        })
        .collect()
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest_document(
        &self,
        tenant_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestionReport, IngestionError> {
        let extension = self.validate_upload(filename, &bytes)?;
        if !self.model.probe().await {
            tracing::warn!(tenant = tenant_id, source = filename, "Model service unavailable");
            return Err(IngestionError::ServiceUnavailable(
                "Ollama service is not available. Please ensure Ollama is running.".into(),
            ));
        }

        tracing::info!(
            tenant = tenant_id,
            source = filename,
            bytes = bytes.len(),
            "Processing document"
        );
        let text = self.extract(bytes, extension).await?;
        let result = self.pipeline.ingest(tenant_id, filename, &text).await;

        match &result {
            Ok(report) => {
                if let Err(error) = self.index.persist().await {
                    tracing::error!(
                        tenant = tenant_id,
                        source = filename,
                        error = %error,
                        "Failed to persist index snapshot"
                    );
                }
                self.metrics
                    .record_document(report.succeeded as u64, report.failed as u64);
            }
            Err(IngestionError::NoChunksStored { report }) => {
                self.metrics.record_document(0, report.failed as u64);
            }
            Err(_) => {}
        }
        result
    }

    async fn query(
        &self,
        tenant_id: &str,
        request: QueryRequest,
    ) -> Result<AnsweredQuery, QueryError> {
        if !self.tenants.is_active(tenant_id).await {
            return Err(QueryError::TenantInactive(tenant_id.to_string()));
        }
        if !self.model.probe().await {
            return Err(QueryError::ServiceUnavailable);
        }
        let validated = request.validate()?;
        if self.index.count(tenant_id).await? == 0 {
            return Err(QueryError::EmptyKnowledgeBase(tenant_id.to_string()));
        }

        tracing::info!(
            tenant = tenant_id,
            limit = validated.limit,
            threshold = validated.threshold,
            "Answering query"
        );
        let answered = self
            .engine
            .answer(
                tenant_id,
                &validated.message,
                validated.limit,
                validated.threshold,
            )
            .await
            .inspect_err(|error| {
                tracing::error!(tenant = tenant_id, error = %error, "Query failed");
            })?;
        self.metrics.record_query(answered.is_grounded());
        Ok(answered)
    }

    async fn status(&self, tenant_id: &str) -> Result<KnowledgeBaseStatus, IndexError> {
        let is_active = self.tenants.is_active(tenant_id).await;
        let stats = self.index.stats(tenant_id).await?;
        let model_available = self.model.probe().await;
        Ok(KnowledgeBaseStatus {
            is_active,
            is_ready: is_active && stats.total_chunks > 0,
            document_count: stats.unique_files,
            chunk_count: stats.total_chunks,
            last_updated: stats.last_updated,
            model_available,
        })
    }

    async fn documents(&self, tenant_id: &str) -> Result<DocumentListing, IndexError> {
        let summaries = self.index.list_chunks(tenant_id).await?;
        let stats = KnowledgeBaseStats::from_summaries(&summaries);
        Ok(DocumentListing {
            documents: group_by_document(summaries),
            stats,
        })
    }

    async fn stats(&self, tenant_id: &str) -> Result<KnowledgeBaseStats, IndexError> {
        self.index.stats(tenant_id).await
    }

    async fn clear(&self, tenant_id: &str) -> Result<usize, IndexError> {
        let removed = self.index.clear(tenant_id).await?;
        self.index.persist().await?;
        tracing::info!(tenant = tenant_id, removed, "Knowledge base cleared");
        Ok(removed)
    }

    async fn model_available(&self) -> bool {
        self.model.probe().await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
