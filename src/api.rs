//! HTTP surface for the chatbot backend.
//!
//! Routes, all answering with a `{ "success": bool, ... }` envelope:
//!
//! - `POST /chatbots/:id/documents` – Ingest `{ filename, text | content_base64 }` into the chatbot's knowledge base.
//! - `GET /chatbots/:id/documents` – Stored chunks grouped by filename, plus aggregate stats.
//! - `DELETE /chatbots/:id/documents` – Remove every chunk of the chatbot.
//! - `GET /chatbots/:id/documents/stats` – Aggregate stats only.
//! - `POST /chatbots/:id/query` – Answer `{ message, limit?, threshold? }` from stored context.
//! - `GET /chatbots/:id/query/status` – Readiness of the chatbot and the model service.
//! - `GET /health` – Liveness of this process.
//! - `GET /metrics` – Ingestion and query counters.

use crate::index::{ChunkSummary, IndexError, KnowledgeBaseStats, format_timestamp};
use crate::model::ModelError;
use crate::processing::{
    IngestionError, QueryError, QueryRequest, RagApi, RetrievalError, ValidationError,
    prompt::REFUSAL,
};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use time::OffsetDateTime;

/// Build the HTTP router over a [`RagApi`] implementation.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route(
            "/chatbots/:id/documents",
            post(upload_document::<S>)
                .get(list_documents::<S>)
                .delete(delete_documents::<S>),
        )
        .route("/chatbots/:id/documents/stats", get(document_stats::<S>))
        .route("/chatbots/:id/query", post(query::<S>))
        .route("/chatbots/:id/query/status", get(query_status::<S>))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

/// Request body for `POST /chatbots/:id/documents`.
///
/// Plain-text documents travel in `text`; binary ones (PDF) in `content_base64`.
#[derive(Deserialize)]
struct UploadRequest {
    filename: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content_base64: Option<String>,
}

impl UploadRequest {
    fn into_parts(self) -> Result<(String, Vec<u8>), ValidationError> {
        let bytes = match (self.text, self.content_base64) {
            (Some(text), None) => text.into_bytes(),
            (None, Some(encoded)) => STANDARD
                .decode(encoded.trim())
                .map_err(|_| ValidationError::new("file", "must be valid base64"))?,
            (Some(_), Some(_)) => {
                return Err(ValidationError::new(
                    "file",
                    "must be sent as either text or content_base64",
                ));
            }
            (None, None) => return Err(ValidationError::new("file", "is required")),
        };
        Ok((self.filename, bytes))
    }
}

async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Path(chatbot_id): Path<String>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError>
where
    S: RagApi,
{
    let Json(upload) = payload?;
    let (filename, bytes) = upload.into_parts()?;
    let report = service
        .ingest_document(&chatbot_id, &filename, bytes)
        .await?;
    tracing::info!(
        tenant = %chatbot_id,
        source = %filename,
        succeeded = report.succeeded,
        failed = report.failed,
        "Upload completed"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "File uploaded and processed successfully",
            "data": {
                "filename": filename,
                "total_chunks": report.total,
                "successful_chunks": report.succeeded,
                "failed_chunks": report.failed,
                "chatbot_id": chatbot_id,
            }
        })),
    ))
}

async fn list_documents<S>(
    State(service): State<Arc<S>>,
    Path(chatbot_id): Path<String>,
) -> Result<Json<Value>, AppError>
where
    S: RagApi,
{
    let listing = service.documents(&chatbot_id).await?;
    let mut documents = Map::new();
    for document in listing.documents {
        let chunks = document.chunks.iter().map(chunk_json).collect();
        documents.insert(document.filename, Value::Array(chunks));
    }
    Ok(Json(json!({
        "success": true,
        "data": {
            "documents": documents,
            "stats": stats_json(&listing.stats),
        }
    })))
}

async fn delete_documents<S>(
    State(service): State<Arc<S>>,
    Path(chatbot_id): Path<String>,
) -> Result<Json<Value>, AppError>
where
    S: RagApi,
{
    let deleted = service.clear(&chatbot_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully deleted {deleted} document chunks"),
        "deleted_count": deleted,
    })))
}

async fn document_stats<S>(
    State(service): State<Arc<S>>,
    Path(chatbot_id): Path<String>,
) -> Result<Json<Value>, AppError>
where
    S: RagApi,
{
    let stats = service.stats(&chatbot_id).await?;
    Ok(Json(json!({ "success": true, "data": stats_json(&stats) })))
}

async fn query<S>(
    State(service): State<Arc<S>>,
    Path(chatbot_id): Path<String>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError>
where
    S: RagApi,
{
    let Json(request) = payload?;
    let question = request.message.clone();
    let answered = service.query(&chatbot_id, request).await?;
    let message = if answered.is_grounded() {
        "Query processed successfully"
    } else {
        REFUSAL
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "data": {
            "response": answered.answer,
            "context_used": answered.contexts_used,
            "similarity_scores": answered.similarity_scores,
            "query": question,
            "chatbot_id": chatbot_id,
        }
    })))
}

async fn query_status<S>(
    State(service): State<Arc<S>>,
    Path(chatbot_id): Path<String>,
) -> Result<Json<Value>, AppError>
where
    S: RagApi,
{
    let status = service.status(&chatbot_id).await?;
    Ok(Json(json!({
        "success": true,
        "data": {
            "chatbot": {
                "id": chatbot_id,
                "is_active": status.is_active,
                "is_ready": status.is_ready,
            },
            "knowledge_base": {
                "document_count": status.document_count,
                "chunk_count": status.chunk_count,
                "last_updated": status.last_updated.map(format_timestamp),
            },
            "service_status": {
                "ollama_available": status.model_available,
            }
        }
    })))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: format_timestamp(OffsetDateTime::now_utc()),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<Value>
where
    S: RagApi,
{
    Json(json!({ "success": true, "data": service.metrics_snapshot() }))
}

fn chunk_json(chunk: &ChunkSummary) -> Value {
    json!({
        "filename": chunk.source_name,
        "chunk_index": chunk.sequence_index,
        "token_count": chunk.token_estimate,
        "created_at": chunk.created_at.map(format_timestamp),
    })
}

fn stats_json(stats: &KnowledgeBaseStats) -> Value {
    json!({
        "total_chunks": stats.total_chunks,
        "total_tokens": stats.total_tokens,
        "unique_files": stats.unique_files,
        "last_updated": stats.last_updated.map(format_timestamp),
    })
}

/// Error response carrying the HTTP status and the `{ success: false }` body.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
    field: Option<&'static str>,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field: None,
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        tracing::error!(error = %error, "Request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        if let Some(field) = self.field {
            let mut errors = Map::new();
            errors.insert(field.to_string(), json!([self.message]));
            body.insert("errors".into(), Value::Object(errors));
        }
        body.insert("message".into(), Value::String(self.message));
        (self.status, Json(Value::Object(body))).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(error: ValidationError) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: error.to_string(),
            field: Some(error.field),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Validation failed: {}", rejection.body_text()),
        )
    }
}

impl From<IndexError> for AppError {
    fn from(error: IndexError) -> Self {
        Self::internal(error)
    }
}

impl From<IngestionError> for AppError {
    fn from(error: IngestionError) -> Self {
        match error {
            IngestionError::Validation(inner) => inner.into(),
            IngestionError::Extraction(_) | IngestionError::EmptyContent => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
            }
            IngestionError::ServiceUnavailable(message) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
            }
            IngestionError::NoChunksStored { .. } | IngestionError::Index(_) => {
                Self::internal(format!("Error processing file: {error}"))
            }
        }
    }
}

impl From<QueryError> for AppError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Validation(inner) => inner.into(),
            QueryError::TenantInactive(_) => {
                Self::new(StatusCode::FORBIDDEN, "This chatbot is currently inactive.")
            }
            QueryError::EmptyKnowledgeBase(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "This chatbot has no knowledge base. Please upload documents first.",
            ),
            QueryError::ServiceUnavailable
            | QueryError::Retrieval(RetrievalError::Model(ModelError::ServiceUnavailable(_))) => {
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    QueryError::ServiceUnavailable.to_string(),
                )
            }
            QueryError::Index(_) | QueryError::Retrieval(_) => {
                Self::internal(format!("Error processing query: {error}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::index::{ChunkSummary, IndexError, KnowledgeBaseStats};
    use crate::metrics::MetricsSnapshot;
    use crate::model::ModelError;
    use crate::processing::{
        AnsweredQuery, DocumentListing, DocumentSummary, IngestionError, IngestionReport,
        KnowledgeBaseStatus, QueryError, QueryRequest, RagApi, RetrievalError,
    };
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Clone, Copy)]
    enum QueryBehavior {
        Grounded,
        Refusal,
        Inactive,
        Empty,
        ModelDown,
    }

    struct StubRagService {
        uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
        queries: Mutex<Vec<(String, QueryRequest)>>,
        query_behavior: QueryBehavior,
        model_up: bool,
    }

    impl StubRagService {
        fn new(query_behavior: QueryBehavior) -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                queries: Mutex::new(Vec::new()),
                query_behavior,
                model_up: true,
            }
        }

        fn model_down(mut self) -> Self {
            self.model_up = false;
            self
        }
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn ingest_document(
            &self,
            tenant_id: &str,
            filename: &str,
            bytes: Vec<u8>,
        ) -> Result<IngestionReport, IngestionError> {
            if !self.model_up {
                return Err(IngestionError::ServiceUnavailable(
                    "Ollama service is not available. Please ensure Ollama is running.".into(),
                ));
            }
            self.uploads
                .lock()
                .await
                .push((tenant_id.into(), filename.into(), bytes));
            Ok(IngestionReport {
                total: 3,
                succeeded: 2,
                failed: 1,
            })
        }

        async fn query(
            &self,
            tenant_id: &str,
            request: QueryRequest,
        ) -> Result<AnsweredQuery, QueryError> {
            request.validate()?;
            self.queries.lock().await.push((tenant_id.into(), request));
            match self.query_behavior {
                QueryBehavior::Grounded => Ok(AnsweredQuery {
                    answer: "Nine to five.".into(),
                    contexts_used: vec!["Opening hours are nine to five.".into()],
                    similarity_scores: vec![0.91],
                }),
                QueryBehavior::Refusal => Ok(AnsweredQuery {
                    answer: crate::processing::prompt::REFUSAL.into(),
                    contexts_used: vec![],
                    similarity_scores: vec![],
                }),
                QueryBehavior::Inactive => Err(QueryError::TenantInactive(tenant_id.into())),
                QueryBehavior::Empty => Err(QueryError::EmptyKnowledgeBase(tenant_id.into())),
                QueryBehavior::ModelDown => Err(QueryError::Retrieval(RetrievalError::Model(
                    ModelError::ServiceUnavailable("timeout".into()),
                ))),
            }
        }

        async fn status(&self, _tenant_id: &str) -> Result<KnowledgeBaseStatus, IndexError> {
            Ok(KnowledgeBaseStatus {
                is_active: true,
                is_ready: true,
                document_count: 1,
                chunk_count: 2,
                last_updated: None,
                model_available: self.model_up,
            })
        }

        async fn documents(&self, _tenant_id: &str) -> Result<DocumentListing, IndexError> {
            let chunks = vec![
                ChunkSummary {
                    source_name: "hours.txt".into(),
                    sequence_index: 0,
                    token_estimate: 8,
                    created_at: None,
                },
                ChunkSummary {
                    source_name: "hours.txt".into(),
                    sequence_index: 2,
                    token_estimate: 5,
                    created_at: None,
                },
            ];
            Ok(DocumentListing {
                stats: KnowledgeBaseStats::from_summaries(&chunks),
                documents: vec![DocumentSummary {
                    filename: "hours.txt".into(),
                    chunks,
                }],
            })
        }

        async fn stats(&self, _tenant_id: &str) -> Result<KnowledgeBaseStats, IndexError> {
            Ok(KnowledgeBaseStats {
                total_chunks: 4,
                total_tokens: 40,
                unique_files: 2,
                last_updated: None,
            })
        }

        async fn clear(&self, _tenant_id: &str) -> Result<usize, IndexError> {
            Ok(7)
        }

        async fn model_available(&self) -> bool {
            self.model_up
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 1,
                chunks_stored: 2,
                ..MetricsSnapshot::default()
            }
        }
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&bytes).expect("json body");
        (status, json)
    }

    #[tokio::test]
    async fn upload_returns_created_with_report() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Grounded));
        let app = create_router(service.clone());

        let (status, body) = send(
            app,
            Method::POST,
            "/chatbots/bot-1/documents",
            Some(json!({ "filename": "hours.txt", "text": "Opening hours are nine to five." })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["total_chunks"], 3);
        assert_eq!(body["data"]["successful_chunks"], 2);
        assert_eq!(body["data"]["failed_chunks"], 1);
        assert_eq!(body["data"]["chatbot_id"], "bot-1");

        let uploads = service.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "bot-1");
        assert_eq!(uploads[0].1, "hours.txt");
    }

    #[tokio::test]
    async fn upload_without_model_is_service_unavailable() {
        let app = create_router(Arc::new(
            StubRagService::new(QueryBehavior::Grounded).model_down(),
        ));
        let (status, body) = send(
            app,
            Method::POST,
            "/chatbots/bot-1/documents",
            Some(json!({ "filename": "hours.txt", "text": "Opening hours." })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn malformed_upload_body_is_unprocessable() {
        let app = create_router(Arc::new(StubRagService::new(QueryBehavior::Grounded)));
        let (status, body) = send(
            app,
            Method::POST,
            "/chatbots/bot-1/documents",
            Some(json!({ "filename": "hours.txt" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"]["file"][0], "The file field is required.");
    }

    #[tokio::test]
    async fn binary_upload_is_decoded_from_base64() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Grounded));
        let pdf_bytes = b"%PDF-1.4\n\x00\xff binary body".to_vec();

        let (status, _) = send(
            create_router(service.clone()),
            Method::POST,
            "/chatbots/bot-1/documents",
            Some(json!({ "filename": "manual.pdf", "content_base64": STANDARD.encode(&pdf_bytes) })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let uploads = service.uploads.lock().await;
        assert_eq!(uploads[0].1, "manual.pdf");
        assert_eq!(uploads[0].2, pdf_bytes);
    }

    #[tokio::test]
    async fn undecodable_upload_reports_file_error() {
        let app = create_router(Arc::new(StubRagService::new(QueryBehavior::Grounded)));
        let (status, body) = send(
            app,
            Method::POST,
            "/chatbots/bot-1/documents",
            Some(json!({ "filename": "manual.pdf", "content_base64": "not base64!" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"]["file"][0], "The file field must be valid base64.");
    }

    #[tokio::test]
    async fn grounded_query_returns_contexts() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Grounded));
        let app = create_router(service.clone());
        let (status, body) = send(
            app,
            Method::POST,
            "/chatbots/bot-1/query",
            Some(json!({ "message": "When are you open?", "limit": 2, "threshold": 0.5 })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["response"], "Nine to five.");
        assert_eq!(body["data"]["context_used"][0], "Opening hours are nine to five.");
        assert_eq!(body["data"]["similarity_scores"][0], 0.91);
        assert_eq!(body["data"]["query"], "When are you open?");

        let queries = service.queries.lock().await;
        assert_eq!(queries[0].1.limit, Some(2));
        assert_eq!(queries[0].1.threshold, Some(0.5));
    }

    #[tokio::test]
    async fn refusal_is_a_successful_response() {
        let app = create_router(Arc::new(StubRagService::new(QueryBehavior::Refusal)));
        let (status, body) = send(
            app,
            Method::POST,
            "/chatbots/bot-1/query",
            Some(json!({ "message": "Anything?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "I don't know based on the provided information.");
        assert_eq!(body["data"]["context_used"], json!([]));
        assert_eq!(body["data"]["similarity_scores"], json!([]));
    }

    #[tokio::test]
    async fn query_errors_map_to_statuses() {
        let cases = [
            (QueryBehavior::Inactive, StatusCode::FORBIDDEN),
            (QueryBehavior::Empty, StatusCode::BAD_REQUEST),
            (QueryBehavior::ModelDown, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (behavior, expected) in cases {
            let app = create_router(Arc::new(StubRagService::new(behavior)));
            let (status, body) = send(
                app,
                Method::POST,
                "/chatbots/bot-1/query",
                Some(json!({ "message": "Hello?" })),
            )
            .await;
            assert_eq!(status, expected);
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn invalid_query_reports_field_errors() {
        let app = create_router(Arc::new(StubRagService::new(QueryBehavior::Grounded)));
        let (status, body) = send(
            app,
            Method::POST,
            "/chatbots/bot-1/query",
            Some(json!({ "message": "Hello?", "limit": 11 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"]["limit"][0], "The limit field must be between 1 and 10.");
    }

    #[tokio::test]
    async fn documents_are_grouped_by_filename() {
        let app = create_router(Arc::new(StubRagService::new(QueryBehavior::Grounded)));
        let (status, body) = send(app, Method::GET, "/chatbots/bot-1/documents", None).await;

        assert_eq!(status, StatusCode::OK);
        let chunks = body["data"]["documents"]["hours.txt"]
            .as_array()
            .expect("grouped chunks");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1]["chunk_index"], 2);
        assert_eq!(body["data"]["stats"]["total_chunks"], 2);
        assert_eq!(body["data"]["stats"]["total_tokens"], 13);
    }

    #[tokio::test]
    async fn delete_and_stats_routes() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Grounded));

        let (status, body) = send(
            create_router(service.clone()),
            Method::DELETE,
            "/chatbots/bot-1/documents",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted_count"], 7);

        let (status, body) = send(
            create_router(service),
            Method::GET,
            "/chatbots/bot-1/documents/stats",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["unique_files"], 2);
    }

    #[tokio::test]
    async fn status_health_and_metrics() {
        let service = Arc::new(StubRagService::new(QueryBehavior::Grounded).model_down());

        let (_, body) = send(
            create_router(service.clone()),
            Method::GET,
            "/chatbots/bot-1/query/status",
            None,
        )
        .await;
        assert_eq!(body["data"]["chatbot"]["is_ready"], true);
        assert_eq!(body["data"]["knowledge_base"]["chunk_count"], 2);
        assert_eq!(body["data"]["service_status"]["ollama_available"], false);

        let (status, body) = send(create_router(service.clone()), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

        let (_, body) = send(create_router(service), Method::GET, "/metrics", None).await;
        assert_eq!(body["data"]["documents_ingested"], 1);
        assert_eq!(body["data"]["chunks_stored"], 2);
    }
}
