//! Document pipeline: chunking, embedding, retrieval, and the service facade over them.

pub mod chunking;
mod ingest;
pub mod prompt;
mod retrieval;
mod service;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use chunking::{Chunker, chunk_text};
pub use ingest::IngestionPipeline;
pub use retrieval::RetrievalEngine;
pub use service::{
    DocumentListing, DocumentSummary, KnowledgeBaseStatus, RagApi, RagService, ServiceInitError,
};
pub use types::{
    AnsweredQuery, IngestionError, IngestionReport, QueryError, QueryRequest, RetrievalError,
    ValidatedQuery, ValidationError,
};
