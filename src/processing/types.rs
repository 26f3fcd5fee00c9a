//! Request, report, and error types shared by ingestion and retrieval.

use crate::{extract::ExtractionError, index::IndexError, model::ModelError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest accepted question, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;
/// Results retrieved when the request does not say.
pub const DEFAULT_LIMIT: usize = 3;
/// Largest accepted `limit`.
pub const MAX_LIMIT: usize = 10;
/// Similarity threshold applied when the request does not say.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Rejected caller input, reported per field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("The {field} field {reason}.")]
pub struct ValidationError {
    /// Offending field.
    pub field: &'static str,
    /// Human-readable reason, phrased to follow the field name.
    pub reason: String,
}

impl ValidationError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    /// Chunks produced by the chunker.
    pub total: usize,
    /// Chunks embedded and stored.
    pub succeeded: usize,
    /// Chunks whose embedding or storage failed.
    pub failed: usize,
}

impl fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} chunks stored, {} failed",
            self.succeeded, self.total, self.failed
        )
    }
}

/// Errors that abort a whole ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Filename or payload rejected before any work started.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Text could not be extracted from the document.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The document held no chunkable text.
    #[error("Document contains no usable text")]
    EmptyContent,
    /// Model service unreachable before ingestion started.
    #[error("Model service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Every chunk failed; nothing was stored.
    #[error("No chunks could be stored ({report})")]
    NoChunksStored {
        /// Per-chunk tally of the failed attempt.
        report: IngestionReport,
    },
    /// The index could not be flushed after ingestion.
    #[error("Index operation failed: {0}")]
    Index(#[from] IndexError),
}

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding or generation failed.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// Similarity search failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Errors surfaced by the query entry point, including its precondition checks.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Request fields out of range.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The chatbot is not accepting queries.
    #[error("Chatbot {0} is not active")]
    TenantInactive(String),
    /// The chatbot has no stored chunks.
    #[error("Chatbot {0} has no documents. Please upload documents first.")]
    EmptyKnowledgeBase(String),
    /// Model service did not answer the liveness probe.
    #[error("AI service is currently unavailable. Please try again later.")]
    ServiceUnavailable,
    /// Chunk count lookup failed.
    #[error("Index operation failed: {0}")]
    Index(#[from] IndexError),
    /// Retrieval or generation failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// Question as submitted by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    /// Question text.
    #[serde(default)]
    pub message: String,
    /// Number of contexts to retrieve.
    #[serde(default)]
    pub limit: Option<i64>,
    /// Minimum similarity for a context to be used.
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Question after validation, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    /// Question text, trimmed.
    pub message: String,
    /// Number of contexts to retrieve, in `[1, 10]`.
    pub limit: usize,
    /// Minimum similarity, in `[0, 1]`.
    pub threshold: f64,
}

impl QueryRequest {
    /// Question with only the message set.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Check field ranges and apply defaults.
    pub fn validate(&self) -> Result<ValidatedQuery, ValidationError> {
        let message = self.message.trim();
        if message.is_empty() {
            return Err(ValidationError::new("message", "is required"));
        }
        if self.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ValidationError::new(
                "message",
                format!("must not be greater than {MAX_MESSAGE_CHARS} characters"),
            ));
        }

        let limit = match self.limit {
            None => DEFAULT_LIMIT,
            Some(value) => usize::try_from(value)
                .ok()
                .filter(|limit| (1..=MAX_LIMIT).contains(limit))
                .ok_or_else(|| {
                    ValidationError::new("limit", format!("must be between 1 and {MAX_LIMIT}"))
                })?,
        };

        let threshold = match self.threshold {
            None => DEFAULT_THRESHOLD,
            Some(value) if (0.0..=1.0).contains(&value) => value,
            Some(_) => return Err(ValidationError::new("threshold", "must be between 0 and 1")),
        };

        Ok(ValidatedQuery {
            message: message.to_string(),
            limit,
            threshold,
        })
    }
}

/// Answer together with the contexts that grounded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnsweredQuery {
    /// Generated answer, or the fixed refusal when nothing matched.
    pub answer: String,
    /// Retrieved chunk texts in ranking order.
    pub contexts_used: Vec<String>,
    /// Similarity of each context, aligned with `contexts_used`.
    pub similarity_scores: Vec<f64>,
}

impl AnsweredQuery {
    /// Whether any context backed the answer.
    pub fn is_grounded(&self) -> bool {
        !self.contexts_used.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_absent() {
        let validated = QueryRequest::new("  What are the opening hours?  ")
            .validate()
            .expect("valid");
        assert_eq!(validated.message, "What are the opening hours?");
        assert_eq!(validated.limit, DEFAULT_LIMIT);
        assert_eq!(validated.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn blank_and_overlong_messages_are_rejected() {
        let blank = QueryRequest::new("   ").validate().expect_err("blank");
        assert_eq!(blank.field, "message");

        let long = QueryRequest::new("a".repeat(MAX_MESSAGE_CHARS + 1))
            .validate()
            .expect_err("too long");
        assert_eq!(long.field, "message");

        assert!(
            QueryRequest::new("é".repeat(MAX_MESSAGE_CHARS))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn limit_and_threshold_bounds_are_inclusive() {
        let mut request = QueryRequest::new("question");
        request.limit = Some(10);
        request.threshold = Some(0.0);
        assert!(request.validate().is_ok());

        request.limit = Some(0);
        assert_eq!(request.validate().expect_err("limit").field, "limit");
        request.limit = Some(-3);
        assert_eq!(request.validate().expect_err("limit").field, "limit");
        request.limit = Some(11);
        assert_eq!(request.validate().expect_err("limit").field, "limit");

        request.limit = Some(1);
        request.threshold = Some(1.01);
        assert_eq!(request.validate().expect_err("threshold").field, "threshold");
        request.threshold = Some(f64::NAN);
        assert_eq!(request.validate().expect_err("threshold").field, "threshold");
    }

    #[test]
    fn validation_message_reads_naturally() {
        let error = ValidationError::new("limit", "must be between 1 and 10");
        assert_eq!(error.to_string(), "The limit field must be between 1 and 10.");
    }
}
