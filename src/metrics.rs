use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct RagMetrics {
    documents_ingested: AtomicU64,
    chunks_stored: AtomicU64,
    chunks_failed: AtomicU64,
    queries_answered: AtomicU64,
    queries_ungrounded: AtomicU64,
}

impl RagMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document together with its per-chunk outcome.
    pub fn record_document(&self, stored: u64, failed: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_stored.fetch_add(stored, Ordering::Relaxed);
        self.chunks_failed.fetch_add(failed, Ordering::Relaxed);
    }

    /// Record a completed query; `grounded` is false when nothing cleared the threshold.
    pub fn record_query(&self, grounded: bool) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
        if !grounded {
            self.queries_ungrounded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_stored: self.chunks_stored.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            queries_ungrounded: self.queries_ungrounded.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that reached the embedding stage.
    pub documents_ingested: u64,
    /// Chunks embedded and stored.
    pub chunks_stored: u64,
    /// Chunks skipped because embedding or storage failed.
    pub chunks_failed: u64,
    /// Queries that returned an answer (grounded or not).
    pub queries_answered: u64,
    /// Queries answered with the fixed refusal because nothing matched.
    pub queries_ungrounded: u64,
}
