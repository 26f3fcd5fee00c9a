#![deny(missing_docs)]

//! Core library for the ragbot retrieval-augmented chatbot backend.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Text extraction from uploaded documents.
pub mod extract;
/// Per-tenant similarity index and its backends.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// Model server client contract and the Ollama adapter.
pub mod model;
/// Chunking, ingestion, retrieval, and the service facade.
pub mod processing;
/// Chatbot activity lookups.
pub mod tenants;
