#![deny(missing_docs)]

//! Core library for InsightMed, a healthcare search and analytics assistant.

/// Text analysis through deployed NLP models.
pub mod analysis;
/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Dashboard sessions, categories, and operations.
pub mod dashboard;
/// Elasticsearch integration.
pub mod elastic;
/// Bulk ingestion of blood reports and clinical notes.
pub mod ingest;
/// Chat-completion client.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion counters.
pub mod metrics;
/// Trained-model lifecycle management.
pub mod ml;
/// Index and ingest-pipeline provisioning.
pub mod provision;
/// Retrieval-augmented chat.
pub mod rag;
/// Synthetic blood report generation.
pub mod reports;
/// Retry with exponential backoff.
pub mod retry;
/// Clinical-note search.
pub mod search;
