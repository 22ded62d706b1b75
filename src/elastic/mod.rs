//! Elasticsearch integration: HTTP client, capability traits, bulk encoding, and schemas.

pub mod backend;
pub mod bulk;
pub mod client;
pub mod schema;
pub mod types;

pub use backend::{BulkWriter, IndexAdmin, ModelAdmin, SearchBackend};
pub use bulk::BulkAction;
pub use client::ElasticService;
pub use schema::{IndexSpec, blood_report_spec, clinical_notes_spec};
pub use types::{
    BulkItemFailure, BulkOutcome, ElasticError, Removal, SearchHit, SearchResponse, SqlColumn,
    SqlResponse,
};
