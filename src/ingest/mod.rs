//! Document ingestion: PDF report uploads and synthetic clinical notes.

pub mod notes;
pub mod uploader;

pub use notes::{NotesError, NotesIngestor, NotesSummary, load_condition_groups};
pub use uploader::{BulkUploader, UploadError};
