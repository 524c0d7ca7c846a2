//! Error types for the core crate.

use chronicle_rs_memory::MemoryError;
use thiserror::Error;

/// Errors returned by core services.
#[derive(Debug, Error)]
pub enum ChronicleCoreError {
    /// Chat id is unknown to the session catalog.
    #[error("chat not found: {0}")]
    ChatNotFound(String),
    /// Source id is unknown or not a knowledge file.
    #[error("source not found: {0}")]
    SourceNotFound(String),
    /// Task id is unknown to the task registry.
    #[error("task not found: {0}")]
    TaskNotFound(String),
    /// Memory store error.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
    /// Session catalog error.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    /// Export payload could not be read.
    #[error("invalid export: {0}")]
    InvalidExport(String),
    /// Knowledge file type is not accepted for ingestion.
    #[error("unsupported document type: {0} (only .txt and .md files are supported)")]
    UnsupportedDocument(String),
}

/// Errors returned by the session catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
