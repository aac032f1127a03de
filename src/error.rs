//! Error types for the object store.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No such field: {0}")]
    NoSuchField(String),

    #[error("No such child: {0}")]
    NoSuchChild(String),

    #[error("Object not found: {type_name}/{id}")]
    NotFound { type_name: String, id: String },

    #[error("Ambiguous child type, specify one of: {0:?}")]
    AmbiguousChildType(Vec<String>),

    #[error("Invalid child type: {0}")]
    InvalidChildType(String),

    #[error("Field has no save strategy and is read-only: {0}")]
    ReadOnlyField(String),

    #[error("Source payload not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Backing file for present field {field} is missing: {path}")]
    MissingOnDisk { field: String, path: PathBuf },

    #[error("Object already exists: {type_name}/{id}")]
    ObjectExists { type_name: String, id: String },

    #[error("Child {local} already registered as {existing}")]
    ChildConflict { local: String, existing: String },

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
