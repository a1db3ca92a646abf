//! Error types and result types for document store operations.
//!
//! This module provides the error vocabulary shared by the CRUD engine, the decode
//! pipeline, the connection manager and every backend.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//!
//! Two conditions are *expected* rather than faults: a uniqueness violation
//! ([`DocumentStoreError::DuplicateKey`]) and an empty match
//! ([`DocumentStoreError::NoDocuments`]). Backends report them through these variants
//! and the engine absorbs them into its result shapes.

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
///
/// The enum is `Clone` so that a cached initialization failure can be handed to every
/// caller that waited on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentStoreError {
    /// Serialization error when converting a document into BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A raw record could not be decoded into the target document type.
    #[error("Decode error: {0}")]
    Decode(String),
    /// Error during client initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The shared client has not been initialized.
    #[error("{0}")]
    NotInitialized(String),
    /// The write would violate a uniqueness constraint.
    #[error("Duplicate key in collection {collection}: {message}")]
    DuplicateKey {
        collection: String,
        message: String,
    },
    /// The filter matched no document.
    #[error("No documents matched in collection {0}")]
    NoDocuments(String),
    /// The document or update has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// The execution context was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
    /// The execution context deadline elapsed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    /// The liveness probe against the shared client failed.
    #[error("the mongo check has failed: {0}")]
    HealthCheck(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DocumentStoreError {
    /// Returns `true` for uniqueness violations.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DocumentStoreError::DuplicateKey { .. })
    }

    /// Returns `true` when the store reported that nothing matched.
    pub fn is_no_documents(&self) -> bool {
        matches!(self, DocumentStoreError::NoDocuments(_))
    }

    /// Returns `true` when the error comes from the execution context rather than the store.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, DocumentStoreError::Cancelled | DocumentStoreError::DeadlineExceeded)
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
