//! Storage backend abstraction for the CRUD engine.
//!
//! This module defines the seam between [`CrudDao`](crate::dao::CrudDao) and a concrete
//! database driver.
//!
//! # Traits
//!
//! - [`CollectionBackend`]: one bound collection, speaking raw BSON documents
//! - [`RawCursor`]: a sequential, single-direction stream of raw result records
//! - [`Connector`]: builds and probes the process-wide client
//!
//! Backends must report uniqueness violations as
//! [`DocumentStoreError::DuplicateKey`](crate::error::DocumentStoreError::DuplicateKey)
//! so that the engine can turn them into ordinary outcomes.

use async_trait::async_trait;
use bson::Document as BsonDocument;
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    index::IndexSpec,
    options::{CountOptions, FindOneOptions, FindOptions},
    outcome::UpdateReport,
};

/// A server-side result set fetched incrementally.
///
/// Fetching is inherently sequential: each call to [`next_document`](Self::next_document)
/// advances the stream and hands out an owned snapshot of the current record.
#[async_trait]
pub trait RawCursor: Send {
    /// Fetches the next raw record, or `None` once the stream is exhausted.
    async fn next_document(&mut self) -> DocumentStoreResult<Option<BsonDocument>>;

    /// Releases the server-side resources held by the cursor.
    ///
    /// The default implementation relies on dropping the cursor.
    async fn close(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Abstract interface for a single collection in a document store.
///
/// Implementations must be thread-safe; one instance is shared by every call made
/// through the engine bound to it.
#[async_trait]
pub trait CollectionBackend: Send + Sync + Debug + 'static {
    type Cursor: RawCursor + 'static;

    /// Returns the physical collection name.
    fn name(&self) -> &str;

    /// Builds the given indexes and returns their names.
    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocumentStoreResult<Vec<String>>;

    /// Inserts a single document.
    async fn insert_one(&self, document: BsonDocument) -> DocumentStoreResult<()>;

    /// Applies an update-operator document to the first match of `filter`.
    ///
    /// With `upsert` set and no match, a new document is inserted instead.
    async fn update_one(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateReport>;

    /// Counts the documents matching `filter`.
    async fn count_documents(
        &self,
        filter: BsonDocument,
        options: CountOptions,
    ) -> DocumentStoreResult<u64>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        filter: BsonDocument,
        options: FindOneOptions,
    ) -> DocumentStoreResult<Option<BsonDocument>>;

    /// Opens a cursor over the documents matching `filter`.
    async fn find(
        &self,
        filter: BsonDocument,
        options: FindOptions,
    ) -> DocumentStoreResult<Self::Cursor>;

    /// Opens a cursor over the output of an aggregation pipeline.
    async fn aggregate(&self, pipeline: Vec<BsonDocument>) -> DocumentStoreResult<Self::Cursor>;

    /// Deletes the first document matching `filter` and returns the removed count.
    async fn delete_one(&self, filter: BsonDocument) -> DocumentStoreResult<u64>;

    /// Deletes every document matching `filter` and returns the removed count.
    async fn delete_many(&self, filter: BsonDocument) -> DocumentStoreResult<u64>;
}

/// Factory for the process-wide database client.
///
/// Used by [`ConnectionManager`](crate::connection::ConnectionManager), which
/// guarantees that [`connect`](Self::connect) runs at most once per attempt window.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Shared client handle; cloning must be cheap and yield the same underlying client.
    type Client: Clone + Send + Sync + 'static;

    /// Opens a client and verifies it with a liveness ping.
    async fn connect(&self) -> DocumentStoreResult<Self::Client>;

    /// Issues a liveness ping against an established client.
    async fn ping(&self, client: &Self::Client) -> DocumentStoreResult<()>;

    /// Connection URI with credentials masked, suitable for logs.
    fn redacted_uri(&self) -> String;

    /// Releases the client's resources.
    async fn shutdown(&self, _client: Self::Client) {}
}
