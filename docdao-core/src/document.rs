//! Core traits for document schema metadata and BSON conversion.
//!
//! Every entity type persisted through a [`CrudDao`](crate::dao::CrudDao) implements
//! [`Document`]. The trait exposes schema metadata only (names, indexes and timestamp
//! hooks); the engine never needs an instance of the type to read it.

use bson::{Bson, Document as BsonDocument, de::deserialize_from_bson, ser::serialize_to_bson};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexSpec,
};

/// Schema contract that every stored entity type must satisfy.
///
/// # Example
///
/// ```ignore
/// use docdao::prelude::*;
/// use chrono::{DateTime, Utc};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     pub email: String,
///     pub created_at: Option<DateTime<Utc>>,
///     pub updated_at: Option<DateTime<Utc>>,
/// }
///
/// impl Document for User {
///     fn collection_name() -> &'static str { "users" }
///     fn name_singular() -> &'static str { "user" }
///     fn name_plural() -> &'static str { "users" }
///
///     fn indexes() -> Vec<IndexSpec> {
///         vec![IndexSpec::ascending("email").unique()]
///     }
///
///     fn stamp_created(&mut self, at: DateTime<Utc>) {
///         self.created_at = Some(at);
///     }
///
///     fn updated_at_field() -> Option<&'static str> {
///         Some("updated_at")
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the physical name of the collection this document lives in.
    fn collection_name() -> &'static str;

    /// Returns the singular display name used in log messages.
    fn name_singular() -> &'static str;

    /// Returns the plural display name used in log messages.
    fn name_plural() -> &'static str;

    /// Returns the indexes to build when an engine is bound to the collection.
    fn indexes() -> Vec<IndexSpec> {
        Vec::new()
    }

    /// Hook invoked by [`CrudDao::create`](crate::dao::CrudDao::create) right before
    /// insertion. Types carrying a creation timestamp should store `at`.
    fn stamp_created(&mut self, _at: DateTime<Utc>) {}

    /// Names the field that [`CrudDao::update`](crate::dao::CrudDao::update) stamps with
    /// the current time, if the type tracks modification time.
    fn updated_at_field() -> Option<&'static str> {
        None
    }
}

/// Extension trait providing BSON conversion for documents.
///
/// This trait is automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to a BSON value.
    fn to_bson(&self) -> DocumentStoreResult<Bson>;

    /// Converts this document to a BSON document, failing if it does not serialize as one.
    fn to_bson_document(&self) -> DocumentStoreResult<BsonDocument>;

    /// Creates a document from a BSON value.
    fn from_bson(bson: Bson) -> DocumentStoreResult<Self>;

    /// Creates a document from a raw BSON document fetched from a store.
    ///
    /// Failures are reported as [`DocumentStoreError::Decode`].
    fn from_bson_document(document: BsonDocument) -> DocumentStoreResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_bson(&self) -> DocumentStoreResult<Bson> {
        Ok(serialize_to_bson(self)?)
    }

    fn to_bson_document(&self) -> DocumentStoreResult<BsonDocument> {
        match self.to_bson()? {
            Bson::Document(document) => Ok(document),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "{} serialized to {:?} instead of a document",
                D::name_singular(),
                other.element_type()
            ))),
        }
    }

    fn from_bson(bson: Bson) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(bson)?)
    }

    fn from_bson_document(document: BsonDocument) -> DocumentStoreResult<Self> {
        deserialize_from_bson(Bson::Document(document))
            .map_err(|err| DocumentStoreError::Decode(format!("{}: {err}", D::name_singular())))
    }
}
