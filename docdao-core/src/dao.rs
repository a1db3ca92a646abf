//! Generic CRUD engine bound to one document type.
//!
//! [`CrudDao`] is the only data-access surface for a [`Document`] type. It translates
//! backend outcomes into its own vocabulary:
//!
//! - uniqueness violations and empty matches are ordinary results (`false`, `None`,
//!   [`UpdateOutcome::NotFound`], [`UpdateOutcome::UniqueConflict`]);
//! - transport, protocol and decode failures are logged and propagated;
//! - nothing is retried.
//!
//! Multi-document reads go through the [concurrent decode pipeline](crate::decode).

use std::{fmt, marker::PhantomData, sync::Arc};

use bson::{Bson, Document as BsonDocument, doc};
use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::{
    backend::CollectionBackend,
    config::DecodeConfig,
    context::Context,
    decode::decode_cursor,
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexSpec,
    options::{CountOptions, FindOneOptions, FindOptions},
    outcome::UpdateOutcome,
};

pub struct CrudDao<D: Document, B: CollectionBackend> {
    collection: Arc<B>,
    decode: DecodeConfig,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document, B: CollectionBackend> Clone for CrudDao<D, B> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            decode: self.decode,
            _marker: PhantomData,
        }
    }
}

impl<D: Document, B: CollectionBackend> fmt::Debug for CrudDao<D, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudDao")
            .field("document", &D::name_singular())
            .field("collection", &self.collection)
            .field("decode", &self.decode)
            .finish()
    }
}

impl<D: Document, B: CollectionBackend> CrudDao<D, B> {
    /// Binds an engine to `collection`.
    ///
    /// When `D` declares indexes, their creation is started on a detached background
    /// task so the engine is usable immediately. Without a tokio runtime the build is
    /// skipped; call [`ensure_indexes`](Self::ensure_indexes) instead.
    pub fn new(collection: B, decode: DecodeConfig) -> Self {
        let dao = Self {
            collection: Arc::new(collection),
            decode,
            _marker: PhantomData,
        };

        dao.spawn_index_build();

        dao
    }

    fn spawn_index_build(&self) {
        let indexes = D::indexes();
        if indexes.is_empty() {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!(
                document = D::name_singular(),
                "No async runtime available, skipping background index creation"
            );
            return;
        };

        let dao = self.clone();
        runtime.spawn(async move {
            dao.create_indexes(&Context::background(), indexes).await;
        });
    }

    /// Escape hatch to the raw collection for operations this engine does not cover.
    ///
    /// Callers bypassing the engine are responsible for keeping the data consistent.
    pub fn collection(&self) -> &B {
        &self.collection
    }

    /// Builds the indexes declared by `D` and waits for completion.
    pub async fn ensure_indexes(&self, ctx: &Context) {
        self.create_indexes(ctx, D::indexes()).await
    }

    /// Asks the store to build `indexes`. Failures are logged, never returned.
    pub async fn create_indexes(&self, ctx: &Context, indexes: Vec<IndexSpec>) {
        if indexes.is_empty() {
            return;
        }

        match ctx.run(self.collection.create_indexes(indexes)).await {
            Ok(names) => info!(
                fields = ?names,
                "Successfully created indexes for {} model",
                D::name_singular()
            ),
            Err(err) => error!(
                error = %err,
                "Could not create indexes for {} model",
                D::name_singular()
            ),
        }
    }

    /// Inserts `document`, stamping its creation time first.
    ///
    /// Returns `Ok(false)` when a uniqueness constraint rejects the document.
    pub async fn create(&self, ctx: &Context, document: &mut D) -> DocumentStoreResult<bool> {
        document.stamp_created(Utc::now());

        let raw = document.to_bson_document().inspect_err(|err| {
            error!(error = %err, "Could not serialize {}", D::name_singular());
        })?;

        match ctx.run(self.collection.insert_one(raw)).await {
            Ok(()) => {
                debug!("Successfully created {}", D::name_singular());
                Ok(true)
            }
            Err(err) if err.is_duplicate_key() => {
                warn!(
                    error = %err,
                    "Could not create {} due to a unique constraint error",
                    D::name_singular()
                );
                Ok(false)
            }
            Err(err) => {
                error!(error = %err, "Could not create {}", D::name_singular());
                Err(err)
            }
        }
    }

    /// Applies `patch` (an update-operator document) to the first match of `filter`.
    ///
    /// The field named by [`Document::updated_at_field`] is added to `$set` unless the
    /// patch already sets it.
    pub async fn update(
        &self,
        ctx: &Context,
        filter: BsonDocument,
        patch: BsonDocument,
        allow_upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let patch = stamp_updated::<D>(patch, Utc::now())?;

        let report = match ctx
            .run(self.collection.update_one(filter.clone(), patch, allow_upsert))
            .await
        {
            Ok(report) => report,
            Err(err) if err.is_duplicate_key() => {
                warn!(
                    filter = %filter,
                    error = %err,
                    "Could not update {} due to a unique constraint error",
                    D::name_singular()
                );
                return Ok(UpdateOutcome::UniqueConflict);
            }
            Err(err) => {
                error!(filter = %filter, error = %err, "Could not update {}", D::name_singular());
                return Err(err);
            }
        };

        if !allow_upsert && report.matched == 0 {
            warn!(filter = %filter, "Trying to update a non-existent {}", D::name_singular());
            return Ok(UpdateOutcome::NotFound);
        }

        debug!(filter = %filter, upserted = report.upserted, "Successfully updated {}", D::name_singular());

        Ok(UpdateOutcome::Modified { inserted: report.upserted })
    }

    /// Returns whether at least one document matches `filter`.
    pub async fn exists(
        &self,
        ctx: &Context,
        filter: BsonDocument,
        options: CountOptions,
    ) -> DocumentStoreResult<bool> {
        match ctx
            .run(self.collection.count_documents(filter.clone(), options))
            .await
        {
            Ok(count) => Ok(count > 0),
            Err(err) if err.is_no_documents() => {
                warn!(filter = %filter, "No {} with given filter exists", D::name_singular());
                Ok(false)
            }
            Err(err) => {
                error!(
                    filter = %filter,
                    error = %err,
                    "Could not check that {} exists",
                    D::name_singular()
                );
                Err(err)
            }
        }
    }

    pub async fn count(&self, ctx: &Context, filter: BsonDocument) -> DocumentStoreResult<u64> {
        ctx.run(self.collection.count_documents(filter.clone(), CountOptions::default()))
            .await
            .inspect_err(|err| {
                error!(filter = %filter, error = %err, "Could not count {}", D::name_plural());
            })
    }

    /// Returns the first document matching `filter`, or `None` when nothing matches.
    pub async fn find_one(
        &self,
        ctx: &Context,
        filter: BsonDocument,
        options: FindOneOptions,
    ) -> DocumentStoreResult<Option<D>> {
        let raw = match ctx.run(self.collection.find_one(filter.clone(), options)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!(filter = %filter, "No {} was found", D::name_singular());
                return Ok(None);
            }
            Err(err) if err.is_no_documents() => {
                warn!(filter = %filter, "No {} was found", D::name_singular());
                return Ok(None);
            }
            Err(err) => {
                error!(filter = %filter, error = %err, "Could not find {}", D::name_singular());
                return Err(err);
            }
        };

        let document = D::from_bson_document(raw).inspect_err(|err| {
            error!(filter = %filter, error = %err, "Could not decode {}", D::name_singular());
        })?;

        debug!(filter = %filter, "Successfully fetched {}", D::name_singular());

        Ok(Some(document))
    }

    /// Returns every document matching `filter`, in the order the store produced them.
    pub async fn find_many(
        &self,
        ctx: &Context,
        filter: BsonDocument,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<D>> {
        let cursor = ctx
            .run(self.collection.find(filter.clone(), options))
            .await
            .inspect_err(|err| {
                error!(filter = %filter, error = %err, "Could not find {}", D::name_plural());
            })?;

        let documents = decode_cursor::<D, _>(ctx, cursor, &self.decode)
            .await
            .inspect_err(|err| log_decode_failure::<D>(err, "filter", &filter.to_string()))?;

        debug!(filter = %filter, count = documents.len(), "Successfully fetched {}", D::name_plural());

        Ok(documents)
    }

    /// Runs an aggregation pipeline and decodes its output as `D`.
    pub async fn aggregate(
        &self,
        ctx: &Context,
        pipeline: Vec<BsonDocument>,
    ) -> DocumentStoreResult<Vec<D>> {
        let cursor = ctx
            .run(self.collection.aggregate(pipeline.clone()))
            .await
            .inspect_err(|err| {
                error!(pipeline = ?pipeline, error = %err, "Aggregation failed for {}", D::name_plural());
            })?;

        let documents = decode_cursor::<D, _>(ctx, cursor, &self.decode)
            .await
            .inspect_err(|err| log_decode_failure::<D>(err, "pipeline", &format!("{pipeline:?}")))?;

        debug!(pipeline = ?pipeline, count = documents.len(), "Aggregation successful for {}", D::name_plural());

        Ok(documents)
    }

    /// Deletes the first document matching `filter`.
    ///
    /// Returns `Ok(false)` when nothing was removed.
    pub async fn delete(&self, ctx: &Context, filter: BsonDocument) -> DocumentStoreResult<bool> {
        match ctx.run(self.collection.delete_one(filter.clone())).await {
            Ok(0) => {
                warn!(filter = %filter, "No {} was deleted", D::name_singular());
                Ok(false)
            }
            Ok(_) => {
                debug!(filter = %filter, "Successfully deleted {}", D::name_singular());
                Ok(true)
            }
            Err(err) if err.is_no_documents() => {
                warn!(filter = %filter, "Could not delete non-existent {}", D::name_singular());
                Ok(false)
            }
            Err(err) => {
                error!(filter = %filter, error = %err, "Could not delete {}", D::name_singular());
                Err(err)
            }
        }
    }

    /// Deletes every document matching `filter` and returns how many were removed.
    pub async fn delete_many(&self, ctx: &Context, filter: BsonDocument) -> DocumentStoreResult<u64> {
        ctx.run(self.collection.delete_many(filter.clone()))
            .await
            .inspect(|removed| {
                debug!(filter = %filter, removed, "Deleted {}", D::name_plural());
            })
            .inspect_err(|err| {
                error!(filter = %filter, error = %err, "Could not delete {}", D::name_plural());
            })
    }
}

fn log_decode_failure<D: Document>(err: &DocumentStoreError, source: &str, query: &str) {
    match err {
        DocumentStoreError::Decode(_) => error!(
            source,
            query,
            error = %err,
            "Could not decode {}",
            D::name_plural()
        ),
        _ => error!(
            source,
            query,
            error = %err,
            "Cursor error while decoding {}",
            D::name_plural()
        ),
    }
}

/// Adds `D`'s modification timestamp to the `$set` stage of `patch`.
fn stamp_updated<D: Document>(
    mut patch: BsonDocument,
    at: DateTime<Utc>,
) -> DocumentStoreResult<BsonDocument> {
    let Some(field) = D::updated_at_field() else {
        return Ok(patch);
    };

    let stamp = bson::DateTime::from_millis(at.timestamp_millis());

    match patch.get_mut("$set") {
        Some(Bson::Document(set)) => {
            if !set.contains_key(field) {
                set.insert(field, stamp);
            }
        }
        Some(other) => {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "$set must be a document, got {:?}",
                other.element_type()
            )));
        }
        None => {
            patch.insert("$set", doc! { field: stamp });
        }
    }

    Ok(patch)
}
