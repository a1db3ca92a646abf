use async_trait::async_trait;
use bson::Document as BsonDocument;
use mongodb::{
    Collection, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{self, IndexOptions},
};
use tracing::trace;

use docdao_core::{
    backend::CollectionBackend,
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexSpec,
    options::{CountOptions, FindOneOptions, FindOptions},
    outcome::UpdateReport,
};

use crate::cursor::MongoCursor;

/// Server error code for unique index violations.
const DUPLICATE_KEY: i32 = 11000;

/// Translates a driver error, singling out uniqueness violations.
pub(crate) fn map_error(collection: &str, err: MongoError) -> DocumentStoreError {
    let code = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) => Some(failure.code),
        ErrorKind::Command(failure) => Some(failure.code),
        _ => None,
    };

    if code == Some(DUPLICATE_KEY) {
        DocumentStoreError::DuplicateKey {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    } else {
        DocumentStoreError::Backend(err.to_string())
    }
}

/// [`CollectionBackend`] over a driver collection of raw documents.
#[derive(Debug, Clone)]
pub struct MongoCollection {
    inner: Collection<BsonDocument>,
}

impl MongoCollection {
    pub fn new(inner: Collection<BsonDocument>) -> Self {
        Self { inner }
    }

    /// The underlying driver collection.
    pub fn inner(&self) -> &Collection<BsonDocument> {
        &self.inner
    }

    fn error(&self, err: MongoError) -> DocumentStoreError {
        map_error(self.inner.name(), err)
    }
}

fn index_model(spec: IndexSpec) -> IndexModel {
    IndexModel::builder()
        .keys(spec.keys)
        .options(
            IndexOptions::builder()
                .unique(spec.unique)
                .name(spec.name)
                .build(),
        )
        .build()
}

#[async_trait]
impl CollectionBackend for MongoCollection {
    type Cursor = MongoCursor;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocumentStoreResult<Vec<String>> {
        Ok(self
            .inner
            .create_indexes(indexes.into_iter().map(index_model))
            .await
            .map_err(|e| self.error(e))?
            .index_names)
    }

    async fn insert_one(&self, document: BsonDocument) -> DocumentStoreResult<()> {
        self.inner
            .insert_one(document)
            .await
            .map_err(|e| self.error(e))?;

        Ok(())
    }

    async fn update_one(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateReport> {
        let result = self
            .inner
            .update_one(filter, update)
            .upsert(upsert)
            .await
            .map_err(|e| self.error(e))?;

        Ok(UpdateReport {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn count_documents(
        &self,
        filter: BsonDocument,
        options: CountOptions,
    ) -> DocumentStoreResult<u64> {
        let mut count_options = options::CountOptions::default();
        count_options.skip = options.skip;
        count_options.limit = options.limit;

        self.inner
            .count_documents(filter)
            .with_options(count_options)
            .await
            .map_err(|e| self.error(e))
    }

    async fn find_one(
        &self,
        filter: BsonDocument,
        options: FindOneOptions,
    ) -> DocumentStoreResult<Option<BsonDocument>> {
        let mut find_options = options::FindOneOptions::default();
        find_options.projection = options.projection;
        find_options.sort = options.sort;
        find_options.skip = options.skip;

        self.inner
            .find_one(filter)
            .with_options(find_options)
            .await
            .map_err(|e| self.error(e))
    }

    async fn find(
        &self,
        filter: BsonDocument,
        options: FindOptions,
    ) -> DocumentStoreResult<Self::Cursor> {
        trace!(collection = %self.inner.name(), filter = %filter, "Opening cursor");

        let mut find_options = options::FindOptions::default();
        find_options.projection = options.projection;
        find_options.sort = options.sort;
        find_options.skip = options.skip;
        find_options.limit = options.limit;

        let cursor = self
            .inner
            .find(filter)
            .with_options(find_options)
            .await
            .map_err(|e| self.error(e))?;

        Ok(MongoCursor::new(self.inner.name(), cursor))
    }

    async fn aggregate(&self, pipeline: Vec<BsonDocument>) -> DocumentStoreResult<Self::Cursor> {
        let cursor = self
            .inner
            .aggregate(pipeline)
            .await
            .map_err(|e| self.error(e))?;

        Ok(MongoCursor::new(self.inner.name(), cursor))
    }

    async fn delete_one(&self, filter: BsonDocument) -> DocumentStoreResult<u64> {
        Ok(self
            .inner
            .delete_one(filter)
            .await
            .map_err(|e| self.error(e))?
            .deleted_count)
    }

    async fn delete_many(&self, filter: BsonDocument) -> DocumentStoreResult<u64> {
        Ok(self
            .inner
            .delete_many(filter)
            .await
            .map_err(|e| self.error(e))?
            .deleted_count)
    }
}
