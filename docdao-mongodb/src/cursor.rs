use async_trait::async_trait;
use bson::Document as BsonDocument;
use futures::TryStreamExt;
use mongodb::Cursor;

use docdao_core::{backend::RawCursor, error::DocumentStoreResult};

use crate::collection::map_error;

/// Server-side cursor adapter. Dropping it kills the cursor on the server.
#[derive(Debug)]
pub struct MongoCursor {
    collection: String,
    inner: Cursor<BsonDocument>,
}

impl MongoCursor {
    pub(crate) fn new(collection: &str, inner: Cursor<BsonDocument>) -> Self {
        Self {
            collection: collection.to_string(),
            inner,
        }
    }
}

#[async_trait]
impl RawCursor for MongoCursor {
    async fn next_document(&mut self) -> DocumentStoreResult<Option<BsonDocument>> {
        self.inner
            .try_next()
            .await
            .map_err(|e| map_error(&self.collection, e))
    }
}
