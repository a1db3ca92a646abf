//! Driver-independent query options accepted by the CRUD engine.
//!
//! Backends translate these into their native option types.

use bson::Document as BsonDocument;

/// Options for multi-document queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Fields to include (`1`) or exclude (`0`).
    pub projection: Option<BsonDocument>,
    /// Sort keys in priority order, `1` ascending and `-1` descending.
    pub sort: Option<BsonDocument>,
    /// Number of matching documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
}

impl FindOptions {
    pub fn projection(mut self, projection: BsonDocument) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: BsonDocument) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for single-document queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneOptions {
    pub projection: Option<BsonDocument>,
    pub sort: Option<BsonDocument>,
    pub skip: Option<u64>,
}

impl FindOneOptions {
    pub fn projection(mut self, projection: BsonDocument) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: BsonDocument) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }
}

impl From<FindOneOptions> for FindOptions {
    fn from(options: FindOneOptions) -> Self {
        FindOptions {
            projection: options.projection,
            sort: options.sort,
            skip: options.skip,
            limit: Some(1),
        }
    }
}

/// Options for counting documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl CountOptions {
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}
