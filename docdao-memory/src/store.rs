//! In-memory storage implementation for document stores.
//!
//! This module provides a small but faithful in-memory database: named collections of
//! BSON documents behind async-safe read-write locks, queried with the same filter,
//! update and projection documents a MongoDB collection accepts.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument, doc, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::{debug, trace};

use docdao_core::{
    backend::{CollectionBackend, RawCursor},
    config::DecodeConfig,
    dao::CrudDao,
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexSpec,
    options::{CountOptions, FindOneOptions, FindOptions},
    outcome::UpdateReport,
};

use crate::evaluator::{FilterEvaluator, UpdateApplier, project, same_key, sort_documents};

type CollectionMap = HashMap<String, InMemoryCollection>;

/// Thread-safe in-memory database.
///
/// `InMemoryStore` is cloneable and uses `Arc`-wrapped internal state, so clones share
/// the same collections. Queries scan every document of a collection; indexes are only
/// used to enforce uniqueness.
///
/// # Example
///
/// ```ignore
/// use docdao_memory::InMemoryStore;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let users = store.dao::<User>(DecodeConfig::default()).await;
/// let found = users.find_one(&Context::background(), doc! { "email": "a@b.c" }, Default::default()).await?;
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    collections: Arc<RwLock<CollectionMap>>,
    reachable: Arc<AtomicBool>,
    open_cursors: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(CollectionMap::new())),
            reachable: Arc::new(AtomicBool::new(true)),
            open_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the named collection, creating it on first use.
    pub async fn collection(&self, name: &str) -> InMemoryCollection {
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| InMemoryCollection::new(name, self.open_cursors.clone()))
            .clone()
    }

    /// Binds a CRUD engine to the collection `D` lives in.
    pub async fn dao<D: Document>(&self, decode: DecodeConfig) -> CrudDao<D, InMemoryCollection> {
        CrudDao::new(self.collection(D::collection_name()).await, decode)
    }

    pub async fn list_collections(&self) -> Vec<String> {
        self.collections.read().await.keys().cloned().collect()
    }

    /// Removes a collection and all of its documents. Returns whether it existed.
    pub async fn drop_collection(&self, name: &str) -> bool {
        self.collections.write().await.remove(name).is_some()
    }

    /// Number of cursors handed out by this store that are still open.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Simulates losing or regaining the server; only affects liveness pings.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<BsonDocument>,
    indexes: Vec<IndexSpec>,
}

impl CollectionState {
    fn matching(&self, filter: &BsonDocument) -> DocumentStoreResult<Vec<usize>> {
        let mut positions = Vec::new();

        for (position, document) in self.documents.iter().enumerate() {
            if FilterEvaluator::matches(document, filter)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    fn first_match(&self, filter: &BsonDocument) -> DocumentStoreResult<Option<usize>> {
        for (position, document) in self.documents.iter().enumerate() {
            if FilterEvaluator::matches(document, filter)? {
                return Ok(Some(position));
            }
        }

        Ok(None)
    }

    /// Rejects `candidate` when it collides with another document on `_id` or on any
    /// unique index. `replacing` is the position the candidate will overwrite.
    fn check_unique(
        &self,
        collection: &str,
        candidate: &BsonDocument,
        replacing: Option<usize>,
    ) -> DocumentStoreResult<()> {
        let id_key = vec!["_id".to_string()];
        let unique_keys = self
            .indexes
            .iter()
            .filter(|index| index.unique)
            .map(|index| (index.display_name(), index.fields().into_iter().map(String::from).collect::<Vec<_>>()));

        for (name, fields) in std::iter::once(("_id_".to_string(), id_key)).chain(unique_keys) {
            let collides = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != replacing)
                .any(|(_, existing)| same_key(existing, candidate, &fields));

            if collides {
                return Err(DocumentStoreError::DuplicateKey {
                    collection: collection.to_string(),
                    message: format!("E11000 duplicate key error collection: {collection} index: {name}"),
                });
            }
        }

        Ok(())
    }
}

/// One named collection of an [`InMemoryStore`].
#[derive(Clone, Debug)]
pub struct InMemoryCollection {
    name: Arc<str>,
    state: Arc<RwLock<CollectionState>>,
    open_cursors: Arc<AtomicUsize>,
}

impl InMemoryCollection {
    fn new(name: &str, open_cursors: Arc<AtomicUsize>) -> Self {
        Self {
            name: Arc::from(name),
            state: Arc::new(RwLock::new(CollectionState::default())),
            open_cursors,
        }
    }

    /// Names of the indexes built on this collection.
    pub async fn index_names(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .indexes
            .iter()
            .map(IndexSpec::display_name)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn cursor(&self, documents: Vec<BsonDocument>) -> InMemoryCursor {
        InMemoryCursor::new(documents, self.open_cursors.clone())
    }

    fn run_pipeline(
        documents: Vec<BsonDocument>,
        pipeline: &[BsonDocument],
    ) -> DocumentStoreResult<Vec<BsonDocument>> {
        let mut documents = documents;

        for stage in pipeline {
            let mut operators = stage.iter();
            let (Some((operator, argument)), None) = (operators.next(), operators.next()) else {
                return Err(DocumentStoreError::InvalidDocument(
                    "a pipeline stage must have exactly one field".into(),
                ));
            };

            documents = match (operator.as_str(), argument) {
                ("$match", Bson::Document(filter)) => {
                    let mut kept = Vec::with_capacity(documents.len());
                    for document in documents {
                        if FilterEvaluator::matches(&document, filter)? {
                            kept.push(document);
                        }
                    }
                    kept
                }
                ("$sort", Bson::Document(sort)) => {
                    sort_documents(&mut documents, sort);
                    documents
                }
                ("$skip", amount) => {
                    let skip = stage_amount(operator, amount)?;
                    documents.into_iter().skip(skip).collect()
                }
                ("$limit", amount) => {
                    let limit = stage_amount(operator, amount)?;
                    documents.into_iter().take(limit).collect()
                }
                ("$project", Bson::Document(projection)) => documents
                    .iter()
                    .map(|document| project(document, projection))
                    .collect(),
                ("$count", Bson::String(field)) => {
                    if documents.is_empty() {
                        Vec::new()
                    } else {
                        vec![doc! { field.as_str(): documents.len() as i64 }]
                    }
                }
                (operator, _) => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "unsupported pipeline stage {operator}"
                    )));
                }
            };
        }

        Ok(documents)
    }
}

fn stage_amount(operator: &str, amount: &Bson) -> DocumentStoreResult<usize> {
    let value = match amount {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        _ => -1,
    };

    usize::try_from(value).map_err(|_| {
        DocumentStoreError::InvalidDocument(format!("{operator} requires a non-negative integer"))
    })
}

fn clamp(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[async_trait]
impl CollectionBackend for InMemoryCollection {
    type Cursor = InMemoryCursor;

    fn name(&self) -> &str {
        &self.name
    }

    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> DocumentStoreResult<Vec<String>> {
        let mut state = self.state.write().await;
        let mut names = Vec::with_capacity(indexes.len());

        for index in indexes {
            names.push(index.display_name());

            if state.indexes.iter().any(|existing| existing.keys == index.keys) {
                continue;
            }

            if index.unique {
                let fields = index.fields().into_iter().map(String::from).collect::<Vec<_>>();
                for (position, document) in state.documents.iter().enumerate() {
                    if state.documents[position + 1..]
                        .iter()
                        .any(|other| same_key(document, other, &fields))
                    {
                        return Err(DocumentStoreError::DuplicateKey {
                            collection: self.name.to_string(),
                            message: format!(
                                "cannot build unique index {} over duplicate values",
                                index.display_name()
                            ),
                        });
                    }
                }
            }

            debug!(collection = %self.name, index = %index.display_name(), "Built index");
            state.indexes.push(index);
        }

        Ok(names)
    }

    async fn insert_one(&self, mut document: BsonDocument) -> DocumentStoreResult<()> {
        if !document.contains_key("_id") {
            let mut with_id = doc! { "_id": ObjectId::new() };
            with_id.extend(document);
            document = with_id;
        }

        let mut state = self.state.write().await;
        state.check_unique(&self.name, &document, None)?;
        state.documents.push(document);

        Ok(())
    }

    async fn update_one(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateReport> {
        let mut state = self.state.write().await;

        if let Some(position) = state.first_match(&filter)? {
            let mut updated = state.documents[position].clone();
            UpdateApplier::apply(&mut updated, &update, false)?;

            if updated.get("_id") != state.documents[position].get("_id") {
                return Err(DocumentStoreError::InvalidDocument(
                    "the _id field cannot be modified".into(),
                ));
            }

            state.check_unique(&self.name, &updated, Some(position))?;

            let modified = u64::from(updated != state.documents[position]);
            state.documents[position] = updated;

            return Ok(UpdateReport { matched: 1, modified, upserted: false });
        }

        if !upsert {
            return Ok(UpdateReport::default());
        }

        let mut inserted = UpdateApplier::seed_from_filter(&filter)?;
        UpdateApplier::apply(&mut inserted, &update, true)?;

        if !inserted.contains_key("_id") {
            let mut with_id = doc! { "_id": ObjectId::new() };
            with_id.extend(inserted);
            inserted = with_id;
        }

        state.check_unique(&self.name, &inserted, None)?;
        state.documents.push(inserted);

        Ok(UpdateReport { matched: 0, modified: 0, upserted: true })
    }

    async fn count_documents(
        &self,
        filter: BsonDocument,
        options: CountOptions,
    ) -> DocumentStoreResult<u64> {
        let matched = self.state.read().await.matching(&filter)?.len() as u64;
        let counted = matched.saturating_sub(options.skip.unwrap_or(0));

        Ok(match options.limit {
            Some(limit) if limit > 0 => counted.min(limit),
            _ => counted,
        })
    }

    async fn find_one(
        &self,
        filter: BsonDocument,
        options: FindOneOptions,
    ) -> DocumentStoreResult<Option<BsonDocument>> {
        let mut cursor = self.find(filter, options.into()).await?;
        cursor.next_document().await
    }

    async fn find(
        &self,
        filter: BsonDocument,
        options: FindOptions,
    ) -> DocumentStoreResult<Self::Cursor> {
        let mut documents = {
            let state = self.state.read().await;
            state
                .matching(&filter)?
                .into_iter()
                .map(|position| state.documents[position].clone())
                .collect::<Vec<_>>()
        };

        if let Some(sort) = &options.sort {
            sort_documents(&mut documents, sort);
        }

        let skip = clamp(options.skip.unwrap_or(0));
        let limit = match options.limit {
            Some(limit) if limit != 0 => clamp(limit.unsigned_abs()),
            _ => usize::MAX,
        };

        let documents = documents
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &options.projection {
                Some(projection) => project(&document, projection),
                None => document,
            })
            .collect::<Vec<_>>();

        trace!(collection = %self.name, filter = %filter, results = documents.len(), "Opened cursor");

        Ok(self.cursor(documents))
    }

    async fn aggregate(&self, pipeline: Vec<BsonDocument>) -> DocumentStoreResult<Self::Cursor> {
        let documents = self.state.read().await.documents.clone();
        let documents = Self::run_pipeline(documents, &pipeline)?;

        Ok(self.cursor(documents))
    }

    async fn delete_one(&self, filter: BsonDocument) -> DocumentStoreResult<u64> {
        let mut state = self.state.write().await;

        match state.first_match(&filter)? {
            Some(position) => {
                state.documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, filter: BsonDocument) -> DocumentStoreResult<u64> {
        let mut state = self.state.write().await;
        let doomed = state.matching(&filter)?;

        let mut position = 0;
        state.documents.retain(|_| {
            let keep = doomed.binary_search(&position).is_err();
            position += 1;
            keep
        });

        Ok(doomed.len() as u64)
    }
}

/// Cursor over a snapshot of query results.
///
/// Counts itself against the owning store's open-cursor tally until dropped or closed.
#[derive(Debug)]
pub struct InMemoryCursor {
    documents: VecDeque<BsonDocument>,
    open_cursors: Arc<AtomicUsize>,
}

impl InMemoryCursor {
    fn new(documents: Vec<BsonDocument>, open_cursors: Arc<AtomicUsize>) -> Self {
        open_cursors.fetch_add(1, Ordering::SeqCst);

        Self {
            documents: documents.into(),
            open_cursors,
        }
    }
}

impl Drop for InMemoryCursor {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RawCursor for InMemoryCursor {
    async fn next_document(&mut self) -> DocumentStoreResult<Option<BsonDocument>> {
        Ok(self.documents.pop_front())
    }
}
