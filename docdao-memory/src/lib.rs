//! In-memory document storage backend for docdao.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! [`CollectionBackend`](docdao_core::backend::CollectionBackend) and
//! [`Connector`](docdao_core::backend::Connector) traits. It uses async-aware read-write
//! locks for concurrent access and is ideal for development and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **MongoDB-style queries** - Comparison, membership and logical filter operators on dotted paths
//! - **Update operators** - `$set`, `$unset`, `$inc` and `$setOnInsert`, with upserts
//! - **Unique indexes** - Violations surface as duplicate key errors
//! - **Aggregation** - `$match`, `$sort`, `$skip`, `$limit`, `$project` and `$count` stages
//!
//! # Quick Start
//!
//! ```ignore
//! use docdao::{prelude::*, memory::InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! let users = store.dao::<User>(DecodeConfig::default()).await;
//!
//! let mut user = User { email: "ada@example.com".into(), ..Default::default() };
//! assert!(users.create(&Context::background(), &mut user).await?);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docdao_memory;

pub mod connector;
mod evaluator;
pub mod store;

pub use connector::InMemoryConnector;
pub use store::{InMemoryCollection, InMemoryCursor, InMemoryStore};
