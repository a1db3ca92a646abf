//! Main docdao crate providing a typed CRUD layer over document databases.
//!
//! This crate is the primary entry point for users of the docdao framework. It
//! re-exports the core types from the sub-crates and gives convenient access to the
//! storage backends.
//!
//! # Features
//!
//! - **Typed data access** - One [`CrudDao`](dao::CrudDao) per document type, with outcomes instead of sentinel errors
//! - **Shared client lifecycle** - Run-once initialization and health checks through [`ConnectionManager`](connection::ConnectionManager)
//! - **Concurrent decoding** - Multi-document reads decode in parallel and keep store order
//! - **Multiple backends** - In-memory and MongoDB storage behind the same traits
//!
//! # Quick Start
//!
//! ```ignore
//! use docdao::{prelude::*, memory::InMemoryStore, bson::doc};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub email: String,
//!     pub name: String,
//! }
//!
//! impl Document for User {
//!     fn collection_name() -> &'static str { "users" }
//!     fn name_singular() -> &'static str { "user" }
//!     fn name_plural() -> &'static str { "users" }
//!
//!     fn indexes() -> Vec<IndexSpec> {
//!         vec![IndexSpec::ascending("email").unique()]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let ctx = Context::background();
//!     let store = InMemoryStore::new();
//!     let users = store.dao::<User>(DecodeConfig::default()).await;
//!     users.ensure_indexes(&ctx).await;
//!
//!     let mut user = User { email: "ada@example.com".into(), name: "Ada".into() };
//!     assert!(users.create(&ctx, &mut user).await?);
//!     // A second insert trips the unique index and reports `false`.
//!     assert!(!users.create(&ctx, &mut user).await?);
//!
//!     let outcome = users
//!         .update(&ctx, doc! { "email": "ada@example.com" }, doc! { "$set": { "name": "Ada L." } }, false)
//!         .await?;
//!     assert!(outcome.is_modified());
//!
//!     let found = users.find_many(&ctx, doc! {}, FindOptions::default()).await?;
//!     println!("Users: {:?}", found);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Connecting to MongoDB
//!
//! ```ignore
//! use docdao::{prelude::*, mongodb::MongoConnector};
//!
//! let config = StoreConfig::new("localhost", 27017, "goauth");
//! let manager = ConnectionManager::new(MongoConnector::new(&config), &config);
//!
//! let handle = manager.acquire(&Context::background()).await?;
//! let users = handle.dao::<User>(config.decode);
//!
//! if !manager.health_check().await.is_empty() {
//!     // report unhealthy
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docdao_core::{
    backend, config, connection, context, dao, decode, document, error, index, options, outcome,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docdao_memory::{InMemoryCollection, InMemoryConnector, InMemoryCursor, InMemoryStore};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docdao_mongodb::{
        MongoCollection, MongoConnector, MongoCursor, MongoHandle, redact_uri,
    };
}
