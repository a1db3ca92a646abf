//! MongoDB backend implementation for docdao.
//!
//! This crate provides MongoDB implementations of the
//! [`CollectionBackend`](docdao_core::backend::CollectionBackend),
//! [`RawCursor`](docdao_core::backend::RawCursor) and
//! [`Connector`](docdao_core::backend::Connector) traits.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docdao = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docdao::{prelude::*, mongodb::MongoConnector};
//!
//! let config = StoreConfig::new("localhost", 27017, "goauth");
//! let manager = ConnectionManager::new(MongoConnector::new(&config), &config);
//!
//! let handle = manager.acquire(&Context::background()).await?;
//! let users = handle.dao::<User>(config.decode);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docdao_mongodb;

pub mod collection;
pub mod connector;
pub mod cursor;
pub mod handle;
pub mod redact;

pub use collection::MongoCollection;
pub use connector::MongoConnector;
pub use cursor::MongoCursor;
pub use handle::MongoHandle;
pub use redact::redact_uri;
