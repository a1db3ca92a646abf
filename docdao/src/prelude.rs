//! Convenient re-exports of commonly used types from docdao.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docdao::prelude::*;
//! ```

pub use docdao_core::{
    backend::{CollectionBackend, Connector, RawCursor},
    config::{DecodeConfig, InitFailurePolicy, StoreConfig},
    connection::{ConnectionManager, ConnectionState},
    context::Context,
    dao::CrudDao,
    decode::decode_cursor,
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexSpec,
    options::{CountOptions, FindOneOptions, FindOptions},
    outcome::{UpdateOutcome, UpdateReport},
};
