//! A typed CRUD access layer over document databases.
//!
//! This crate is the core of the docdao project and provides:
//!
//! - **Document contract** ([`document`], [`index`]) - Schema metadata every stored type exposes
//! - **Backend abstraction** ([`backend`]) - Traits for collection drivers, cursors and connectors
//! - **CRUD engine** ([`dao`]) - The typed data-access object bound to one document type
//! - **Decode pipeline** ([`decode`]) - Bounded, order-preserving concurrent cursor decoding
//! - **Connection lifecycle** ([`connection`]) - Run-once shared client initialization and health checks
//! - **Execution context** ([`context`]) - Cancellation and deadlines for every operation
//! - **Configuration** ([`config`]) - Typed settings consumed by the layers above
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docdao::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub email: String,
//! }
//!
//! impl Document for User {
//!     fn collection_name() -> &'static str { "users" }
//!     fn name_singular() -> &'static str { "user" }
//!     fn name_plural() -> &'static str { "users" }
//! }
//!
//! let users = CrudDao::<User, _>::new(collection, DecodeConfig::default());
//! let created = users.create(&Context::background(), &mut user).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docdao_core;

pub mod backend;
pub mod config;
pub mod connection;
pub mod context;
pub mod dao;
pub mod decode;
pub mod document;
pub mod error;
pub mod index;
pub mod options;
pub mod outcome;
