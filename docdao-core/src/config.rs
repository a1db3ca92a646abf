//! Typed configuration consumed by the connection manager and the CRUD engine.
//!
//! Loading the values (environment, files, flags) is left to the embedding
//! application; this module only defines the shape, its defaults and the derived
//! connection URI.

use std::{num::NonZeroUsize, thread::available_parallelism, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::DocumentStoreError;

const DEFAULT_PORT: u16 = 27017;
const DEFAULT_DATABASE: &str = "goauth";
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_INITIALIZATION_TIMEOUT: Duration = Duration::from_secs(60);
const HOSTED_CLUSTER_QUERY: &str = "retryWrites=true&w=majority";

/// What happens after the shared client fails to initialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitFailurePolicy {
    /// The failure is terminal for the process lifetime.
    #[default]
    Permanent,
    /// A caller arriving after the given delay starts a fresh attempt.
    RetryAfter(Duration),
}

/// Bounds for the concurrent decode pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Maximum number of decode tasks in flight for a single call.
    pub max_in_flight: usize,
}

impl DecodeConfig {
    pub fn new(max_in_flight: usize) -> Self {
        Self { max_in_flight: max_in_flight.max(1) }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        let cores = available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);

        Self::new(cores * 2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Use the `mongodb+srv` form for hosted clusters.
    pub use_hosted_cluster: bool,
    /// Enable zstd wire compression.
    pub use_compression: bool,
    /// Bound for a single connection attempt and for health pings.
    pub connection_timeout: Duration,
    /// Bound for the whole initialization (connect + ping).
    pub initialization_timeout: Duration,
    pub init_failure_policy: InitFailurePolicy,
    pub decode: DecodeConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            use_hosted_cluster: false,
            use_compression: false,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            initialization_timeout: DEFAULT_INITIALIZATION_TIMEOUT,
            init_failure_policy: InitFailurePolicy::default(),
            decode: DecodeConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            ..Self::default()
        }
    }

    /// Builds the connection URI from host, port and database name.
    pub fn connection_uri(&self) -> String {
        if self.use_hosted_cluster {
            format!("mongodb+srv://{}/{}?{}", self.host, self.database, HOSTED_CLUSTER_QUERY)
        } else {
            format!("mongodb://{}:{}/{}", self.host, self.port, self.database)
        }
    }

    /// Reports every missing mandatory setting.
    pub fn validate(&self) -> Vec<DocumentStoreError> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push(DocumentStoreError::Initialization("the MongoDB host is not set".into()));
        }

        if self.port == 0 {
            errors.push(DocumentStoreError::Initialization("the MongoDB port number is not set".into()));
        }

        errors
    }
}
