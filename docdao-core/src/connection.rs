//! Process-wide client lifecycle.
//!
//! [`ConnectionManager`] hands out a single shared client, created at most once no
//! matter how many callers ask for it concurrently. It is an ordinary value: build it
//! once at startup and pass it (usually behind an `Arc`) to whatever needs a client.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --acquire--> Connecting --ok--> Ready
//!                                      \--err-> Failed
//! ```
//!
//! `Ready` is final. `Failed` is final under [`InitFailurePolicy::Permanent`]; under
//! [`InitFailurePolicy::RetryAfter`] a caller arriving once the delay has elapsed starts
//! a new attempt.

use std::{
    sync::{
        OnceLock,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::Mutex,
    time::{Instant, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::Connector,
    config::{InitFailurePolicy, StoreConfig},
    context::Context,
    error::{DocumentStoreError, DocumentStoreResult},
};

const CLIENT_ABSENT: &str = "client is absent";

/// Observable lifecycle state of the shared client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Ready,
    Failed,
}

impl ConnectionState {
    fn from_phase(phase: u8) -> Self {
        match phase {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Ready,
            3 => ConnectionState::Failed,
            _ => ConnectionState::Uninitialized,
        }
    }
}

#[derive(Debug)]
enum InitState {
    Uninitialized,
    Failed {
        error: DocumentStoreError,
        at: Instant,
    },
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    client: OnceLock<C::Client>,
    init: Mutex<InitState>,
    phase: AtomicU8,
    connection_timeout: Duration,
    initialization_timeout: Duration,
    failure_policy: InitFailurePolicy,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, config: &StoreConfig) -> Self {
        Self {
            connector,
            client: OnceLock::new(),
            init: Mutex::new(InitState::Uninitialized),
            phase: AtomicU8::new(ConnectionState::Uninitialized as u8),
            connection_timeout: config.connection_timeout,
            initialization_timeout: config.initialization_timeout,
            failure_policy: config.init_failure_policy,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns the shared client, creating it on first use.
    ///
    /// Callers arriving while the first attempt is in flight wait for it and receive
    /// the same client or the same error. Once ready, the cached client is returned
    /// without contacting the database.
    ///
    /// If `ctx` is interrupted while this caller is the one connecting, the attempt is
    /// abandoned without caching anything and the next waiter starts over.
    pub async fn acquire(&self, ctx: &Context) -> DocumentStoreResult<C::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }

        let mut init = ctx.run(async { Ok(self.init.lock().await) }).await?;

        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }

        if let InitState::Failed { error, at } = &*init {
            match self.failure_policy {
                InitFailurePolicy::Permanent => return Err(error.clone()),
                InitFailurePolicy::RetryAfter(delay) if at.elapsed() < delay => {
                    return Err(error.clone());
                }
                InitFailurePolicy::RetryAfter(_) => {
                    debug!(uri = %self.connector.redacted_uri(), "Retrying client initialization");
                }
            }
        }

        let previous = match &*init {
            InitState::Uninitialized => ConnectionState::Uninitialized,
            InitState::Failed { .. } => ConnectionState::Failed,
        };
        self.set_phase(ConnectionState::Connecting);

        let attempt = ctx
            .run(async {
                timeout(self.initialization_timeout, self.connector.connect())
                    .await
                    .map_err(|_| {
                        DocumentStoreError::Initialization(format!(
                            "client initialization timed out after {:?}",
                            self.initialization_timeout
                        ))
                    })?
            })
            .await;

        match attempt {
            Ok(client) => {
                info!(uri = %self.connector.redacted_uri(), "The MongoDB client has been initialized");

                let client = self.client.get_or_init(|| client).clone();
                *init = InitState::Uninitialized;
                self.set_phase(ConnectionState::Ready);

                Ok(client)
            }
            Err(err) if err.is_interrupted() => {
                warn!(error = %err, "Client initialization interrupted by the caller");
                self.set_phase(previous);
                Err(err)
            }
            Err(err) => {
                error!(
                    uri = %self.connector.redacted_uri(),
                    error = %err,
                    "The MongoDB client could not be initialized"
                );

                *init = InitState::Failed { error: err.clone(), at: Instant::now() };
                self.set_phase(ConnectionState::Failed);

                Err(err)
            }
        }
    }

    /// Returns the shared client if it has already been initialized.
    pub fn client(&self) -> Option<&C::Client> {
        self.client.get()
    }

    pub fn state(&self) -> ConnectionState {
        if self.client.get().is_some() {
            return ConnectionState::Ready;
        }

        ConnectionState::from_phase(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, state: ConnectionState) {
        self.phase.store(state as u8, Ordering::Release);
    }

    /// Probes the shared client and returns every problem found.
    ///
    /// An empty list means healthy. Never changes the connection state.
    pub async fn health_check(&self) -> Vec<DocumentStoreError> {
        let Some(client) = self.client.get() else {
            return vec![DocumentStoreError::NotInitialized(CLIENT_ABSENT.to_string())];
        };

        let probe = match timeout(self.connection_timeout, self.connector.ping(client)).await {
            Ok(result) => result,
            Err(_) => Err(DocumentStoreError::DeadlineExceeded),
        };

        match probe {
            Ok(()) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "Health check failed");
                vec![DocumentStoreError::HealthCheck(err.to_string())]
            }
        }
    }

    /// Hands the client back to the connector for cleanup.
    pub async fn shutdown(self) {
        if let Some(client) = self.client.into_inner() {
            self.connector.shutdown(client).await;
        }
    }
}
