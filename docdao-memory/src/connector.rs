//! [`Connector`] over an [`InMemoryStore`], so the connection lifecycle can be driven
//! without a database server.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tracing::debug;

use docdao_core::{
    backend::Connector,
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::store::InMemoryStore;

#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    store: InMemoryStore,
    label: String,
    connects: Arc<AtomicUsize>,
}

impl InMemoryConnector {
    pub fn new(store: InMemoryStore) -> Self {
        Self::labelled(store, "default")
    }

    /// Creates a connector whose logged URI carries `label`.
    pub fn labelled(store: InMemoryStore, label: impl Into<String>) -> Self {
        Self {
            store,
            label: label.into(),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Number of times [`Connector::connect`] has been called.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    type Client = InMemoryStore;

    async fn connect(&self) -> DocumentStoreResult<InMemoryStore> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        self.ping(&self.store)
            .await
            .map_err(|err| DocumentStoreError::Initialization(err.to_string()))?;

        debug!(uri = %self.redacted_uri(), "Connected to in-memory store");

        Ok(self.store.clone())
    }

    async fn ping(&self, client: &InMemoryStore) -> DocumentStoreResult<()> {
        if client.is_reachable() {
            Ok(())
        } else {
            Err(DocumentStoreError::Backend(format!(
                "server selection timeout: {} is unreachable",
                self.redacted_uri()
            )))
        }
    }

    fn redacted_uri(&self) -> String {
        format!("memory://{}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_hands_out_the_shared_store() {
        let connector = InMemoryConnector::new(InMemoryStore::new());
        let client = connector.connect().await.unwrap();

        client.collection("people").await;
        assert_eq!(connector.store().list_collections().await, vec!["people".to_string()]);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_to_connect() {
        let store = InMemoryStore::new();
        store.set_reachable(false);
        let connector = InMemoryConnector::labelled(store, "offline");

        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::Initialization(_)));
        assert!(err.to_string().contains("memory://offline"));
    }
}
