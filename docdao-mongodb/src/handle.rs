use mongodb::{Client, Database};

use docdao_core::{config::DecodeConfig, dao::CrudDao, document::Document};

use crate::collection::MongoCollection;

/// The shared client together with the database every collection lives in.
///
/// Cloning is cheap; clones share the driver's connection pool.
#[derive(Debug, Clone)]
pub struct MongoHandle {
    client: Client,
    database: String,
}

impl MongoHandle {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    pub fn collection(&self, name: &str) -> MongoCollection {
        MongoCollection::new(self.database().collection(name))
    }

    /// Binds a CRUD engine to the collection `D` lives in.
    pub fn dao<D: Document>(&self, decode: DecodeConfig) -> CrudDao<D, MongoCollection> {
        CrudDao::new(self.collection(D::collection_name()), decode)
    }
}
