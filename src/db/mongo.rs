//! MongoDB connector and config DAO
//!
//! One client per process, one database per namespace, schema-declared indexes.

use async_trait::async_trait;
use bson::{doc, DateTime, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    options::{ClientOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::db::dao::{ConfigCollection, ConfigDao, IdStream};
use crate::db::schemas::{
    LibraryCounters, LibraryFilter, LibraryMetadata, LIBRARY_KEY, LIBRARY_METADATA_COLLECTION,
};
use crate::types::{RegistryError, Result};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(3);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Authenticated handle to the metadata store
///
/// Cloning is cheap; all clones share the driver's connection pool.
#[derive(Clone)]
pub struct MongoDbConnector {
    client: Client,
    env: String,
}

impl MongoDbConnector {
    /// Connect and verify the connection with a ping
    pub async fn from_uri(uri: &str, env: &str, app_name: &str) -> Result<Self> {
        if env.is_empty() {
            return Err(RegistryError::Config(
                "Environment string cannot be empty".into(),
            ));
        }

        info!(env = %env, "Connecting to MongoDB at {}", uri);

        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| RegistryError::Database(format!("Invalid MongoDB URI: {}", e)))?;
        options.app_name = Some(app_name.to_string());
        // Fail fast on an unreachable server instead of hanging
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
        options.connect_timeout = Some(CONNECT_TIMEOUT);

        let client = Client::with_options(options)
            .map_err(|e| RegistryError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| RegistryError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!(env = %env, "Connected to MongoDB");

        Ok(Self::from_client(client, env))
    }

    /// Wrap an existing driver client
    pub fn from_client(client: Client, env: &str) -> Self {
        Self {
            client,
            env: env.to_string(),
        }
    }

    pub fn get_db(&self, db_name: &str) -> Database {
        self.client.database(db_name)
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// DAO over the database backing `namespace`
    pub fn config_dao(&self, namespace: &str, config: &RegistryConfig) -> MongoConfigDao {
        MongoConfigDao::new(self.clone(), &config.database_for(namespace))
    }

    pub async fn close(self) {
        self.client.shutdown().await;
    }
}

/// [`ConfigDao`] over one namespace database
#[derive(Clone)]
pub struct MongoConfigDao {
    connector: MongoDbConnector,
    db_name: String,
    lib_coll: Collection<Document>,
    storage_coll: Collection<Document>,
    lib_meta_coll: Collection<LibraryMetadata>,
}

impl MongoConfigDao {
    pub fn new(connector: MongoDbConnector, db_name: &str) -> Self {
        let db = connector.get_db(db_name);
        Self {
            lib_coll: db.collection(ConfigCollection::Library.collection_name()),
            storage_coll: db.collection(ConfigCollection::Storage.collection_name()),
            lib_meta_coll: db.collection(LIBRARY_METADATA_COLLECTION),
            db_name: db_name.to_string(),
            connector,
        }
    }

    pub fn connector(&self) -> &MongoDbConnector {
        &self.connector
    }

    fn coll(&self, coll: ConfigCollection) -> &Collection<Document> {
        match coll {
            ConfigCollection::Library => &self.lib_coll,
            ConfigCollection::Storage => &self.storage_coll,
        }
    }

    async fn list_ids(&self, coll: ConfigCollection, filter: Document) -> Result<IdStream> {
        let id_field = coll.id_field();
        let cursor = self
            .coll(coll)
            .find(filter)
            .projection(doc! { id_field: 1, "_id": 0 })
            .await?;

        let ids = cursor.map(move |item| {
            let d = item?;
            d.get_str(id_field).map(str::to_string).map_err(|e| {
                RegistryError::Serialization(format!("Document without {}: {}", id_field, e))
            })
        });

        Ok(ids.boxed())
    }
}

fn create_indexes_for(indices: Vec<(Document, Option<IndexOptions>)>) -> Vec<IndexModel> {
    indices
        .into_iter()
        .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
        .collect()
}

#[async_trait]
impl ConfigDao for MongoConfigDao {
    fn env(&self) -> &str {
        self.connector.env()
    }

    fn config_db_name(&self) -> &str {
        &self.db_name
    }

    async fn ensure_indexes(&self) -> Result<()> {
        for coll in [ConfigCollection::Library, ConfigCollection::Storage] {
            self.coll(coll)
                .create_indexes(create_indexes_for(coll.indices()))
                .await
                .map_err(|e| {
                    RegistryError::Database(format!("Failed to create indexes: {}", e))
                })?;
        }
        self.lib_meta_coll
            .create_indexes(create_indexes_for(
                <LibraryMetadata as IntoIndexes>::into_indices(),
            ))
            .await
            .map_err(|e| RegistryError::Database(format!("Failed to create indexes: {}", e)))?;

        debug!(db = %self.db_name, "Config indexes ensured");
        Ok(())
    }

    async fn get_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
    ) -> Result<Option<Document>> {
        Ok(self
            .coll(coll)
            .find_one(coll.id_filter(id_value))
            .projection(doc! { "_id": 0 })
            .await?)
    }

    async fn get_configs(&self, coll: ConfigCollection, id_value: &str) -> Result<Vec<Document>> {
        let cursor = self
            .coll(coll)
            .find(coll.id_filter(id_value))
            .projection(doc! { "_id": 0 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn add_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
        mut cfg: Document,
    ) -> Result<Document> {
        cfg.insert(coll.id_field(), id_value);
        self.coll(coll).insert_one(cfg.clone()).await?;
        // The driver adds _id to its own copy only
        Ok(cfg)
    }

    async fn upsert_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
        fields: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        Ok(self
            .coll(coll)
            .find_one_and_update(coll.id_filter(id_value), doc! { "$set": fields })
            .upsert(upsert)
            .return_document(ReturnDocument::After)
            .projection(doc! { "_id": 0 })
            .await?)
    }

    async fn delete_config(&self, coll: ConfigCollection, id_value: &str) -> Result<()> {
        self.coll(coll).delete_one(coll.id_filter(id_value)).await?;
        Ok(())
    }

    async fn config_exists(&self, coll: ConfigCollection, id_value: &str) -> Result<bool> {
        let count = self
            .coll(coll)
            .count_documents(coll.id_filter(id_value))
            .limit(1)
            .await?;
        Ok(count != 0)
    }

    async fn list_libraries(&self, name_regex: Option<&str>) -> Result<IdStream> {
        let filter = match name_regex {
            Some(re) => doc! { LIBRARY_KEY: { "$regex": re } },
            None => doc! {},
        };
        self.list_ids(ConfigCollection::Library, filter).await
    }

    async fn list_storages(&self) -> Result<IdStream> {
        self.list_ids(ConfigCollection::Storage, doc! {}).await
    }

    async fn get_lib_metadata(&self, library: &str) -> Result<Option<LibraryMetadata>> {
        Ok(self
            .lib_meta_coll
            .find_one(doc! { LIBRARY_KEY: library })
            .await?)
    }

    async fn get_libs_metadata(&self, filter: &LibraryFilter) -> Result<Vec<LibraryMetadata>> {
        let cursor = self.lib_meta_coll.find(filter.to_query()).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_lib_metadata(&self, library: &str, counters: &LibraryCounters) -> Result<()> {
        self.lib_meta_coll
            .update_one(
                doc! { LIBRARY_KEY: library },
                doc! { "$set": counters.to_set_document(DateTime::now()) },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn delete_libs_metadata(&self, filter: &LibraryFilter) -> Result<()> {
        self.lib_meta_coll.delete_many(filter.to_query()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running MongoDB instance; the DAO
    // contract is exercised against InMemoryConfigDao instead.
    use super::*;

    #[test]
    fn test_index_models_built_from_schema() {
        let models = create_indexes_for(ConfigCollection::Storage.indices());
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].keys, doc! { "storage": 1 });
    }
}
