//! In-memory config DAO
//!
//! Same per-document semantics as the MongoDB DAO (unique key per collection,
//! find-and-modify upsert, regex library filter) without a server. Used by
//! tests and for dry experimentation.

use async_trait::async_trait;
use bson::{DateTime, Document};
use futures::StreamExt;
use regex::Regex;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::dao::{ConfigCollection, ConfigDao, IdStream};
use crate::db::schemas::{LibraryCounters, LibraryFilter, LibraryMetadata};
use crate::types::{RegistryError, Result};

#[derive(Default)]
struct Collections {
    libraries: BTreeMap<String, Document>,
    storages: BTreeMap<String, Document>,
    lib_metadata: BTreeMap<String, LibraryMetadata>,
}

impl Collections {
    fn docs(&self, coll: ConfigCollection) -> &BTreeMap<String, Document> {
        match coll {
            ConfigCollection::Library => &self.libraries,
            ConfigCollection::Storage => &self.storages,
        }
    }

    fn docs_mut(&mut self, coll: ConfigCollection) -> &mut BTreeMap<String, Document> {
        match coll {
            ConfigCollection::Library => &mut self.libraries,
            ConfigCollection::Storage => &mut self.storages,
        }
    }
}

/// [`ConfigDao`] held entirely in memory
///
/// Clones share the same collections, like handles onto one database.
#[derive(Clone)]
pub struct InMemoryConfigDao {
    env: String,
    db_name: String,
    collections: Arc<RwLock<Collections>>,
}

impl InMemoryConfigDao {
    pub fn new(env: &str, db_name: &str) -> Self {
        Self {
            env: env.to_string(),
            db_name: db_name.to_string(),
            collections: Arc::new(RwLock::new(Collections::default())),
        }
    }

    fn ids_stream(ids: Vec<String>) -> IdStream {
        futures::stream::iter(ids.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl ConfigDao for InMemoryConfigDao {
    fn env(&self) -> &str {
        &self.env
    }

    fn config_db_name(&self) -> &str {
        &self.db_name
    }

    async fn ensure_indexes(&self) -> Result<()> {
        // Map keys already enforce uniqueness
        Ok(())
    }

    async fn get_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
    ) -> Result<Option<Document>> {
        Ok(self.collections.read().await.docs(coll).get(id_value).cloned())
    }

    async fn get_configs(&self, coll: ConfigCollection, id_value: &str) -> Result<Vec<Document>> {
        Ok(self
            .get_config(coll, id_value)
            .await?
            .into_iter()
            .collect())
    }

    async fn add_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
        mut cfg: Document,
    ) -> Result<Document> {
        cfg.insert(coll.id_field(), id_value);

        let mut collections = self.collections.write().await;
        let docs = collections.docs_mut(coll);
        if docs.contains_key(id_value) {
            return Err(RegistryError::Database(format!(
                "E11000 duplicate key error collection: {}.{} dup key: {{ {}: \"{}\" }}",
                self.db_name,
                coll.collection_name(),
                coll.id_field(),
                id_value
            )));
        }
        docs.insert(id_value.to_string(), cfg.clone());
        Ok(cfg)
    }

    async fn upsert_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
        fields: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        let mut collections = self.collections.write().await;
        let docs = collections.docs_mut(coll);

        let current = match docs.entry(id_value.to_string()) {
            Entry::Occupied(existing) => existing.into_mut(),
            Entry::Vacant(slot) if upsert => {
                let mut fresh = Document::new();
                fresh.insert(coll.id_field(), id_value);
                slot.insert(fresh)
            }
            Entry::Vacant(_) => return Ok(None),
        };

        for (key, value) in fields {
            current.insert(key, value);
        }
        Ok(Some(current.clone()))
    }

    async fn delete_config(&self, coll: ConfigCollection, id_value: &str) -> Result<()> {
        self.collections.write().await.docs_mut(coll).remove(id_value);
        Ok(())
    }

    async fn config_exists(&self, coll: ConfigCollection, id_value: &str) -> Result<bool> {
        Ok(self.collections.read().await.docs(coll).contains_key(id_value))
    }

    async fn list_libraries(&self, name_regex: Option<&str>) -> Result<IdStream> {
        let re = name_regex.map(Regex::new).transpose()?;
        let names: Vec<String> = self
            .collections
            .read()
            .await
            .libraries
            .keys()
            .filter(|name| re.as_ref().map_or(true, |re| re.is_match(name)))
            .cloned()
            .collect();
        Ok(Self::ids_stream(names))
    }

    async fn list_storages(&self) -> Result<IdStream> {
        let ids: Vec<String> = self
            .collections
            .read()
            .await
            .storages
            .keys()
            .cloned()
            .collect();
        Ok(Self::ids_stream(ids))
    }

    async fn get_lib_metadata(&self, library: &str) -> Result<Option<LibraryMetadata>> {
        Ok(self
            .collections
            .read()
            .await
            .lib_metadata
            .get(library)
            .cloned())
    }

    async fn get_libs_metadata(&self, filter: &LibraryFilter) -> Result<Vec<LibraryMetadata>> {
        Ok(self
            .collections
            .read()
            .await
            .lib_metadata
            .values()
            .filter(|m| filter.matches(&m.library))
            .cloned()
            .collect())
    }

    async fn update_lib_metadata(&self, library: &str, counters: &LibraryCounters) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .lib_metadata
            .entry(library.to_string())
            .or_insert_with(|| LibraryMetadata {
                library: library.to_string(),
                ..Default::default()
            });
        if counters.size_bytes.is_some() {
            entry.size_bytes = counters.size_bytes;
        }
        if counters.item_count.is_some() {
            entry.item_count = counters.item_count;
        }
        entry.updated_at = Some(DateTime::now());
        Ok(())
    }

    async fn delete_libs_metadata(&self, filter: &LibraryFilter) -> Result<()> {
        self.collections
            .write()
            .await
            .lib_metadata
            .retain(|name, _| !filter.matches(name));
        Ok(())
    }
}
