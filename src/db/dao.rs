//! Config DAO seam
//!
//! Thin typed CRUD over one namespace's three collections. Implemented by
//! [`MongoConfigDao`](crate::db::MongoConfigDao) and
//! [`InMemoryConfigDao`](crate::db::InMemoryConfigDao).
//!
//! Absence is never an error at this layer; callers decide what a missing
//! document means.

use async_trait::async_trait;
use bson::{doc, Document};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use mongodb::options::IndexOptions;

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::{
    LibraryCounters, LibraryDescriptor, LibraryFilter, LibraryMetadata, StorageConfig,
    LIBRARY_COLLECTION, LIBRARY_KEY, STORAGE_COLLECTION, STORAGE_KEY,
};
use crate::types::Result;

/// Lazy sequence of bare identifiers
pub type IdStream = BoxStream<'static, Result<String>>;

/// Descriptor collection addressed by a DAO call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigCollection {
    Library,
    Storage,
}

impl ConfigCollection {
    /// Key field carrying the document id
    pub fn id_field(self) -> &'static str {
        match self {
            ConfigCollection::Library => LIBRARY_KEY,
            ConfigCollection::Storage => STORAGE_KEY,
        }
    }

    pub fn collection_name(self) -> &'static str {
        match self {
            ConfigCollection::Library => LIBRARY_COLLECTION,
            ConfigCollection::Storage => STORAGE_COLLECTION,
        }
    }

    pub fn indices(self) -> Vec<(Document, Option<IndexOptions>)> {
        match self {
            ConfigCollection::Library => LibraryDescriptor::into_indices(),
            ConfigCollection::Storage => StorageConfig::into_indices(),
        }
    }

    /// Query matching the document with the given id
    pub fn id_filter(self, id_value: &str) -> Document {
        doc! { self.id_field(): id_value }
    }
}

/// CRUD over one namespace of the metadata database.
///
/// Every method is a single request/response against the database and relies
/// only on per-document atomicity. No method retries; wrap the DAO in a
/// [`RetryingConfigDao`](crate::db::RetryingConfigDao) for that.
#[async_trait]
pub trait ConfigDao: Send + Sync {
    /// Environment name used in diagnostics
    fn env(&self) -> &str;

    /// Database backing this namespace
    fn config_db_name(&self) -> &str;

    /// Create the unique key indexes on all three collections
    async fn ensure_indexes(&self) -> Result<()>;

    /// Single-document lookup, internal document id excluded
    async fn get_config(&self, coll: ConfigCollection, id_value: &str)
        -> Result<Option<Document>>;

    /// All documents with the given id value
    async fn get_configs(&self, coll: ConfigCollection, id_value: &str) -> Result<Vec<Document>>;

    /// Plain insert with the key field set to `id_value`; returns the stored document
    async fn add_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
        cfg: Document,
    ) -> Result<Document>;

    /// Atomic find-and-`$set`, inserting when `upsert` is true.
    ///
    /// Returns the document after the update, or `None` when nothing matched
    /// and `upsert` was false.
    async fn upsert_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
        fields: Document,
        upsert: bool,
    ) -> Result<Option<Document>>;

    async fn delete_config(&self, coll: ConfigCollection, id_value: &str) -> Result<()>;

    async fn config_exists(&self, coll: ConfigCollection, id_value: &str) -> Result<bool>;

    /// Library names, optionally filtered by a regex on the name
    async fn list_libraries(&self, name_regex: Option<&str>) -> Result<IdStream>;

    /// Storage ids
    async fn list_storages(&self) -> Result<IdStream>;

    async fn get_lib_metadata(&self, library: &str) -> Result<Option<LibraryMetadata>>;

    async fn get_libs_metadata(&self, filter: &LibraryFilter) -> Result<Vec<LibraryMetadata>>;

    /// `$set` the given counters, creating the document if needed
    async fn update_lib_metadata(&self, library: &str, counters: &LibraryCounters) -> Result<()>;

    async fn delete_libs_metadata(&self, filter: &LibraryFilter) -> Result<()>;
}

/// Typed helpers over [`ConfigDao`]
#[async_trait]
pub trait ConfigDaoExt: ConfigDao {
    async fn find_library_config(&self, name: &str) -> Result<Option<LibraryDescriptor>> {
        match self.get_config(ConfigCollection::Library, name).await? {
            Some(d) => Ok(Some(bson::from_document(d)?)),
            None => Ok(None),
        }
    }

    async fn find_storage_config(&self, storage_id: &str) -> Result<Option<StorageConfig>> {
        match self.get_config(ConfigCollection::Storage, storage_id).await? {
            Some(d) => Ok(Some(bson::from_document(d)?)),
            None => Ok(None),
        }
    }

    async fn add_library_descriptor(&self, name: &str, desc: &LibraryDescriptor) -> Result<()> {
        let d = bson::to_document(desc)?;
        self.add_config(ConfigCollection::Library, name, d).await?;
        Ok(())
    }

    async fn add_storage_descriptor(&self, storage_id: &str, cfg: &StorageConfig) -> Result<()> {
        let d = bson::to_document(cfg)?;
        self.add_config(ConfigCollection::Storage, storage_id, d).await?;
        Ok(())
    }

    async fn delete_library_config(&self, name: &str) -> Result<()> {
        self.delete_config(ConfigCollection::Library, name).await
    }

    async fn delete_storage_config(&self, storage_id: &str) -> Result<()> {
        self.delete_config(ConfigCollection::Storage, storage_id).await
    }

    async fn library_exists(&self, name: &str) -> Result<bool> {
        self.config_exists(ConfigCollection::Library, name).await
    }

    async fn storage_exists(&self, storage_id: &str) -> Result<bool> {
        self.config_exists(ConfigCollection::Storage, storage_id).await
    }

    /// Drain [`ConfigDao::list_libraries`] into a vector
    async fn library_names(&self, name_regex: Option<&str>) -> Result<Vec<String>> {
        self.list_libraries(name_regex).await?.try_collect().await
    }

    /// Drain [`ConfigDao::list_storages`] into a vector
    async fn storage_ids(&self) -> Result<Vec<String>> {
        self.list_storages().await?.try_collect().await
    }
}

impl<T: ConfigDao + ?Sized> ConfigDaoExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_keys() {
        assert_eq!(ConfigCollection::Library.id_field(), "library");
        assert_eq!(ConfigCollection::Storage.id_field(), "storage");
        assert_eq!(
            ConfigCollection::Storage.id_filter("s1"),
            doc! { "storage": "s1" }
        );
        assert_eq!(ConfigCollection::Library.collection_name(), "library_config");
    }

    #[test]
    fn test_collections_have_unique_key_index() {
        for coll in [ConfigCollection::Library, ConfigCollection::Storage] {
            let indices = coll.indices();
            assert_eq!(indices.len(), 1);
            let (keys, opts) = &indices[0];
            assert!(keys.contains_key(coll.id_field()));
            assert_eq!(opts.as_ref().and_then(|o| o.unique), Some(true));
        }
    }
}
