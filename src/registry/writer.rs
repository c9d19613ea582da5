//! Ordered descriptor mutations
//!
//! Storages are shared by many libraries but a library needs its storages to
//! exist, so every multi-step write puts storages first and the library last.
//! No step is transactional; a crash between steps leaves at most an
//! unreferenced storage, which the orphan collector reclaims.
//!
//! A library whose credentials store names another namespace keeps its
//! storages in that namespace. Writes of those storages go through the
//! writer's [`Federation`] and are refused when the namespace is not tracked.

use bson::Document;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::dao::{ConfigCollection, ConfigDao, ConfigDaoExt};
use crate::db::schemas::{
    CredentialsStore, LibraryConfig, LibraryDescriptor, LibraryFilter, StorageConfig,
};
use crate::db::Federation;
use crate::types::{ConfigKind, RegistryError, Result};

/// Write side of the registry over one namespace
#[derive(Clone)]
pub struct ConfigWriter {
    dao: Arc<dyn ConfigDao>,
    federation: Option<Federation>,
}

impl ConfigWriter {
    pub fn new(dao: Arc<dyn ConfigDao>) -> Self {
        Self {
            dao,
            federation: None,
        }
    }

    /// Route storages of namespace-referencing libraries through `federation`
    pub fn with_federation(mut self, federation: Federation) -> Self {
        self.federation = Some(federation);
        self
    }

    pub fn env(&self) -> &str {
        self.dao.env()
    }

    pub fn dao(&self) -> &Arc<dyn ConfigDao> {
        &self.dao
    }

    /// DAO holding the storages of `lib_desc`, if this writer can reach it
    fn tracked_storage_dao(&self, lib_desc: &LibraryDescriptor) -> Option<Arc<dyn ConfigDao>> {
        match &lib_desc.credentials_store {
            CredentialsStore::None => Some(self.dao.clone()),
            CredentialsStore::Namespace { namespace } => self
                .federation
                .as_ref()
                .and_then(|f| f.get(namespace))
                .cloned(),
        }
    }

    /// Writer over the namespace holding the storages of `lib_desc`
    fn storage_writer(&self, lib_desc: &LibraryDescriptor) -> Result<ConfigWriter> {
        self.tracked_storage_dao(lib_desc)
            .map(ConfigWriter::new)
            .ok_or_else(|| {
                RegistryError::Config(format!(
                    "library {} keeps its storages in namespace {}, which this writer does not track",
                    lib_desc.name,
                    lib_desc.credentials_store.namespace().unwrap_or_default()
                ))
            })
    }

    fn context(&self, kind: ConfigKind, id: &str) -> String {
        format!("{} {} in {}", kind, id, self.dao.config_db_name())
    }

    fn already_exists(&self, kind: ConfigKind, id: &str) -> RegistryError {
        RegistryError::AlreadyExists {
            kind,
            id: id.to_string(),
            env: self.env().to_string(),
        }
    }

    fn not_found(&self, kind: ConfigKind, id: &str) -> RegistryError {
        RegistryError::NotFound {
            kind,
            id: id.to_string(),
            env: self.env().to_string(),
        }
    }

    /// Create the unique key indexes of every collection
    pub async fn ensure_config_collections(&self) -> Result<()> {
        self.dao
            .ensure_indexes()
            .await
            .map_err(|e| e.in_context(self.dao.config_db_name()))
    }

    /// Insert one storage descriptor.
    ///
    /// An existing storage is kept as is when `use_existing_storage` is set,
    /// otherwise the call fails with [`RegistryError::AlreadyExists`].
    pub async fn add_storage_config(
        &self,
        storage_id: &str,
        storage: &StorageConfig,
        use_existing_storage: bool,
    ) -> Result<()> {
        let ctx = || self.context(ConfigKind::Storage, storage_id);

        if self
            .dao
            .storage_exists(storage_id)
            .await
            .map_err(|e| e.in_context(ctx()))?
        {
            if use_existing_storage {
                debug!(storage_id = %storage_id, "Reusing existing storage");
                return Ok(());
            }
            return Err(self.already_exists(ConfigKind::Storage, storage_id));
        }

        match self.dao.add_storage_descriptor(storage_id, storage).await {
            Ok(()) => {
                info!(storage_id = %storage_id, kind = %storage.kind(), "Added storage config");
                Ok(())
            }
            // Lost a race with a concurrent writer of the same shared storage
            Err(e) if is_duplicate_key(&e) => {
                if use_existing_storage {
                    Ok(())
                } else {
                    Err(self.already_exists(ConfigKind::Storage, storage_id))
                }
            }
            Err(e) => Err(e.in_context(ctx())),
        }
    }

    /// Insert every storage carried by `config` into the namespace that holds
    /// the library's storages
    pub async fn add_storage_config_from_cfg(
        &self,
        config: &LibraryConfig,
        use_existing_storage: bool,
    ) -> Result<()> {
        let writer = self.storage_writer(&config.lib_desc)?;
        for (sid, storage) in &config.storage_by_id {
            writer
                .add_storage_config(sid, storage, use_existing_storage)
                .await?;
        }
        Ok(())
    }

    /// Insert a library descriptor under `lib_name`.
    ///
    /// The descriptor must name at least one storage. Every storage must
    /// already exist in the namespace holding it; storages in a namespace this
    /// writer does not track are not checked.
    pub async fn add_library_config(&self, lib_name: &str, lib_desc: &LibraryDescriptor) -> Result<()> {
        let ctx = || self.context(ConfigKind::Library, lib_name);

        if lib_desc.storage_ids.is_empty() {
            return Err(RegistryError::Config(format!(
                "library {} must reference at least one storage",
                lib_name
            )));
        }

        if self
            .dao
            .library_exists(lib_name)
            .await
            .map_err(|e| e.in_context(ctx()))?
        {
            return Err(self.already_exists(ConfigKind::Library, lib_name));
        }

        if let Some(storage_dao) = self.tracked_storage_dao(lib_desc) {
            for sid in &lib_desc.storage_ids {
                if !storage_dao
                    .storage_exists(sid)
                    .await
                    .map_err(|e| e.in_context(format!("storage {} in {}", sid, storage_dao.config_db_name())))?
                {
                    return Err(RegistryError::ConfigurationIntegrity {
                        id: sid.clone(),
                        namespace: format!("{}/{}", storage_dao.env(), storage_dao.config_db_name()),
                    });
                }
            }
        }

        let mut desc = lib_desc.clone();
        desc.name = lib_name.to_string();
        match self.dao.add_library_descriptor(lib_name, &desc).await {
            Ok(()) => {
                info!(library = %lib_name, storages = ?desc.storage_ids, "Added library config");
                Ok(())
            }
            Err(e) if is_duplicate_key(&e) => Err(self.already_exists(ConfigKind::Library, lib_name)),
            Err(e) => Err(e.in_context(ctx())),
        }
    }

    /// Write storages, then the library.
    ///
    /// A reader can never observe the library before its storages exist. A
    /// library that already exists, or whose storage namespace is not
    /// tracked, is rejected before any storage is written.
    pub async fn add_library_and_storage_config(
        &self,
        lib_name: &str,
        config: &LibraryConfig,
        use_existing_storage: bool,
    ) -> Result<()> {
        if self
            .dao
            .library_exists(lib_name)
            .await
            .map_err(|e| e.in_context(self.context(ConfigKind::Library, lib_name)))?
        {
            return Err(self.already_exists(ConfigKind::Library, lib_name));
        }

        self.add_storage_config_from_cfg(config, use_existing_storage)
            .await?;
        self.add_library_config(lib_name, &config.lib_desc).await
    }

    /// Delete the primary storages of `config` by id, whoever else uses them
    pub async fn delete_storage_config(&self, config: &LibraryConfig) -> Result<()> {
        let writer = self.storage_writer(&config.lib_desc)?;
        for sid in &config.lib_desc.storage_ids {
            writer
                .dao
                .delete_storage_config(sid)
                .await
                .map_err(|e| e.in_context(writer.context(ConfigKind::Storage, sid)))?;
            info!(storage_id = %sid, library = %config.name(), "Deleted storage config");
        }
        Ok(())
    }

    /// Delete the library descriptor only; absent libraries are not an error
    pub async fn delete_library_config(&self, lib_name: &str) -> Result<()> {
        self.dao
            .delete_library_config(lib_name)
            .await
            .map_err(|e| e.in_context(self.context(ConfigKind::Library, lib_name)))?;
        info!(library = %lib_name, "Deleted library config");
        Ok(())
    }

    /// Delete a library and its metadata document.
    ///
    /// Storages are never touched; once unreferenced they are left for the
    /// orphan collector.
    pub async fn delete_library(&self, lib_name: &str) -> Result<()> {
        let ctx = || self.context(ConfigKind::Library, lib_name);

        if !self
            .dao
            .library_exists(lib_name)
            .await
            .map_err(|e| e.in_context(ctx()))?
        {
            return Err(self.not_found(ConfigKind::Library, lib_name));
        }

        self.delete_library_config(lib_name).await?;
        self.dao
            .delete_libs_metadata(&LibraryFilter::One(lib_name.to_string()))
            .await
            .map_err(|e| e.in_context(ctx()))?;
        Ok(())
    }

    /// `$set` the given top-level paths of `lib_desc` on the stored library.
    ///
    /// Never inserts; an absent library is [`RegistryError::NotFound`]. The
    /// `name` path is refused since it must stay equal to the lookup key.
    pub async fn update_library_config(
        &self,
        lib_name: &str,
        lib_desc: &LibraryDescriptor,
        paths: &[&str],
    ) -> Result<LibraryDescriptor> {
        if paths.contains(&"name") {
            return Err(RegistryError::Config(format!(
                "library {} cannot be renamed in place; delete and add it under the new name",
                lib_name
            )));
        }

        if let Some(unknown) = paths
            .iter()
            .find(|p| !LibraryDescriptor::FIELDS.contains(*p))
        {
            return Err(RegistryError::Config(format!(
                "unknown library descriptor field: {}",
                unknown
            )));
        }

        let full = bson::to_document(lib_desc)?;
        let mut fields = Document::new();
        for path in paths {
            if let Some(value) = full.get(*path) {
                fields.insert(*path, value.clone());
            }
        }

        let updated = self
            .dao
            .upsert_config(ConfigCollection::Library, lib_name, fields, false)
            .await
            .map_err(|e| e.in_context(self.context(ConfigKind::Library, lib_name)))?
            .ok_or_else(|| self.not_found(ConfigKind::Library, lib_name))?;

        debug!(library = %lib_name, paths = ?paths, "Updated library config");
        Ok(bson::from_document(updated)?)
    }

    /// Replace a library descriptor (delete then add, not atomic)
    pub async fn modify_library_config(&self, lib_name: &str, config: &LibraryConfig) -> Result<()> {
        self.delete_library_config(lib_name).await?;
        self.add_library_config(&config.lib_desc.name, &config.lib_desc)
            .await
    }

    /// Replace the storages of `config` (delete then add, not atomic)
    pub async fn modify_storage_config(&self, config: &LibraryConfig) -> Result<()> {
        self.delete_storage_config(config).await?;
        self.add_storage_config_from_cfg(config, false).await
    }

    /// Delete a library and then its storages.
    ///
    /// Only safe for storages the library owns exclusively; shared storages
    /// must be left to the orphan collector.
    pub async fn delete_config(&self, lib_name: &str, config: &LibraryConfig) -> Result<()> {
        // Refuse before the library goes if its storages cannot be reached
        self.storage_writer(&config.lib_desc)?;
        self.delete_library_config(lib_name).await?;

        let unlisted: BTreeSet<&str> = config
            .lib_desc
            .storage_ids
            .iter()
            .map(String::as_str)
            .filter(|sid| !config.storage_by_id.contains_key(*sid))
            .collect();
        if !unlisted.is_empty() {
            warn!(
                library = %lib_name,
                storages = ?unlisted,
                "Deleting storages that were not part of the supplied config"
            );
        }
        self.delete_storage_config(config).await
    }
}

fn is_duplicate_key(err: &RegistryError) -> bool {
    matches!(err, RegistryError::Database(msg) if msg.contains("E11000"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{LibraryCounters, LmdbConfig};
    use crate::db::InMemoryConfigDao;

    fn writer() -> ConfigWriter {
        ConfigWriter::new(Arc::new(InMemoryConfigDao::new("test", "default_native_config")))
    }

    fn lib_config(name: &str, sids: &[&str]) -> LibraryConfig {
        let mut cfg = LibraryConfig::new(LibraryDescriptor::new(
            name,
            sids.iter().map(|s| s.to_string()).collect(),
        ));
        for sid in sids {
            cfg.storage_by_id.insert(sid.to_string(), StorageConfig::Memory);
        }
        cfg
    }

    #[tokio::test]
    async fn test_existing_storage_reused_or_rejected() {
        let w = writer();
        w.add_storage_config("s1", &StorageConfig::Memory, false)
            .await
            .unwrap();
        w.add_storage_config("s1", &StorageConfig::Memory, true)
            .await
            .unwrap();

        let err = w
            .add_storage_config("s1", &StorageConfig::Memory, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::AlreadyExists {
                kind: ConfigKind::Storage,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_library_requires_storage_ids() {
        let err = writer()
            .add_library_config("a", &LibraryDescriptor::new("a", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }

    #[tokio::test]
    async fn test_library_with_dangling_storage_rejected() {
        let w = writer();
        let err = w
            .add_library_config("a", &LibraryDescriptor::new("a", vec!["nope".into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ConfigurationIntegrity { .. }));
        assert!(!w.dao().library_exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_library_rejected_before_storage_writes() {
        let w = writer();
        w.add_library_and_storage_config("a", &lib_config("a", &["s1"]), true)
            .await
            .unwrap();

        let err = w
            .add_library_and_storage_config("a", &lib_config("a", &["s2"]), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::AlreadyExists {
                kind: ConfigKind::Library,
                ..
            }
        ));
        assert!(!w.dao().storage_exists("s2").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_library_keeps_storages_and_drops_metadata() {
        let w = writer();
        w.add_library_and_storage_config("a", &lib_config("a", &["s1"]), true)
            .await
            .unwrap();
        w.dao()
            .update_lib_metadata(
                "a",
                &LibraryCounters {
                    size_bytes: Some(10),
                    item_count: Some(1),
                },
            )
            .await
            .unwrap();

        w.delete_library("a").await.unwrap();
        assert!(!w.dao().library_exists("a").await.unwrap());
        assert!(w.dao().storage_exists("s1").await.unwrap());
        assert!(w.dao().get_lib_metadata("a").await.unwrap().is_none());

        let err = w.delete_library("a").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_sets_only_masked_fields() {
        let w = writer();
        w.add_library_and_storage_config("a", &lib_config("a", &["s1"]), true)
            .await
            .unwrap();

        let mut changed = LibraryDescriptor::new("a", vec!["other".into()])
            .with_description("nightly prices");
        changed.prefer_native_on_collision = true;

        let updated = w
            .update_library_config("a", &changed, &["description"])
            .await
            .unwrap();
        assert_eq!(updated.description, "nightly prices");
        assert_eq!(updated.storage_ids, vec!["s1".to_string()]);
        assert!(!updated.prefer_native_on_collision);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_path_and_missing_library() {
        let w = writer();
        let desc = LibraryDescriptor::new("a", vec!["s1".into()]);

        let err = w
            .update_library_config("a", &desc, &["owner"])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));

        let err = w
            .update_library_config("a", &desc, &["description"])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_refuses_to_rename() {
        let w = writer();
        w.add_library_and_storage_config("a", &lib_config("a", &["s1"]), true)
            .await
            .unwrap();

        let renamed = LibraryDescriptor::new("b", vec!["s1".into()]);
        let err = w
            .update_library_config("a", &renamed, &["name", "description"])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));

        let stored = w.dao().find_library_config("a").await.unwrap().unwrap();
        assert_eq!(stored.name, "a");
        assert!(!w.dao().library_exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaced_storages_go_to_referenced_namespace() {
        let default: Arc<dyn ConfigDao> =
            Arc::new(InMemoryConfigDao::new("test", "default_native_config"));
        let ns2: Arc<dyn ConfigDao> = Arc::new(InMemoryConfigDao::new("test", "ns2_native_config"));
        let federation = Federation::new("default", default.clone())
            .with_namespace("ns2", ns2.clone())
            .unwrap();
        let w = ConfigWriter::new(default.clone()).with_federation(federation);

        let mut cfg = lib_config("c", &["s1"]);
        cfg.lib_desc = cfg.lib_desc.with_credentials_namespace("ns2");
        w.add_library_and_storage_config("c", &cfg, false)
            .await
            .unwrap();

        assert!(ns2.storage_exists("s1").await.unwrap());
        assert!(!default.storage_exists("s1").await.unwrap());
        assert!(default.library_exists("c").await.unwrap());

        w.delete_config("c", &cfg).await.unwrap();
        assert!(!ns2.storage_exists("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaced_library_refused_without_federation() {
        let w = writer();
        let mut cfg = lib_config("c", &["s1"]);
        cfg.lib_desc = cfg.lib_desc.with_credentials_namespace("ns2");

        let err = w
            .add_library_and_storage_config("c", &cfg, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
        assert!(!w.dao().storage_exists("s1").await.unwrap());
        assert!(!w.dao().library_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_modify_storage_replaces_descriptor() {
        let w = writer();
        w.add_library_and_storage_config("a", &lib_config("a", &["s1"]), true)
            .await
            .unwrap();

        let mut cfg = lib_config("a", &["s1"]);
        let lmdb = StorageConfig::Lmdb(LmdbConfig {
            path: "/data/a".into(),
        });
        cfg.storage_by_id.insert("s1".into(), lmdb.clone());
        w.modify_storage_config(&cfg).await.unwrap();

        assert_eq!(w.dao().find_storage_config("s1").await.unwrap(), Some(lmdb));
    }

    #[tokio::test]
    async fn test_delete_config_removes_library_and_storages() {
        let w = writer();
        let cfg = lib_config("a", &["s1", "s2"]);
        w.add_library_and_storage_config("a", &cfg, true)
            .await
            .unwrap();

        w.delete_config("a", &cfg).await.unwrap();
        assert!(!w.dao().library_exists("a").await.unwrap());
        assert!(w.dao().storage_ids().await.unwrap().is_empty());
    }
}
