//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bson::Document;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use library_registry::auth::OpenMode;
use library_registry::db::schemas::{
    LibraryConfig, LibraryCounters, LibraryDescriptor, LibraryFilter, LibraryMetadata,
    StorageConfig,
};
use library_registry::db::{ConfigCollection, ConfigDao, Federation, IdStream, InMemoryConfigDao};
use library_registry::engine::{StorageEngine, StoreHandle};
use library_registry::registry::{ConfigRegistry, ConfigWriter};
use library_registry::{RegistryError, Result};

pub const TEST_ENV: &str = "research";

/// In-memory DAO for `namespace`
pub fn namespace_dao(namespace: &str) -> Arc<InMemoryConfigDao> {
    Arc::new(InMemoryConfigDao::new(
        TEST_ENV,
        &format!("{}_native_config", namespace),
    ))
}

/// Library config whose storages are all in-memory backends
pub fn lib_config(name: &str, storage_ids: &[&str]) -> LibraryConfig {
    let mut cfg = LibraryConfig::new(LibraryDescriptor::new(
        name,
        storage_ids.iter().map(|s| s.to_string()).collect(),
    ));
    for sid in storage_ids {
        cfg.storage_by_id
            .insert(sid.to_string(), StorageConfig::Memory);
    }
    cfg
}

/// Registry and writer over one namespace
pub struct Namespace {
    pub dao: Arc<InMemoryConfigDao>,
    pub registry: ConfigRegistry,
    pub writer: ConfigWriter,
}

impl Namespace {
    pub fn new(namespace: &str) -> Self {
        let dao = namespace_dao(namespace);
        Self {
            registry: ConfigRegistry::new(dao.clone()),
            writer: ConfigWriter::new(dao.clone()),
            dao,
        }
    }
}

/// Federation over the given namespaces; the first is the default
pub fn federation(namespaces: &[(&str, &Namespace)]) -> Federation {
    let (default_ns, default) = namespaces[0];
    let mut federation = Federation::new(default_ns, default.dao.clone());
    for (ns, namespace) in &namespaces[1..] {
        federation.insert(ns, namespace.dao.clone()).unwrap();
    }
    federation
}

/// Engine that records cleared storages and fails on request
#[derive(Default)]
pub struct RecordingEngine {
    cleared: Mutex<Vec<String>>,
    failing: BTreeSet<String>,
}

impl RecordingEngine {
    pub fn failing_on(storage_ids: &[&str]) -> Self {
        Self {
            cleared: Mutex::new(Vec::new()),
            failing: storage_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn cleared(&self) -> Vec<String> {
        let mut cleared = self.cleared.lock().unwrap().clone();
        cleared.sort();
        cleared
    }
}

#[async_trait]
impl StorageEngine for RecordingEngine {
    async fn construct_store(
        &self,
        config: LibraryConfig,
        env: &str,
        open_mode: OpenMode,
    ) -> Result<StoreHandle> {
        Ok(StoreHandle {
            config,
            env: env.to_string(),
            open_mode,
        })
    }

    async fn clear_all_data(&self, handle: &StoreHandle) -> Result<()> {
        assert_eq!(handle.open_mode, OpenMode::Delete);
        for sid in handle.config.storage_by_id.keys() {
            if self.failing.contains(sid) {
                return Err(RegistryError::Engine(format!("access denied on {}", sid)));
            }
        }
        self.cleared
            .lock()
            .unwrap()
            .extend(handle.config.storage_by_id.keys().cloned());
        Ok(())
    }
}

/// DAO wrapper counting storage descriptor reads
pub struct CountingDao {
    pub inner: Arc<InMemoryConfigDao>,
    pub storage_reads: AtomicUsize,
}

impl CountingDao {
    pub fn new(inner: Arc<InMemoryConfigDao>) -> Self {
        Self {
            inner,
            storage_reads: AtomicUsize::new(0),
        }
    }

    pub fn storage_reads(&self) -> usize {
        self.storage_reads.load(Ordering::SeqCst)
    }

    fn count(&self, coll: ConfigCollection) {
        if coll == ConfigCollection::Storage {
            self.storage_reads.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ConfigDao for CountingDao {
    fn env(&self) -> &str {
        self.inner.env()
    }
    fn config_db_name(&self) -> &str {
        self.inner.config_db_name()
    }
    async fn ensure_indexes(&self) -> Result<()> {
        self.inner.ensure_indexes().await
    }
    async fn get_config(&self, coll: ConfigCollection, id: &str) -> Result<Option<Document>> {
        self.count(coll);
        self.inner.get_config(coll, id).await
    }
    async fn get_configs(&self, coll: ConfigCollection, id: &str) -> Result<Vec<Document>> {
        self.count(coll);
        self.inner.get_configs(coll, id).await
    }
    async fn add_config(&self, coll: ConfigCollection, id: &str, cfg: Document) -> Result<Document> {
        self.inner.add_config(coll, id, cfg).await
    }
    async fn upsert_config(
        &self,
        coll: ConfigCollection,
        id: &str,
        fields: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        self.inner.upsert_config(coll, id, fields, upsert).await
    }
    async fn delete_config(&self, coll: ConfigCollection, id: &str) -> Result<()> {
        self.inner.delete_config(coll, id).await
    }
    async fn config_exists(&self, coll: ConfigCollection, id: &str) -> Result<bool> {
        self.count(coll);
        self.inner.config_exists(coll, id).await
    }
    async fn list_libraries(&self, re: Option<&str>) -> Result<IdStream> {
        self.inner.list_libraries(re).await
    }
    async fn list_storages(&self) -> Result<IdStream> {
        self.inner.list_storages().await
    }
    async fn get_lib_metadata(&self, library: &str) -> Result<Option<LibraryMetadata>> {
        self.inner.get_lib_metadata(library).await
    }
    async fn get_libs_metadata(&self, f: &LibraryFilter) -> Result<Vec<LibraryMetadata>> {
        self.inner.get_libs_metadata(f).await
    }
    async fn update_lib_metadata(&self, l: &str, c: &LibraryCounters) -> Result<()> {
        self.inner.update_lib_metadata(l, c).await
    }
    async fn delete_libs_metadata(&self, f: &LibraryFilter) -> Result<()> {
        self.inner.delete_libs_metadata(f).await
    }
}
