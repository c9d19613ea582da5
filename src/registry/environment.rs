//! In-memory environment builder
//!
//! Assemble library and storage descriptors before writing them to a
//! namespace with [`EnvironmentConfig::write_to`].

use std::collections::BTreeMap;
use uuid::Uuid;

use super::writer::ConfigWriter;
use crate::db::schemas::{LibraryConfig, LibraryDescriptor, S3Config, StorageConfig};
use crate::types::{ConfigKind, RegistryError, Result};

/// Storage id for a new storage of `lib_name`
pub fn generate_storage_id(lib_name: &str) -> String {
    format!("{}_{}", lib_name, Uuid::new_v4().simple())
}

/// Optional descriptor fields for a new library
#[derive(Debug, Clone, Default)]
pub struct LibraryOptions {
    pub description: Option<String>,
    pub credentials_namespace: Option<String>,
    pub prefer_native_on_collision: bool,
}

/// S3 storage settings
#[derive(Debug, Clone)]
pub struct S3Options {
    pub endpoint: String,
    pub bucket_name: String,
    pub credential_name: String,
    pub credential_key: String,
    /// Use the library name as key prefix inside the bucket
    pub with_prefix: bool,
    pub https: bool,
    pub region: Option<String>,
    pub use_virtual_addressing: bool,
    /// Attach as a backup storage instead of a primary one
    pub is_backup: bool,
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket_name: String::new(),
            credential_name: String::new(),
            credential_key: String::new(),
            with_prefix: true,
            https: false,
            region: None,
            use_virtual_addressing: false,
            is_backup: false,
        }
    }
}

impl S3Options {
    fn to_config(&self, lib_name: &str) -> StorageConfig {
        StorageConfig::S3(S3Config {
            endpoint: self.endpoint.clone(),
            bucket_name: self.bucket_name.clone(),
            credential_name: self.credential_name.clone(),
            credential_key: self.credential_key.clone(),
            prefix: if self.with_prefix {
                lib_name.to_string()
            } else {
                String::new()
            },
            https: self.https,
            region: self.region.clone(),
            use_virtual_addressing: self.use_virtual_addressing,
        })
    }
}

/// Libraries and storages of one environment, not yet persisted
#[derive(Debug, Clone, Default)]
pub struct EnvironmentConfig {
    pub env: String,
    pub lib_by_path: BTreeMap<String, LibraryDescriptor>,
    pub storage_by_id: BTreeMap<String, StorageConfig>,
}

impl EnvironmentConfig {
    pub fn new(env: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            ..Default::default()
        }
    }

    fn library_mut(&mut self, lib_name: &str) -> Result<&mut LibraryDescriptor> {
        let env = self.env.clone();
        self.lib_by_path
            .get_mut(lib_name)
            .ok_or(RegistryError::NotFound {
                kind: ConfigKind::Library,
                id: lib_name.to_string(),
                env,
            })
    }

    /// Add a library on a new storage; returns the storage id
    pub fn add_library(
        &mut self,
        lib_name: &str,
        storage: StorageConfig,
        options: LibraryOptions,
    ) -> Result<String> {
        if self.lib_by_path.contains_key(lib_name) {
            return Err(RegistryError::AlreadyExists {
                kind: ConfigKind::Library,
                id: lib_name.to_string(),
                env: self.env.clone(),
            });
        }

        let sid = generate_storage_id(lib_name);
        let mut desc = LibraryDescriptor::new(lib_name, vec![sid.clone()]);
        if let Some(description) = options.description {
            desc.description = description;
        }
        if let Some(namespace) = options.credentials_namespace {
            desc = desc.with_credentials_namespace(namespace);
        }
        desc.prefer_native_on_collision = options.prefer_native_on_collision;

        self.storage_by_id.insert(sid.clone(), storage);
        self.lib_by_path.insert(lib_name.to_string(), desc);
        Ok(sid)
    }

    /// Add another primary storage to an existing library
    pub fn add_storage_to_library(&mut self, lib_name: &str, storage: StorageConfig) -> Result<String> {
        let sid = generate_storage_id(lib_name);
        self.library_mut(lib_name)?.storage_ids.push(sid.clone());
        self.storage_by_id.insert(sid.clone(), storage);
        Ok(sid)
    }

    pub fn add_backup_storage_to_library(
        &mut self,
        lib_name: &str,
        storage: StorageConfig,
    ) -> Result<String> {
        let sid = generate_storage_id(lib_name);
        self.library_mut(lib_name)?
            .backup_storage_ids
            .push(sid.clone());
        self.storage_by_id.insert(sid.clone(), storage);
        Ok(sid)
    }

    /// Attach an S3 storage, creating the library when it does not exist yet
    pub fn add_s3_storage(&mut self, lib_name: &str, options: &S3Options) -> Result<String> {
        let storage = options.to_config(lib_name);
        if !self.lib_by_path.contains_key(lib_name) {
            if options.is_backup {
                return Err(RegistryError::Config(format!(
                    "backup storage for unknown library {}",
                    lib_name
                )));
            }
            return self.add_library(lib_name, storage, LibraryOptions::default());
        }

        if options.is_backup {
            self.add_backup_storage_to_library(lib_name, storage)
        } else {
            self.add_storage_to_library(lib_name, storage)
        }
    }

    /// Library descriptor joined with every storage it references
    pub fn library_config(&self, lib_name: &str) -> Result<LibraryConfig> {
        let desc = self
            .lib_by_path
            .get(lib_name)
            .ok_or_else(|| RegistryError::NotFound {
                kind: ConfigKind::Library,
                id: lib_name.to_string(),
                env: self.env.clone(),
            })?;

        let mut cfg = LibraryConfig::new(desc.clone());
        for sid in desc.referenced_storage_ids() {
            let storage = self.storage_by_id.get(sid).ok_or_else(|| {
                RegistryError::ConfigurationIntegrity {
                    id: sid.clone(),
                    namespace: self.env.clone(),
                }
            })?;
            cfg.storage_by_id.insert(sid.clone(), storage.clone());
        }
        Ok(cfg)
    }

    pub fn library_names(&self) -> impl Iterator<Item = &str> {
        self.lib_by_path.keys().map(String::as_str)
    }

    /// Persist every library with its storages, storages first.
    ///
    /// Libraries with a credentials namespace need a writer built with
    /// [`ConfigWriter::with_federation`] covering that namespace.
    pub async fn write_to(&self, writer: &ConfigWriter, use_existing_storage: bool) -> Result<()> {
        for lib_name in self.lib_by_path.keys() {
            let cfg = self.library_config(lib_name)?;
            writer
                .add_library_and_storage_config(lib_name, &cfg, use_existing_storage)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConfigDaoExt, InMemoryConfigDao};
    use std::sync::Arc;

    #[test]
    fn test_storage_id_is_prefixed_by_library() {
        let sid = generate_storage_id("team.prices");
        let (prefix, suffix) = sid.rsplit_once('_').unwrap();
        assert_eq!(prefix, "team.prices");
        assert_eq!(suffix.len(), 32);
    }

    #[test]
    fn test_duplicate_library_rejected() {
        let mut env = EnvironmentConfig::new("research");
        env.add_library("a", StorageConfig::Memory, LibraryOptions::default())
            .unwrap();
        let err = env
            .add_library("a", StorageConfig::Memory, LibraryOptions::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists { .. }));
    }

    #[test]
    fn test_s3_storage_prefix_and_backup() {
        let mut env = EnvironmentConfig::new("research");
        let opts = S3Options {
            endpoint: "s3.example.net".into(),
            bucket_name: "research".into(),
            ..Default::default()
        };
        let primary = env.add_s3_storage("a", &opts).unwrap();
        let backup = env
            .add_s3_storage(
                "a",
                &S3Options {
                    is_backup: true,
                    with_prefix: false,
                    ..opts.clone()
                },
            )
            .unwrap();

        let cfg = env.library_config("a").unwrap();
        assert_eq!(cfg.lib_desc.storage_ids, vec![primary.clone()]);
        assert_eq!(cfg.lib_desc.backup_storage_ids, vec![backup.clone()]);
        assert_eq!(cfg.storage_by_id[&primary].as_s3().unwrap().prefix, "a");
        assert_eq!(cfg.storage_by_id[&backup].as_s3().unwrap().prefix, "");
    }

    #[test]
    fn test_backup_for_unknown_library_rejected() {
        let mut env = EnvironmentConfig::new("research");
        let opts = S3Options {
            is_backup: true,
            ..Default::default()
        };
        assert!(env.add_s3_storage("a", &opts).is_err());
        assert!(env
            .add_storage_to_library("a", StorageConfig::Memory)
            .is_err());
    }

    #[tokio::test]
    async fn test_write_to_persists_libraries_and_storages() {
        let mut env = EnvironmentConfig::new("research");
        let sid = env
            .add_library(
                "a",
                StorageConfig::Memory,
                LibraryOptions {
                    description: Some("prices".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let dao = Arc::new(InMemoryConfigDao::new("research", "default_native_config"));
        let writer = ConfigWriter::new(dao.clone());
        env.write_to(&writer, true).await.unwrap();

        let stored = dao.find_library_config("a").await.unwrap().unwrap();
        assert_eq!(stored.storage_ids, vec![sid.clone()]);
        assert_eq!(stored.description, "prices");
        assert!(dao.storage_exists(&sid).await.unwrap());
    }
}
