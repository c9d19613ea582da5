//! Engine for storages that live on the local host

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use super::{StorageEngine, StoreHandle};
use crate::auth::OpenMode;
use crate::db::schemas::{LibraryConfig, StorageConfig};
use crate::types::{RegistryError, Result};

/// Handles `lmdb` directories and `memory` storages.
///
/// Other backend kinds are rejected at construction so the collector reports
/// them as failures instead of guessing.
#[derive(Debug, Clone, Default)]
pub struct LocalStorageEngine;

impl LocalStorageEngine {
    pub fn new() -> Self {
        Self
    }

    async fn clear_directory(path: &Path) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Storage directory already absent");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&entry_path).await?;
            } else {
                tokio::fs::remove_file(&entry_path).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for LocalStorageEngine {
    async fn construct_store(
        &self,
        config: LibraryConfig,
        env: &str,
        open_mode: OpenMode,
    ) -> Result<StoreHandle> {
        for (sid, storage) in &config.storage_by_id {
            match storage {
                StorageConfig::Lmdb(_) | StorageConfig::Memory => {}
                other => {
                    return Err(RegistryError::Engine(format!(
                        "storage {} has unsupported backend kind {} for the local engine",
                        sid,
                        other.kind()
                    )))
                }
            }
        }

        Ok(StoreHandle {
            config,
            env: env.to_string(),
            open_mode,
        })
    }

    async fn clear_all_data(&self, handle: &StoreHandle) -> Result<()> {
        if !handle.open_mode.can_delete() {
            return Err(RegistryError::Engine(format!(
                "library {} opened in {} mode cannot be cleared",
                handle.library_name(),
                handle.open_mode
            )));
        }

        for (sid, storage) in &handle.config.storage_by_id {
            if let StorageConfig::Lmdb(lmdb) = storage {
                Self::clear_directory(Path::new(&lmdb.path))
                    .await
                    .map_err(|e| e.in_context(format!("clearing storage {}", sid)))?;
                info!(storage_id = %sid, path = %lmdb.path, "Cleared local storage");
            }
        }
        Ok(())
    }
}
