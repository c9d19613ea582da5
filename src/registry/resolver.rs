//! Library resolution
//!
//! Turns a library name into a materialized [`LibraryConfig`] plus the
//! [`OpenMode`] the caller may use it with. Libraries without a credentials
//! store are joined from this registry's own namespace; libraries with one are
//! handed to a caller-supplied [`CredentialsResolver`].

use std::sync::Arc;
use tracing::{debug, info};

use super::context::RegistryContext;
use super::credentials::{join_storages, CredentialsResolver, NamespaceCredentialsHelper};
use crate::auth::{OpenMode, Permissions};
use crate::db::dao::{ConfigDao, ConfigDaoExt, IdStream};
use crate::db::schemas::{LibraryConfig, ResolvedConfig};
use crate::engine::{StorageEngine, StoreHandle};
use crate::types::{ConfigKind, RegistryError, Result};

/// Read side of the registry over one namespace
#[derive(Clone)]
pub struct ConfigRegistry {
    dao: Arc<dyn ConfigDao>,
    context: Arc<RegistryContext>,
}

impl ConfigRegistry {
    pub fn new(dao: Arc<dyn ConfigDao>) -> Self {
        Self::with_context(dao, Arc::new(RegistryContext::new()))
    }

    /// Share warn-once state with other registries of the same process
    pub fn with_context(dao: Arc<dyn ConfigDao>, context: Arc<RegistryContext>) -> Self {
        Self { dao, context }
    }

    pub fn env(&self) -> &str {
        self.dao.env()
    }

    pub fn dao(&self) -> &Arc<dyn ConfigDao> {
        &self.dao
    }

    pub fn context(&self) -> &Arc<RegistryContext> {
        &self.context
    }

    fn not_found(&self, lib_name: &str) -> RegistryError {
        RegistryError::NotFound {
            kind: ConfigKind::Library,
            id: lib_name.to_string(),
            env: self.env().to_string(),
        }
    }

    /// Library descriptor only, no storages joined
    pub async fn get_lib_config_without_storage(&self, lib_name: &str) -> Result<LibraryConfig> {
        match self.dao.find_library_config(lib_name).await? {
            Some(desc) => Ok(LibraryConfig::new(desc)),
            None => Err(self.not_found(lib_name)),
        }
    }

    /// Join primary storages from this namespace and grant the legacy default
    pub async fn default_credentials_helper(
        &self,
        mut config: LibraryConfig,
    ) -> Result<(LibraryConfig, Permissions)> {
        let storage_ids = config.lib_desc.storage_ids.clone();
        join_storages(self.dao.as_ref(), &mut config, &storage_ids).await?;
        self.context
            .warn_default_permissions(config.name(), self.env());
        Ok((config, Permissions::legacy_default()))
    }

    /// Resolve a library to its joined config and open mode.
    ///
    /// A library with a custom credentials store fails with
    /// [`RegistryError::Credentials`] when no `helper` is given, before any
    /// storage is looked up.
    pub async fn resolve(
        &self,
        lib_name: &str,
        helper: Option<&dyn CredentialsResolver>,
    ) -> Result<(ResolvedConfig, OpenMode)> {
        let config = self.get_lib_config_without_storage(lib_name).await?;

        let (resolved, perms) = if config.lib_desc.credentials_store.is_custom() {
            let helper = helper.ok_or_else(|| {
                RegistryError::Credentials(format!(
                    "no credentials resolver supplied for library {} with credentials store {:?}",
                    lib_name, config.lib_desc.credentials_store
                ))
            })?;
            helper.resolve(config).await?
        } else {
            self.default_credentials_helper(config).await?
        };

        let open_mode = OpenMode::from(perms);
        debug!(library = %lib_name, open_mode = %open_mode, "Resolved library");
        Ok((resolved, open_mode))
    }

    /// Resolve and ask the engine to open the library's store
    pub async fn get_native_store(
        &self,
        lib_name: &str,
        helper: Option<&dyn CredentialsResolver>,
        engine: &dyn StorageEngine,
    ) -> Result<StoreHandle> {
        let (config, open_mode) = self.resolve(lib_name, helper).await?;
        info!(library = %lib_name, open_mode = %open_mode, "Opening native store");
        engine.construct_store(config, self.env(), open_mode).await
    }

    /// Administrative resolution.
    ///
    /// For a library with a credentials store, storages are read straight from
    /// the referenced namespace and write access is granted regardless of the
    /// helper's own permissions.
    pub async fn get_lib_config_admin(
        &self,
        lib_name: &str,
        helper: Option<&NamespaceCredentialsHelper>,
    ) -> Result<(ResolvedConfig, OpenMode)> {
        let mut config = self.get_lib_config_without_storage(lib_name).await?;

        if !config.lib_desc.credentials_store.is_custom() {
            let (resolved, perms) = self.default_credentials_helper(config).await?;
            return Ok((resolved, perms.into()));
        }

        let helper = helper.ok_or_else(|| {
            RegistryError::Credentials(format!(
                "no credentials helper supplied for library {} with credentials store {:?}",
                lib_name, config.lib_desc.credentials_store
            ))
        })?;
        let dao = helper.dao_for(&config)?.clone();
        let storage_ids = config.lib_desc.storage_ids.clone();
        join_storages(dao.as_ref(), &mut config, &storage_ids).await?;
        Ok((config, Permissions::read_write().into()))
    }

    /// Join the library's backup storages from this namespace
    pub async fn get_backup_storage_for_cfg(&self, config: &mut LibraryConfig) -> Result<()> {
        for sid in config.lib_desc.backup_storage_ids.clone() {
            match self.dao.find_storage_config(&sid).await? {
                Some(storage) => {
                    config.storage_by_id.insert(sid, storage);
                }
                None => {
                    return Err(RegistryError::Credentials(format!(
                        "config for backup storage id={} does not exist in {}",
                        sid,
                        self.dao.config_db_name()
                    )))
                }
            }
        }
        Ok(())
    }

    /// Whether the library asks to win over a same-named legacy library.
    ///
    /// Unknown libraries answer `false` so callers need not check existence first.
    pub async fn prefer_native_on_name_collision(&self, lib_name: &str) -> Result<bool> {
        Ok(self
            .dao
            .find_library_config(lib_name)
            .await?
            .map(|desc| desc.prefer_native_on_collision)
            .unwrap_or(false))
    }

    pub async fn list_libraries(&self, name_regex: Option<&str>) -> Result<IdStream> {
        self.dao.list_libraries(name_regex).await
    }

    pub async fn library_exists(&self, lib_name: &str) -> Result<bool> {
        self.dao.library_exists(lib_name).await
    }
}
