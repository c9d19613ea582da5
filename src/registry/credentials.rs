//! Credentials resolution for libraries with a custom credentials store
//!
//! A library whose descriptor names a credentials store keeps its storages
//! (and the right to use them) somewhere other than its own namespace. The
//! registry cannot resolve those on its own and defers to a
//! [`CredentialsResolver`] supplied by the caller.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::auth::Permissions;
use crate::db::dao::{ConfigDao, ConfigDaoExt};
use crate::db::schemas::{CredentialsStore, LibraryConfig};
use crate::db::Federation;
use crate::types::{RegistryError, Result};

/// Resolves a custom-store library's storages and the caller's permissions
#[async_trait]
pub trait CredentialsResolver: Send + Sync {
    /// Join the library's primary storages and compute permissions
    async fn resolve(&self, config: LibraryConfig) -> Result<(LibraryConfig, Permissions)>;
}

/// Join `storage_ids` into `config` from `dao`.
///
/// A missing storage is a dangling reference and fails with
/// [`RegistryError::ConfigurationIntegrity`].
pub(crate) async fn join_storages(
    dao: &dyn ConfigDao,
    config: &mut LibraryConfig,
    storage_ids: &[String],
) -> Result<()> {
    for sid in storage_ids {
        match dao.find_storage_config(sid).await? {
            Some(storage) => {
                config.storage_by_id.insert(sid.clone(), storage);
            }
            None => {
                return Err(RegistryError::ConfigurationIntegrity {
                    id: sid.clone(),
                    namespace: format!("{}/{}", dao.env(), dao.config_db_name()),
                })
            }
        }
    }
    Ok(())
}

/// Resolver for [`CredentialsStore::Namespace`] stores.
///
/// Looks the storages up in the referenced namespace of its federation and
/// grants a fixed set of permissions.
#[derive(Clone)]
pub struct NamespaceCredentialsHelper {
    federation: Federation,
    permissions: Permissions,
}

impl NamespaceCredentialsHelper {
    pub fn new(federation: Federation, permissions: Permissions) -> Self {
        Self {
            federation,
            permissions,
        }
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// DAO of the namespace the library's credentials store points at
    pub fn dao_for(&self, config: &LibraryConfig) -> Result<&Arc<dyn ConfigDao>> {
        match &config.lib_desc.credentials_store {
            CredentialsStore::Namespace { namespace } => {
                self.federation.get(namespace).ok_or_else(|| {
                    RegistryError::Credentials(format!(
                        "library {} references namespace {} which is not configured",
                        config.name(),
                        namespace
                    ))
                })
            }
            CredentialsStore::None => Err(RegistryError::Credentials(format!(
                "library {} has no credentials store",
                config.name()
            ))),
        }
    }
}

#[async_trait]
impl CredentialsResolver for NamespaceCredentialsHelper {
    async fn resolve(&self, mut config: LibraryConfig) -> Result<(LibraryConfig, Permissions)> {
        let dao = self.dao_for(&config)?.clone();
        debug!(
            library = %config.name(),
            config_db = %dao.config_db_name(),
            "Resolving storages through credentials namespace"
        );
        let storage_ids = config.lib_desc.storage_ids.clone();
        join_storages(dao.as_ref(), &mut config, &storage_ids).await?;
        Ok((config, self.permissions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{LibraryDescriptor, StorageConfig};
    use crate::db::InMemoryConfigDao;

    async fn federation() -> Federation {
        let ns2 = InMemoryConfigDao::new("test", "ns2_native_config");
        ns2.add_storage_descriptor("s2", &StorageConfig::Memory)
            .await
            .unwrap();
        Federation::new(
            "default",
            Arc::new(InMemoryConfigDao::new("test", "default_native_config")),
        )
        .with_namespace("ns2", Arc::new(ns2))
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolves_storages_in_referenced_namespace() {
        let helper = NamespaceCredentialsHelper::new(federation().await, Permissions::read_only());
        let cfg = LibraryConfig::new(
            LibraryDescriptor::new("c", vec!["s2".into()]).with_credentials_namespace("ns2"),
        );

        let (resolved, perms) = helper.resolve(cfg).await.unwrap();
        assert_eq!(perms, Permissions::read_only());
        assert_eq!(resolved.storage_by_id.get("s2"), Some(&StorageConfig::Memory));
    }

    #[tokio::test]
    async fn test_untracked_namespace_is_credentials_error() {
        let helper = NamespaceCredentialsHelper::new(federation().await, Permissions::read_only());
        let cfg = LibraryConfig::new(
            LibraryDescriptor::new("c", vec!["s2".into()]).with_credentials_namespace("ns9"),
        );
        let err = helper.resolve(cfg).await.unwrap_err();
        assert!(matches!(err, RegistryError::Credentials(_)));
    }

    #[tokio::test]
    async fn test_missing_storage_is_integrity_error() {
        let helper = NamespaceCredentialsHelper::new(federation().await, Permissions::read_write());
        let cfg = LibraryConfig::new(
            LibraryDescriptor::new("c", vec!["gone".into()]).with_credentials_namespace("ns2"),
        );
        match helper.resolve(cfg).await.unwrap_err() {
            RegistryError::ConfigurationIntegrity { id, namespace } => {
                assert_eq!(id, "gone");
                assert_eq!(namespace, "test/ns2_native_config");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
