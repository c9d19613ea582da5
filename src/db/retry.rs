//! Caller-supplied retry around any [`ConfigDao`]
//!
//! The registry never retries on its own. Callers that want retries wrap their
//! DAO in [`RetryingConfigDao`] with a policy of their choosing.

use async_trait::async_trait;
use bson::Document;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::db::dao::{ConfigCollection, ConfigDao, IdStream};
use crate::db::schemas::{LibraryCounters, LibraryFilter, LibraryMetadata};
use crate::types::{RegistryError, Result};

/// Decides whether a failed DAO call is attempted again
pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt, or `None` to give up.
    ///
    /// `attempt` is 1 for the first failure.
    fn next_delay(&self, attempt: u32, err: &RegistryError) -> Option<Duration>;
}

/// Retry database errors a fixed number of times with a fixed delay
#[derive(Debug, Clone)]
pub struct FixedRetry {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for FixedRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy for FixedRetry {
    fn next_delay(&self, attempt: u32, err: &RegistryError) -> Option<Duration> {
        (err.is_database() && attempt < self.max_attempts).then_some(self.delay)
    }
}

/// DAO decorator applying a [`RetryPolicy`] to every call
pub struct RetryingConfigDao<D, P> {
    inner: D,
    policy: P,
}

impl<D: ConfigDao, P: RetryPolicy> RetryingConfigDao<D, P> {
    pub fn new(inner: D, policy: P) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    async fn retry<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    match self.policy.next_delay(attempt, &err) {
                        Some(delay) => {
                            warn!(
                                op = op,
                                attempt = attempt,
                                db = %self.inner.config_db_name(),
                                error = %err,
                                "Config DAO call failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(err),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<D: ConfigDao, P: RetryPolicy> ConfigDao for RetryingConfigDao<D, P> {
    fn env(&self) -> &str {
        self.inner.env()
    }

    fn config_db_name(&self) -> &str {
        self.inner.config_db_name()
    }

    async fn ensure_indexes(&self) -> Result<()> {
        self.retry("ensure_indexes", || self.inner.ensure_indexes())
            .await
    }

    async fn get_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
    ) -> Result<Option<Document>> {
        self.retry("get_config", || self.inner.get_config(coll, id_value))
            .await
    }

    async fn get_configs(&self, coll: ConfigCollection, id_value: &str) -> Result<Vec<Document>> {
        self.retry("get_configs", || self.inner.get_configs(coll, id_value))
            .await
    }

    async fn add_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
        cfg: Document,
    ) -> Result<Document> {
        self.retry("add_config", || {
            self.inner.add_config(coll, id_value, cfg.clone())
        })
        .await
    }

    async fn upsert_config(
        &self,
        coll: ConfigCollection,
        id_value: &str,
        fields: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        self.retry("upsert_config", || {
            self.inner
                .upsert_config(coll, id_value, fields.clone(), upsert)
        })
        .await
    }

    async fn delete_config(&self, coll: ConfigCollection, id_value: &str) -> Result<()> {
        self.retry("delete_config", || self.inner.delete_config(coll, id_value))
            .await
    }

    async fn config_exists(&self, coll: ConfigCollection, id_value: &str) -> Result<bool> {
        self.retry("config_exists", || self.inner.config_exists(coll, id_value))
            .await
    }

    async fn list_libraries(&self, name_regex: Option<&str>) -> Result<IdStream> {
        self.retry("list_libraries", || self.inner.list_libraries(name_regex))
            .await
    }

    async fn list_storages(&self) -> Result<IdStream> {
        self.retry("list_storages", || self.inner.list_storages())
            .await
    }

    async fn get_lib_metadata(&self, library: &str) -> Result<Option<LibraryMetadata>> {
        self.retry("get_lib_metadata", || self.inner.get_lib_metadata(library))
            .await
    }

    async fn get_libs_metadata(&self, filter: &LibraryFilter) -> Result<Vec<LibraryMetadata>> {
        self.retry("get_libs_metadata", || self.inner.get_libs_metadata(filter))
            .await
    }

    async fn update_lib_metadata(&self, library: &str, counters: &LibraryCounters) -> Result<()> {
        self.retry("update_lib_metadata", || {
            self.inner.update_lib_metadata(library, counters)
        })
        .await
    }

    async fn delete_libs_metadata(&self, filter: &LibraryFilter) -> Result<()> {
        self.retry("delete_libs_metadata", || {
            self.inner.delete_libs_metadata(filter)
        })
        .await
    }
}
