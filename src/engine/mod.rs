//! Storage engine seam
//!
//! The data engine that reads and writes library contents lives outside the
//! registry. The registry only asks it to construct a store for a materialized
//! library config and, for reclamation, to clear all data behind a handle.

mod local;

use async_trait::async_trait;
use serde::Serialize;

use crate::auth::OpenMode;
use crate::db::schemas::LibraryConfig;
use crate::types::Result;

pub use local::LocalStorageEngine;

/// Opaque handle onto a constructed store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreHandle {
    pub config: LibraryConfig,
    pub env: String,
    pub open_mode: OpenMode,
}

impl StoreHandle {
    pub fn library_name(&self) -> &str {
        self.config.name()
    }
}

/// External data engine (allows different backends and mocking in tests)
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Open a store over the library's joined storages
    async fn construct_store(
        &self,
        config: LibraryConfig,
        env: &str,
        open_mode: OpenMode,
    ) -> Result<StoreHandle>;

    /// Remove every key held by the store's storages
    async fn clear_all_data(&self, handle: &StoreHandle) -> Result<()>;
}
