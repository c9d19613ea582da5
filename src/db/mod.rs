//! Database layer for the registry
//!
//! Provides per-namespace MongoDB storage for library descriptors, storage
//! descriptors and library metadata.

pub mod dao;
pub mod federation;
pub mod memory;
pub mod mongo;
pub mod retry;
pub mod schemas;

pub use dao::{ConfigCollection, ConfigDao, ConfigDaoExt, IdStream};
pub use federation::Federation;
pub use memory::InMemoryConfigDao;
pub use mongo::{MongoConfigDao, MongoDbConnector};
pub use retry::{FixedRetry, RetryPolicy, RetryingConfigDao};
pub use schemas::{
    CredentialsStore, LibraryConfig, LibraryDescriptor, ResolvedConfig, StorageConfig, StorageKind,
};
