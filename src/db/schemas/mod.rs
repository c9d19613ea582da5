//! Database schemas for the registry
//!
//! Defines the MongoDB document structures of the three per-namespace
//! collections: library descriptors, storage descriptors and library metadata.

mod lib_metadata;
mod library;
mod storage;

pub use lib_metadata::{LibraryCounters, LibraryFilter, LibraryMetadata, LIBRARY_METADATA_COLLECTION};
pub use library::{
    CredentialsStore, LibraryConfig, LibraryDescriptor, ResolvedConfig, LIBRARY_COLLECTION,
    LIBRARY_KEY,
};
pub use storage::{
    LmdbConfig, MongoStorageConfig, S3Config, StorageConfig, StorageKind, STORAGE_COLLECTION,
    STORAGE_KEY,
};
