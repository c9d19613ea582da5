//! Storage descriptor schema
//!
//! Physical backend configuration addressed only by id and shared by any
//! number of libraries. Storages carry no back-reference to their libraries.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::mongo::IntoIndexes;

/// Collection name for storage descriptors
pub const STORAGE_COLLECTION: &str = "storage_config";

/// Key field of the storage descriptor collection
pub const STORAGE_KEY: &str = "storage";

/// Backend configuration, keyed by backend kind
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    S3(S3Config),
    Lmdb(LmdbConfig),
    Mongo(MongoStorageConfig),
    Memory,
}

impl StorageConfig {
    pub fn kind(&self) -> StorageKind {
        match self {
            StorageConfig::S3(_) => StorageKind::S3,
            StorageConfig::Lmdb(_) => StorageKind::Lmdb,
            StorageConfig::Mongo(_) => StorageKind::Mongo,
            StorageConfig::Memory => StorageKind::Memory,
        }
    }

    pub fn as_s3(&self) -> Option<&S3Config> {
        match self {
            StorageConfig::S3(cfg) => Some(cfg),
            _ => None,
        }
    }
}

impl IntoIndexes for StorageConfig {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { STORAGE_KEY: 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("storage_unique".to_string())
                    .build(),
            ),
        )]
    }
}

/// S3-compatible object store
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket_name: String,
    #[serde(default)]
    pub credential_name: String,
    #[serde(default)]
    pub credential_key: String,
    /// Key prefix inside the bucket, usually the library name
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub https: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub use_virtual_addressing: bool,
}

/// Local LMDB environment directory
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LmdbConfig {
    pub path: String,
}

/// MongoDB-backed storage; an empty uri is filled in from the caller's connection
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MongoStorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Backend kind tag
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    S3,
    Lmdb,
    Mongo,
    Memory,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::S3 => write!(f, "s3"),
            StorageKind::Lmdb => write!(f, "lmdb"),
            StorageKind::Mongo => write!(f, "mongo"),
            StorageKind::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageKind::S3),
            "lmdb" => Ok(StorageKind::Lmdb),
            "mongo" => Ok(StorageKind::Mongo),
            "memory" => Ok(StorageKind::Memory),
            other => Err(format!("unknown storage kind: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_document_shape() {
        let cfg = StorageConfig::S3(S3Config {
            endpoint: "s3.example.net".into(),
            bucket_name: "research".into(),
            prefix: "team.lib".into(),
            ..Default::default()
        });
        let d = bson::to_document(&cfg).unwrap();
        assert_eq!(d.get_str("kind").unwrap(), "s3");
        assert_eq!(d.get_str("bucket_name").unwrap(), "research");
        assert!(!d.contains_key("region"));
    }

    #[test]
    fn test_stored_document_with_key_field_deserializes() {
        let d = doc! { "storage": "lib_a_1", "kind": "lmdb", "path": "/data/lib_a" };
        let cfg: StorageConfig = bson::from_document(d).unwrap();
        assert_eq!(
            cfg,
            StorageConfig::Lmdb(LmdbConfig {
                path: "/data/lib_a".into()
            })
        );
        assert_eq!(cfg.kind(), StorageKind::Lmdb);

        let mem: StorageConfig = bson::from_document(doc! { "storage": "m", "kind": "memory" }).unwrap();
        assert_eq!(mem, StorageConfig::Memory);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("S3".parse::<StorageKind>().unwrap(), StorageKind::S3);
        assert_eq!("lmdb".parse::<StorageKind>().unwrap(), StorageKind::Lmdb);
        assert!("azure".parse::<StorageKind>().is_err());
        assert_eq!(StorageKind::Memory.to_string(), "memory");
    }
}
