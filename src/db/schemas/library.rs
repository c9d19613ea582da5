//! Library descriptor schema
//!
//! A library is a named logical dataset persisted on one or more shared storages.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::StorageConfig;

/// Collection name for library descriptors
pub const LIBRARY_COLLECTION: &str = "library_config";

/// Key field of the library descriptor and library metadata collections
pub const LIBRARY_KEY: &str = "library";

/// Which namespace (and mechanism) supplies storage credentials for a library
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsStore {
    /// Storages live in the library's own namespace
    #[default]
    None,
    /// Storages and credentials live in another namespace
    Namespace { namespace: String },
}

impl CredentialsStore {
    /// Referenced namespace, if any
    pub fn namespace(&self) -> Option<&str> {
        match self {
            CredentialsStore::None => None,
            CredentialsStore::Namespace { namespace } => Some(namespace),
        }
    }

    /// Whether resolution needs an external credentials resolver
    pub fn is_custom(&self) -> bool {
        !matches!(self, CredentialsStore::None)
    }
}

/// Library descriptor document stored in MongoDB
///
/// Every field is always serialized so that field-mask updates can address any
/// top-level path.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LibraryDescriptor {
    /// Library name, unique within a namespace
    pub name: String,

    /// Storage ids; the first is the primary
    #[serde(default)]
    pub storage_ids: Vec<String>,

    /// Storages holding backups of this library
    #[serde(default)]
    pub backup_storage_ids: Vec<String>,

    #[serde(default)]
    pub credentials_store: CredentialsStore,

    #[serde(default)]
    pub description: String,

    /// Prefer this library over a legacy one with the same name
    #[serde(default)]
    pub prefer_native_on_collision: bool,
}

impl LibraryDescriptor {
    /// Top-level paths accepted by field-mask updates
    pub const FIELDS: &'static [&'static str] = &[
        "name",
        "storage_ids",
        "backup_storage_ids",
        "credentials_store",
        "description",
        "prefer_native_on_collision",
    ];

    pub fn new(name: impl Into<String>, storage_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            storage_ids,
            ..Default::default()
        }
    }

    pub fn with_credentials_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.credentials_store = CredentialsStore::Namespace {
            namespace: namespace.into(),
        };
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// All storage ids this library keeps alive (primary and backup)
    pub fn referenced_storage_ids(&self) -> impl Iterator<Item = &String> {
        self.storage_ids.iter().chain(self.backup_storage_ids.iter())
    }
}

impl IntoIndexes for LibraryDescriptor {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { LIBRARY_KEY: 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("library_unique".to_string())
                    .build(),
            ),
        )]
    }
}

/// Library descriptor plus the storage configs it has been joined with
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LibraryConfig {
    pub lib_desc: LibraryDescriptor,

    #[serde(default)]
    pub storage_by_id: BTreeMap<String, StorageConfig>,
}

impl LibraryConfig {
    pub fn new(lib_desc: LibraryDescriptor) -> Self {
        Self {
            lib_desc,
            storage_by_id: BTreeMap::new(),
        }
    }

    /// Disposable single-storage library used to address one storage directly.
    ///
    /// Never persisted; the storage id doubles as the library name.
    pub fn single_storage(storage_id: &str, storage: StorageConfig) -> Self {
        let mut cfg = Self::new(LibraryDescriptor::new(
            storage_id,
            vec![storage_id.to_string()],
        ));
        cfg.storage_by_id.insert(storage_id.to_string(), storage);
        cfg
    }

    pub fn name(&self) -> &str {
        &self.lib_desc.name
    }
}

/// Alias for a library config whose primary storages have all been joined
pub type ResolvedConfig = LibraryConfig;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::LmdbConfig;

    #[test]
    fn test_credentials_store_tagging() {
        let none = bson::to_document(&LibraryDescriptor::new("a", vec!["s1".into()])).unwrap();
        assert_eq!(
            none.get_document("credentials_store").unwrap(),
            &doc! { "type": "none" }
        );

        let desc = LibraryDescriptor::new("c", vec!["s2".into()]).with_credentials_namespace("ns2");
        let d = bson::to_document(&desc).unwrap();
        assert_eq!(
            d.get_document("credentials_store").unwrap(),
            &doc! { "type": "namespace", "namespace": "ns2" }
        );

        let back: LibraryDescriptor = bson::from_document(d).unwrap();
        assert_eq!(back.credentials_store.namespace(), Some("ns2"));
        assert!(back.credentials_store.is_custom());
    }

    #[test]
    fn test_descriptor_tolerates_key_field_and_missing_optionals() {
        let d = doc! { "library": "a", "name": "a", "storage_ids": ["s1", "s2"] };
        let desc: LibraryDescriptor = bson::from_document(d).unwrap();
        assert_eq!(desc.storage_ids, vec!["s1", "s2"]);
        assert!(desc.backup_storage_ids.is_empty());
        assert_eq!(desc.credentials_store, CredentialsStore::None);
        assert!(!desc.prefer_native_on_collision);
    }

    #[test]
    fn test_all_fields_serialized() {
        let d = bson::to_document(&LibraryDescriptor::default()).unwrap();
        for field in LibraryDescriptor::FIELDS {
            assert!(d.contains_key(field), "missing {}", field);
        }
    }

    #[test]
    fn test_referenced_storage_ids_includes_backups() {
        let mut desc = LibraryDescriptor::new("a", vec!["s1".into()]);
        desc.backup_storage_ids.push("b1".into());
        let ids: Vec<&String> = desc.referenced_storage_ids().collect();
        assert_eq!(ids, vec!["s1", "b1"]);
    }

    #[test]
    fn test_single_storage_library() {
        let cfg = LibraryConfig::single_storage(
            "s9",
            StorageConfig::Lmdb(LmdbConfig {
                path: "/tmp/s9".into(),
            }),
        );
        assert_eq!(cfg.name(), "s9");
        assert_eq!(cfg.lib_desc.storage_ids, vec!["s9".to_string()]);
        assert!(cfg.storage_by_id.contains_key("s9"));
    }
}
