//! Scoping predicates for reclamation

use std::fmt;
use std::sync::Arc;

use crate::db::schemas::{StorageConfig, StorageKind};

type Predicate = dyn Fn(&str, &StorageConfig) -> bool + Send + Sync;

/// Which orphaned storages a sweep may reclaim
#[derive(Clone, Default)]
pub enum StorageFilter {
    #[default]
    All,
    /// Only one backend kind
    Kind(StorageKind),
    /// Only S3 storages on one of these endpoints
    S3Endpoints(Vec<String>),
    /// Caller-supplied predicate over storage id and config
    Custom(Arc<Predicate>),
}

impl StorageFilter {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&str, &StorageConfig) -> bool + Send + Sync + 'static,
    {
        StorageFilter::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, storage_id: &str, storage: &StorageConfig) -> bool {
        match self {
            StorageFilter::All => true,
            StorageFilter::Kind(kind) => storage.kind() == *kind,
            StorageFilter::S3Endpoints(endpoints) => storage
                .as_s3()
                .is_some_and(|s3| endpoints.iter().any(|e| *e == s3.endpoint)),
            StorageFilter::Custom(predicate) => predicate(storage_id, storage),
        }
    }
}

impl fmt::Debug for StorageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageFilter::All => write!(f, "All"),
            StorageFilter::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            StorageFilter::S3Endpoints(endpoints) => {
                f.debug_tuple("S3Endpoints").field(endpoints).finish()
            }
            StorageFilter::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{LmdbConfig, S3Config};

    fn s3(endpoint: &str) -> StorageConfig {
        StorageConfig::S3(S3Config {
            endpoint: endpoint.into(),
            bucket_name: "b".into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_kind_filter() {
        let filter = StorageFilter::Kind(StorageKind::Lmdb);
        assert!(filter.matches(
            "s1",
            &StorageConfig::Lmdb(LmdbConfig {
                path: "/tmp/x".into()
            })
        ));
        assert!(!filter.matches("s1", &StorageConfig::Memory));
    }

    #[test]
    fn test_s3_endpoint_filter_ignores_other_kinds() {
        let filter = StorageFilter::S3Endpoints(vec!["s3.a.net".into()]);
        assert!(filter.matches("s1", &s3("s3.a.net")));
        assert!(!filter.matches("s1", &s3("s3.b.net")));
        assert!(!filter.matches("s1", &StorageConfig::Memory));
    }

    #[test]
    fn test_custom_predicate_sees_storage_id() {
        let filter = StorageFilter::custom(|sid, _| sid.starts_with("tmp_"));
        assert!(filter.matches("tmp_1", &StorageConfig::Memory));
        assert!(!filter.matches("prod_1", &StorageConfig::Memory));
        assert_eq!(format!("{:?}", filter), "Custom(..)");
    }
}
