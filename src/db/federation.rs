//! Set of namespace DAOs an operation may traverse
//!
//! Cross-namespace references are not discoverable from the data, so the set
//! of namespaces is always supplied explicitly by the operator.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::RegistryConfig;
use crate::db::dao::ConfigDao;
use crate::db::mongo::MongoDbConnector;
use crate::types::{RegistryError, Result};

/// Namespace name -> DAO over that namespace's database
#[derive(Clone)]
pub struct Federation {
    default_namespace: String,
    daos: BTreeMap<String, Arc<dyn ConfigDao>>,
}

impl Federation {
    /// Federation holding only the default namespace
    pub fn new(default_namespace: &str, default_dao: Arc<dyn ConfigDao>) -> Self {
        let mut daos = BTreeMap::new();
        daos.insert(default_namespace.to_string(), default_dao);
        Self {
            default_namespace: default_namespace.to_string(),
            daos,
        }
    }

    /// Open one MongoDB DAO per namespace (default namespace plus `namespaces`)
    pub fn connect(
        connector: &MongoDbConnector,
        config: &RegistryConfig,
        namespaces: &[String],
    ) -> Result<Self> {
        let default_dao = connector.config_dao(&config.default_namespace, config);
        let mut federation = Self::new(&config.default_namespace, Arc::new(default_dao));

        for namespace in namespaces {
            federation.insert(namespace, Arc::new(connector.config_dao(namespace, config)))?;
        }

        info!(
            env = %connector.env(),
            namespaces = ?federation.namespaces().collect::<Vec<_>>(),
            "Namespace federation opened"
        );
        Ok(federation)
    }

    /// Add a namespace; listing the same namespace twice is a configuration error
    pub fn insert(&mut self, namespace: &str, dao: Arc<dyn ConfigDao>) -> Result<()> {
        if self.daos.contains_key(namespace) {
            return Err(RegistryError::Config(format!(
                "Namespace {} listed more than once",
                namespace
            )));
        }
        self.daos.insert(namespace.to_string(), dao);
        Ok(())
    }

    pub fn with_namespace(mut self, namespace: &str, dao: Arc<dyn ConfigDao>) -> Result<Self> {
        self.insert(namespace, dao)?;
        Ok(self)
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn default_dao(&self) -> Option<&Arc<dyn ConfigDao>> {
        self.daos.get(&self.default_namespace)
    }

    pub fn get(&self, namespace: &str) -> Option<&Arc<dyn ConfigDao>> {
        self.daos.get(namespace)
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.daos.contains_key(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.daos.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ConfigDao>)> {
        self.daos.iter().map(|(ns, dao)| (ns.as_str(), dao))
    }

    pub fn len(&self) -> usize {
        self.daos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.daos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryConfigDao;

    fn dao(ns: &str) -> Arc<dyn ConfigDao> {
        Arc::new(InMemoryConfigDao::new("test", &format!("{}_native_config", ns)))
    }

    #[test]
    fn test_default_namespace_always_present() {
        let fed = Federation::new("default", dao("default"));
        assert_eq!(fed.default_namespace(), "default");
        assert!(fed.default_dao().is_some());
        assert_eq!(fed.len(), 1);
    }

    #[test]
    fn test_duplicate_namespace_rejected() {
        let fed = Federation::new("default", dao("default"))
            .with_namespace("ns2", dao("ns2"))
            .unwrap();
        assert!(fed.contains("ns2"));
        assert_eq!(fed.namespaces().collect::<Vec<_>>(), vec!["default", "ns2"]);

        let err = fed.with_namespace("default", dao("default")).err().unwrap();
        assert!(matches!(err, RegistryError::Config(_)));
    }
}
