//! Configuration for the library registry
//!
//! CLI arguments and environment variable handling using clap. Library callers
//! that never parse a command line build [`RegistryConfig`] and
//! [`CollectorConfig`] directly.

use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::collector::{CollectorConfig, StorageFilter};
use crate::db::schemas::StorageKind;

/// Suffix appended to a namespace to name its metadata database
pub const DEFAULT_CONFIG_DB_SUFFIX: &str = "_native_config";

/// Namespace used when none is given
pub const DEFAULT_NAMESPACE: &str = "default";

/// Library registry - library and storage descriptors across namespaces
#[derive(Parser, Debug, Clone)]
#[command(name = "library-registry")]
#[command(about = "Resolve library descriptors and reclaim orphaned storages")]
pub struct Args {
    /// MongoDB connection URI of the metadata store
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// Environment name, used in diagnostics and error messages
    #[arg(long, env = "REGISTRY_ENV", default_value = "local")]
    pub env: String,

    /// Namespace holding the libraries this process administers
    #[arg(long, env = "REGISTRY_DEFAULT_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub default_namespace: String,

    /// Namespace database name is `<namespace><suffix>`
    #[arg(long, env = "REGISTRY_CONFIG_DB_SUFFIX", default_value = DEFAULT_CONFIG_DB_SUFFIX)]
    pub config_db_suffix: String,

    /// Application name reported to MongoDB
    #[arg(long, env = "REGISTRY_APP_NAME", default_value = "library-registry")]
    pub app_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve a library to its materialized config and open mode
    Resolve {
        lib_name: String,

        /// Namespaces a credentials store may point at
        #[arg(long, value_delimiter = ',')]
        credentials_namespaces: Vec<String>,

        /// Grant read-only access to libraries resolved through a credentials namespace
        #[arg(long, default_value = "false")]
        read_only: bool,
    },

    /// List library names in the default namespace
    ListLibraries {
        /// Only names matching this regex
        #[arg(long)]
        regex: Option<String>,
    },

    /// List storage ids in the default namespace
    ListStorages,

    /// Delete a library descriptor and its metadata (storages are left to the collector)
    DeleteLibrary { lib_name: String },

    /// Reclaim storages referenced by no library in any listed namespace
    CollectOrphans(CollectorArgs),
}

/// Orphan collector configuration
#[derive(clap::Args, Debug, Clone)]
pub struct CollectorArgs {
    /// Additional namespaces whose libraries may reference storages
    #[arg(long, env = "COLLECTOR_NAMESPACES", value_delimiter = ',')]
    pub namespaces: Vec<String>,

    /// Actually clear and delete orphaned storages (default is a dry run)
    #[arg(long, default_value = "false")]
    pub for_real: bool,

    /// Maximum storages reclaimed concurrently
    #[arg(long, env = "COLLECTOR_CONCURRENCY", default_value = "8")]
    pub concurrency: usize,

    /// Only reclaim storages of this backend kind
    #[arg(long)]
    pub backend_kind: Option<StorageKind>,

    /// Only reclaim S3 storages on these endpoints
    #[arg(long = "s3-endpoint")]
    pub s3_endpoints: Vec<String>,

    /// Append one JSON line per reclaim decision to this file
    #[arg(long, env = "COLLECTOR_AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,
}

impl Args {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            env: self.env.clone(),
            default_namespace: self.default_namespace.clone(),
            config_db_suffix: self.config_db_suffix.clone(),
            app_name: self.app_name.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.env.trim().is_empty() {
            return Err("REGISTRY_ENV cannot be empty".to_string());
        }

        if self.default_namespace.trim().is_empty() {
            return Err("REGISTRY_DEFAULT_NAMESPACE cannot be empty".to_string());
        }

        if let Command::CollectOrphans(collector) = &self.command {
            collector.validate(&self.default_namespace)?;
        }

        Ok(())
    }
}

impl CollectorArgs {
    pub fn validate(&self, default_namespace: &str) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("COLLECTOR_CONCURRENCY must be at least 1".to_string());
        }

        let mut seen = HashSet::new();
        for namespace in &self.namespaces {
            if namespace == default_namespace {
                return Err(format!(
                    "Namespace {} is the default namespace and must not be listed again",
                    namespace
                ));
            }
            if !seen.insert(namespace.as_str()) {
                return Err(format!("Namespace {} listed more than once", namespace));
            }
        }

        if !self.s3_endpoints.is_empty() {
            if let Some(kind) = self.backend_kind.filter(|k| *k != StorageKind::S3) {
                return Err(format!(
                    "--s3-endpoint only applies to s3 storages, not {}",
                    kind
                ));
            }
        }

        Ok(())
    }

    pub fn collector_config(&self) -> CollectorConfig {
        let filter = if !self.s3_endpoints.is_empty() {
            StorageFilter::S3Endpoints(self.s3_endpoints.clone())
        } else if let Some(kind) = self.backend_kind {
            StorageFilter::Kind(kind)
        } else {
            StorageFilter::All
        };

        CollectorConfig {
            dry_run: !self.for_real,
            concurrency: self.concurrency,
            filter,
        }
    }
}

/// Registry-wide settings shared by every namespace DAO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub env: String,
    pub default_namespace: String,
    pub config_db_suffix: String,
    pub app_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            env: "local".to_string(),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            config_db_suffix: DEFAULT_CONFIG_DB_SUFFIX.to_string(),
            app_name: "library-registry".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Metadata database backing `namespace`
    pub fn database_for(&self, namespace: &str) -> String {
        format!("{}{}", namespace, self.config_db_suffix)
    }
}
