//! Error types for the library registry
//!
//! One flat enum: string payloads for infrastructure failures, structured
//! payloads where callers branch.

use std::fmt;

/// Main error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A descriptor references a storage that does not exist
    #[error("Configuration integrity error: storage id={id} does not exist in {namespace}")]
    ConfigurationIntegrity { id: String, namespace: String },

    #[error("{kind} {id} already exists on {env}")]
    AlreadyExists {
        kind: ConfigKind,
        id: String,
        env: String,
    },

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("{kind} {id} not found on {env}")]
    NotFound {
        kind: ConfigKind,
        id: String,
        env: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which kind of descriptor an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Library,
    Storage,
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKind::Library => write!(f, "Library"),
            ConfigKind::Storage => write!(f, "Storage"),
        }
    }
}

impl RegistryError {
    /// Prefix infrastructure errors with the id and namespace being touched.
    ///
    /// Structured variants are returned unchanged so callers can still match on them.
    pub fn in_context(self, context: impl fmt::Display) -> Self {
        match self {
            Self::Database(msg) => Self::Database(format!("{}: {}", context, msg)),
            Self::Serialization(msg) => Self::Serialization(format!("{}: {}", context, msg)),
            Self::Engine(msg) => Self::Engine(format!("{}: {}", context, msg)),
            other => other,
        }
    }

    /// Whether the error came from the metadata database round-trip itself
    pub fn is_database(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

// Implement From conversions for common error types

impl From<mongodb::error::Error> for RegistryError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for RegistryError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for RegistryError {
    fn from(err: bson::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {}", err))
    }
}

impl From<regex::Error> for RegistryError {
    fn from(err: regex::Error) -> Self {
        Self::Config(format!("Invalid library name regex: {}", err))
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
