//! Library registry
//!
//! Read side ([`ConfigRegistry`]), write side ([`ConfigWriter`]), credentials
//! resolution for libraries whose storages live in another namespace, and an
//! in-memory builder for whole environments.

mod context;
mod credentials;
mod environment;
mod resolver;
mod writer;

pub use context::RegistryContext;
pub use credentials::{CredentialsResolver, NamespaceCredentialsHelper};
pub use environment::{generate_storage_id, EnvironmentConfig, LibraryOptions, S3Options};
pub use resolver::ConfigRegistry;
pub use writer::ConfigWriter;
