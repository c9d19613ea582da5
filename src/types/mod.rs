//! Shared types

mod error;

pub use error::{ConfigKind, RegistryError, Result};
