//! Library registry
//!
//! Per-environment metadata for named libraries (logical datasets) and the
//! shared storages they persist on, kept in one MongoDB database per namespace.
//!
//! ## Components
//!
//! - **db**: connector, config DAO seam and per-namespace federation
//! - **registry**: library resolution, credentials resolvers and ordered writes
//! - **collector**: federation-wide mark-and-sweep of unreferenced storages
//! - **engine**: seam onto the external data engine that owns storage contents

pub mod auth;
pub mod collector;
pub mod config;
pub mod db;
pub mod engine;
pub mod logging;
pub mod registry;
pub mod types;

pub use config::{Args, RegistryConfig};
pub use types::{RegistryError, Result};
