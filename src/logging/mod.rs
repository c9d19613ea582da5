//! Logging infrastructure for the registry
//!
//! Operational logs go through `tracing`; reclaim decisions are additionally
//! written to a JSONL audit file.

pub mod audit;

pub use audit::{AuditEvent, AuditLogger};
