//! Per-process registry state
//!
//! Holds the "warn once" flags that would otherwise be global mutable state.
//! Share one context (behind an `Arc`) between every resolver of a process.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

#[derive(Debug, Default)]
pub struct RegistryContext {
    default_permissions_warned: AtomicBool,
}

impl RegistryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warn that a library was opened with the legacy read-write grant.
    ///
    /// Emits at most once per context; returns whether this call emitted.
    pub fn warn_default_permissions(&self, lib_name: &str, env: &str) -> bool {
        if self.default_permissions_warned.swap(true, Ordering::AcqRel) {
            return false;
        }
        warn!(
            library = %lib_name,
            env = %env,
            "Library has no credentials store; granting legacy default read-write permissions"
        );
        true
    }

    pub fn default_permissions_warned(&self) -> bool {
        self.default_permissions_warned.load(Ordering::Acquire)
    }
}
