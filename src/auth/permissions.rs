//! Library access permissions and the open mode derived from them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Read/write grant for one library access.
///
/// Resolved per access by a credentials resolver; never persisted with the
/// library descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
}

impl Permissions {
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
        }
    }

    /// Grant used when a library has no credentials store.
    ///
    /// Unconditional write access; kept as the documented legacy policy.
    pub fn legacy_default() -> Self {
        Self::read_write()
    }
}

/// Access level gating the engine handle returned for a library
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum OpenMode {
    /// Read-only access
    Read = 1,
    /// Read and append/overwrite, no deletion
    Write = 3,
    /// Full access including deletion of data
    Delete = 7,
}

impl OpenMode {
    pub fn can_write(self) -> bool {
        self >= OpenMode::Write
    }

    pub fn can_delete(self) -> bool {
        self == OpenMode::Delete
    }
}

impl From<Permissions> for OpenMode {
    /// Write grants map to full access; anything else opens read-only.
    fn from(perms: Permissions) -> Self {
        if perms.write {
            OpenMode::Delete
        } else {
            OpenMode::Read
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Read => write!(f, "READ"),
            OpenMode::Write => write!(f, "WRITE"),
            OpenMode::Delete => write!(f, "DELETE"),
        }
    }
}
