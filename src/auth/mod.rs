//! Access permissions for resolved libraries

pub mod permissions;

pub use permissions::{OpenMode, Permissions};
