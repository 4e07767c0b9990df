//! Local backup layer
//!
//! SQLite-backed cache of the last-known-good dataset, read only as a
//! fallback when the remote is unreachable.

mod store;

pub use store::{BackupConfig, BackupStore};
