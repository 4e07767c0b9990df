//! Permisync - Offline-first sync engine for leave and permit records
//!
//! Permisync reconciles a locally editable dataset of leave/permit records and
//! employee records against a remote system of record (a spreadsheet-backed
//! HTTP API), split across two independently synchronized partitions:
//! administrative permits ("PA") and legal holiday ("FL").
//!
//! # Architecture
//!
//! - **records**: Core data structures (LeaveRecord, Employee) and the
//!   tolerant row parser that turns raw sheet rows into typed records
//! - **identity**: National-identity canonicalization (check digit) and the
//!   identity/name conflict resolver
//! - **remote**: The remote sheet API client and its mockable trait seam
//! - **backup**: Durable last-known-good local cache (SQLite)
//! - **sync**: Retry scheduling, undo history, realtime events, and the
//!   orchestrator that composes everything into the public surface
//! - **config**: YAML configuration with per-partition endpoints

// Core modules
pub mod config;
pub mod error;
pub mod identity;
pub mod records;

// Components
pub mod backup;
pub mod logging;
pub mod remote;
pub mod sync;

// Re-exports
pub use error::{PermisyncError, Result};
