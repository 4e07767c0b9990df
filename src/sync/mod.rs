//! Synchronization engine
//!
//! Composes the retry scheduler, undo history, realtime event bus, and
//! per-partition status tracking into the orchestrator - the single public
//! read/write surface over the remote system of record.
//!
//! # Flow
//!
//! 1. **Fetch**: both partitions in parallel; a stale in-flight fetch is
//!    superseded by a newer one; failures fall back to the local backup
//! 2. **Mutate**: identity validation, undo snapshot, local mutation,
//!    event publication, remote push
//! 3. **Push failure**: one retry timer (re-armed per failure, never
//!    stacked) while online; a pending flag consumed on the connectivity
//!    edge while offline
//!
//! # Example
//!
//! ```ignore
//! use permisync::config::SyncConfig;
//! use permisync::remote::HttpRemoteClient;
//! use permisync::sync::SyncOrchestrator;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> permisync::Result<()> {
//!     let config = SyncConfig::load_default()?;
//!     let api = Arc::new(HttpRemoteClient::new(config.clone()));
//!     let orchestrator = SyncOrchestrator::new(config, api);
//!
//!     orchestrator.set_online(true);
//!     orchestrator.fetch_records().await?;
//!     Ok(())
//! }
//! ```

mod events;
mod orchestrator;
mod retry;
mod status;
mod undo;

pub use events::{Debouncer, EventBus, EventScope, SyncEvent};
pub use orchestrator::{
    default_date_comparator, FetchOutcome, RecordChange, RecordComparator, SyncNotice,
    SyncOrchestrator,
};
pub use retry::RetryScheduler;
pub use status::{ModuleSyncStatus, SyncState};
pub use undo::{UndoManager, DEFAULT_UNDO_DEPTH};
