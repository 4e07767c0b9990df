//! Per-partition synchronization status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Synchronization state of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    Error,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Status of one independently synchronized partition
///
/// Partitions never mask one another: a failure here says nothing about
/// any other partition's status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleSyncStatus {
    /// Current state
    pub state: SyncState,

    /// When this partition last synchronized successfully
    pub last_success: Option<DateTime<Utc>>,

    /// Message of the most recent failure, cleared on success
    pub last_error: Option<String>,
}

impl ModuleSyncStatus {
    /// Mark a sync attempt as started
    pub fn begin(&mut self) {
        self.state = SyncState::Syncing;
    }

    /// Mark the attempt as succeeded
    pub fn succeed(&mut self, at: DateTime<Utc>) {
        self.state = SyncState::Idle;
        self.last_success = Some(at);
        self.last_error = None;
    }

    /// Mark the attempt as failed
    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = SyncState::Error;
        self.last_error = Some(message.into());
    }

    /// Whether the partition is currently in the error state
    pub fn is_error(&self) -> bool {
        self.state == SyncState::Error
    }
}
