//! Realtime change events
//!
//! Peer clients announce their writes through a shared append-only event
//! log. `EventBus` models that log as a broadcast channel plus an in-memory
//! history; the transport that mirrors events to the actual shared store is
//! an external collaborator behind this interface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default broadcast channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Event scope, matching the dataset a write touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventScope {
    Records,
    Employees,
    Admin,
}

/// A peer-visible change notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    /// Dataset the write touched
    pub scope: EventScope,

    /// What happened (e.g. "upsert", "delete", "bulk_import")
    pub action: String,

    /// Email of the acting user, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_email: Option<String>,

    /// Client that originated the write
    pub origin_client_id: String,

    /// Free-form event details
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// When the event was published
    pub created_at: DateTime<Utc>,
}

impl SyncEvent {
    /// Create an event stamped with the current time
    pub fn new(scope: EventScope, action: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            scope,
            action: action.into(),
            actor_email: None,
            origin_client_id: origin.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Attach the acting user
    pub fn with_actor(mut self, email: impl Into<String>) -> Self {
        self.actor_email = Some(email.into());
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append-only event log with broadcast delivery
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    log: Mutex<Vec<SyncEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            log: Mutex::new(Vec::new()),
        }
    }

    fn log(&self) -> MutexGuard<'_, Vec<SyncEvent>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event and broadcast it to subscribers
    pub fn publish(&self, event: SyncEvent) {
        self.log().push(event.clone());
        if let Err(e) = self.tx.send(event) {
            // No receivers subscribed; the log still keeps the event
            tracing::debug!(error = %e, "Event published with no subscribers");
        }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Snapshot of the full event history
    pub fn history(&self) -> Vec<SyncEvent> {
        self.log().clone()
    }
}

/// Single-slot trailing debouncer
///
/// Every trigger within the window aborts and re-arms the deferred action,
/// so a burst collapses into one run. An action still running when the
/// timer fires again is not restarted.
pub struct Debouncer {
    window: Duration,
    slot: Mutex<Option<JoinHandle<()>>>,
    busy: Arc<AtomicBool>,
}

impl Debouncer {
    /// Create a debouncer with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slot: Mutex::new(None),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule the action, collapsing with any pending trigger
    pub fn trigger<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let busy = Arc::clone(&self.busy);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if busy.swap(true, Ordering::SeqCst) {
                tracing::debug!("Deferred action still running, not restarted");
                return;
            }
            action().await;
            busy.store(false, Ordering::SeqCst);
        });

        let mut slot = self.slot();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Cancel any pending (not yet running) action
    pub fn cancel(&self) {
        if let Some(handle) = self.slot().take() {
            handle.abort();
        }
    }

    /// Whether a deferred action is waiting for its window to elapse
    pub fn is_armed(&self) -> bool {
        self.slot()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
