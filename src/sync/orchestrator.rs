//! Sync orchestrator
//!
//! Composes the remote client, backup store, retry scheduler, undo history,
//! and event bus into the public read/write surface. The in-memory record
//! set is mutated only through [`SyncOrchestrator::apply`], which records an
//! undo snapshot before mutating and triggers the resulting remote push.

use crate::backup::BackupStore;
use crate::config::SyncConfig;
use crate::identity::{conflict, rut, ConflictSource, IgnoreSpec};
use crate::records::{self, Employee, LeaveRecord, ParseWarning, Partition};
use crate::remote::RemoteApi;
use crate::sync::{
    Debouncer, EventBus, EventScope, ModuleSyncStatus, RetryScheduler, SyncEvent, UndoManager,
};
use crate::{PermisyncError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;

/// Ordering applied to the merged record set after a fetch
pub type RecordComparator =
    Arc<dyn Fn(&LeaveRecord, &LeaveRecord) -> std::cmp::Ordering + Send + Sync>;

/// Default ordering: ascending by start date, dateless records last
pub fn default_date_comparator(a: &LeaveRecord, b: &LeaveRecord) -> std::cmp::Ordering {
    match (a.start_date.is_empty(), b.start_date.is_empty()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        // Normalized dates compare lexicographically
        (false, false) => a.start_date.cmp(&b.start_date),
    }
}

/// Caller-visible failure notification
#[derive(Debug, Clone)]
pub struct SyncNotice {
    /// Affected partition, when the failure is partition-scoped
    pub partition: Option<Partition>,

    /// Human-readable message
    pub message: String,
}

/// A mutation of the local dataset
#[derive(Debug, Clone)]
pub enum RecordChange {
    /// Insert or update one leave record
    UpsertRecord(LeaveRecord),

    /// Delete one leave record by id
    DeleteRecord(String),

    /// Replace the whole record set (bulk import)
    ReplaceRecords(Vec<LeaveRecord>),

    /// Insert or update one employee, keyed by identity
    UpsertEmployee(Employee),

    /// Delete one employee by identity
    DeleteEmployee(String),
}

/// Outcome of a fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// Live data from the remote
    Remote { warnings: Vec<ParseWarning> },

    /// Served from the local backup; the remote was unreachable
    Degraded { last_backup: Option<DateTime<Utc>> },

    /// Discarded because a newer fetch was issued meanwhile
    Superseded,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    config: SyncConfig,
    api: Arc<dyn RemoteApi>,
    backup: Option<Arc<BackupStore>>,
    compare: RecordComparator,

    records: Mutex<Vec<LeaveRecord>>,
    employees: Mutex<Vec<Employee>>,
    statuses: Mutex<HashMap<Partition, ModuleSyncStatus>>,
    employee_status: Mutex<ModuleSyncStatus>,
    undo: Mutex<UndoManager>,

    retry: RetryScheduler,
    debounce: Debouncer,
    bus: Mutex<Weak<EventBus>>,

    /// Issuance counter; only the latest fetch may apply its result
    fetch_generation: AtomicU64,
    online: AtomicBool,
    notices: broadcast::Sender<SyncNotice>,
}

/// The synchronization engine's public surface
///
/// Cheap to clone; clones share state. Background tasks (retry timers,
/// debounced re-fetches) operate on clones of the same orchestrator.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Create an orchestrator without a backup store
    pub fn new(config: SyncConfig, api: Arc<dyn RemoteApi>) -> Self {
        Self::with_options(config, api, None, Arc::new(default_date_comparator))
    }

    /// Create an orchestrator with a backup store and record ordering
    pub fn with_options(
        config: SyncConfig,
        api: Arc<dyn RemoteApi>,
        backup: Option<BackupStore>,
        compare: RecordComparator,
    ) -> Self {
        let (notices, _) = broadcast::channel(64);
        let retry = RetryScheduler::new(config.retry_delay());
        let debounce = Debouncer::new(config.debounce_window());

        let mut statuses = HashMap::new();
        for partition in Partition::ALL {
            statuses.insert(partition, ModuleSyncStatus::default());
        }

        Self {
            inner: Arc::new(Inner {
                config,
                api,
                backup: backup.map(Arc::new),
                compare,
                records: Mutex::new(Vec::new()),
                employees: Mutex::new(Vec::new()),
                statuses: Mutex::new(statuses),
                employee_status: Mutex::new(ModuleSyncStatus::default()),
                undo: Mutex::new(UndoManager::new()),
                retry,
                debounce,
                bus: Mutex::new(Weak::new()),
                fetch_generation: AtomicU64::new(0),
                online: AtomicBool::new(true),
                notices,
            }),
        }
    }

    // ---- read surface ----

    /// Snapshot of the current record set
    pub fn records(&self) -> Vec<LeaveRecord> {
        lock(&self.inner.records).clone()
    }

    /// Snapshot of the current employee roster
    pub fn employees(&self) -> Vec<Employee> {
        lock(&self.inner.employees).clone()
    }

    /// Status of one record partition
    pub fn status(&self, partition: Partition) -> ModuleSyncStatus {
        lock(&self.inner.statuses)
            .get(&partition)
            .cloned()
            .unwrap_or_default()
    }

    /// Status of the employee roster sync
    pub fn employee_status(&self) -> ModuleSyncStatus {
        lock(&self.inner.employee_status).clone()
    }

    /// Subscribe to failure notices
    pub fn subscribe_notices(&self) -> broadcast::Receiver<SyncNotice> {
        self.inner.notices.subscribe()
    }

    /// Whether the engine currently considers itself online
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Whether a push retry timer is armed
    pub fn retry_armed(&self) -> bool {
        self.inner.retry.is_armed()
    }

    /// Whether a push is pending on connectivity
    pub fn retry_pending(&self) -> bool {
        self.inner.retry.is_pending()
    }

    /// Number of undo snapshots currently held
    pub fn undo_depth(&self) -> usize {
        lock(&self.inner.undo).len()
    }

    // ---- connectivity ----

    /// Update the connectivity flag
    ///
    /// Regaining connectivity is edge-triggered: a push left pending while
    /// offline resumes automatically, without manual re-invocation.
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if online && !was_online && self.inner.retry.take_pending() {
            tracing::info!("Connectivity restored, resuming pending push");
            let this = self.clone();
            tokio::spawn(async move {
                let _ = this.push_records().await;
            });
        }
    }

    /// Cancel timers and pending work (instance teardown)
    pub fn shutdown(&self) {
        self.inner.retry.cancel();
        self.inner.debounce.cancel();
    }

    // ---- fetch ----

    /// Fetch both record partitions
    ///
    /// Partitions are requested in parallel and fail independently. A newer
    /// fetch supersedes this one: the stale result is discarded unapplied.
    /// Offline, or with every partition failing, the local backup serves a
    /// degraded result instead.
    pub async fn fetch_records(&self) -> Result<FetchOutcome> {
        let generation = self.inner.fetch_generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.is_online() {
            tracing::info!("Offline, serving records from backup");
            return self.record_fallback();
        }

        {
            let mut statuses = lock(&self.inner.statuses);
            for partition in Partition::ALL {
                statuses.entry(partition).or_default().begin();
            }
        }

        let fetched_at = Utc::now();
        let (pa_outcome, fl_outcome) = tokio::join!(
            self.inner.api.fetch_rows(Partition::Administrative),
            self.inner.api.fetch_rows(Partition::Legal),
        );

        if self.inner.fetch_generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "Fetch superseded, result discarded");
            return Ok(FetchOutcome::Superseded);
        }

        let mut merged: Vec<LeaveRecord> = Vec::new();
        let mut warnings = Vec::new();
        let mut any_success = false;

        let outcomes = [
            (Partition::Administrative, pa_outcome),
            (Partition::Legal, fl_outcome),
        ];
        for (partition, outcome) in outcomes {
            match outcome {
                Ok(rows) => {
                    let batch = records::records_from_rows(partition, &rows, fetched_at);
                    warnings.extend(batch.warnings);
                    merged.extend(batch.records);
                    lock(&self.inner.statuses)
                        .entry(partition)
                        .or_default()
                        .succeed(fetched_at);
                    any_success = true;
                }
                Err(e) => {
                    let message = format!("{} fetch failed: {}", partition, e);
                    lock(&self.inner.statuses)
                        .entry(partition)
                        .or_default()
                        .fail(&message);
                    self.notify(Some(partition), &message);
                    // keep what we already had for the failed partition
                    let existing = lock(&self.inner.records);
                    merged.extend(
                        existing
                            .iter()
                            .filter(|r| r.partition == partition)
                            .cloned(),
                    );
                }
            }
        }

        if !any_success {
            tracing::warn!("Every partition failed to fetch, falling back to backup");
            return self.record_fallback();
        }

        merged.sort_by(|a, b| (self.inner.compare)(a, b));
        *lock(&self.inner.records) = merged;
        self.persist_backup();

        Ok(FetchOutcome::Remote { warnings })
    }

    /// Fetch the employee roster
    pub async fn fetch_employees(&self) -> Result<FetchOutcome> {
        if !self.is_online() {
            tracing::info!("Offline, serving employees from backup");
            return self.employee_fallback();
        }

        lock(&self.inner.employee_status).begin();
        let fetched_at = Utc::now();

        match self.inner.api.fetch_employee_rows().await {
            Ok(rows) => {
                let (employees, warnings) = records::employees_from_rows(&rows);
                *lock(&self.inner.employees) = employees;
                lock(&self.inner.employee_status).succeed(fetched_at);
                self.persist_backup();
                Ok(FetchOutcome::Remote { warnings })
            }
            Err(e) => {
                let message = format!("employee fetch failed: {}", e);
                lock(&self.inner.employee_status).fail(&message);
                self.notify(None, &message);
                self.employee_fallback()
            }
        }
    }

    fn record_fallback(&self) -> Result<FetchOutcome> {
        let Some(store) = &self.inner.backup else {
            return Err(PermisyncError::NoLocalData);
        };

        match store.load_records()? {
            Some(backup_records) if !backup_records.is_empty() => {
                let last_backup = store.last_backup().unwrap_or_default();
                *lock(&self.inner.records) = backup_records;
                tracing::info!(?last_backup, "Serving degraded records from backup");
                Ok(FetchOutcome::Degraded { last_backup })
            }
            _ => Err(PermisyncError::NoLocalData),
        }
    }

    fn employee_fallback(&self) -> Result<FetchOutcome> {
        let Some(store) = &self.inner.backup else {
            return Err(PermisyncError::NoLocalData);
        };

        match store.load_employees()? {
            Some(backup_employees) if !backup_employees.is_empty() => {
                let last_backup = store.last_backup().unwrap_or_default();
                *lock(&self.inner.employees) = backup_employees;
                Ok(FetchOutcome::Degraded { last_backup })
            }
            _ => Err(PermisyncError::NoLocalData),
        }
    }

    // ---- push ----

    /// Push both record partitions
    ///
    /// Partitions push in parallel and are evaluated jointly: every
    /// partition with a non-empty payload must succeed, otherwise the push
    /// as a whole fails and the full payload is retried. A partition with
    /// nothing to send short-circuits to success without a request.
    pub async fn push_records(&self) -> Result<()> {
        // A new push for the same data clears any armed retry
        self.inner.retry.cancel();

        if !self.is_online() {
            self.inner.retry.mark_pending();
            tracing::info!("Offline, push pending until connectivity returns");
            return Ok(());
        }

        let (pa_rows, fl_rows) = {
            let current = lock(&self.inner.records);
            (
                records::records_to_rows(Partition::Administrative, &current),
                records::records_to_rows(Partition::Legal, &current),
            )
        };

        let now = Utc::now();
        let (pa_result, fl_result) = tokio::join!(
            self.push_partition(Partition::Administrative, pa_rows, now),
            self.push_partition(Partition::Legal, fl_rows, now),
        );

        let failures: Vec<String> = [pa_result, fl_result]
            .into_iter()
            .filter_map(|result| result.err())
            .collect();

        if !failures.is_empty() {
            let message = failures.join("; ");
            if self.is_online() {
                let fut = self.push_records_retry();
                self.inner.retry.arm(async move {
                    let _ = fut.await;
                });
            } else {
                self.inner.retry.mark_pending();
            }
            return Err(PermisyncError::Remote(message));
        }

        self.persist_backup();
        Ok(())
    }

    /// Boxed clone of the push future used to re-arm a retry
    ///
    /// Type-erasing to a concrete `Send` future breaks the Send-inference
    /// cycle that would otherwise arise from `push_records` arming a retry
    /// that awaits `push_records` again.
    fn push_records_retry(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>> {
        let this = self.clone();
        Box::pin(async move { this.push_records().await })
    }

    async fn push_partition(
        &self,
        partition: Partition,
        rows: Vec<Vec<String>>,
        now: DateTime<Utc>,
    ) -> std::result::Result<bool, String> {
        if rows.is_empty() {
            tracing::debug!(partition = %partition, "Nothing to push");
            return Ok(false);
        }

        lock(&self.inner.statuses)
            .entry(partition)
            .or_default()
            .begin();

        match self.inner.api.push_rows(partition, rows).await {
            Ok(()) => {
                lock(&self.inner.statuses)
                    .entry(partition)
                    .or_default()
                    .succeed(now);
                Ok(true)
            }
            Err(e) => {
                let message = format!("{} push failed: {}", partition, e);
                lock(&self.inner.statuses)
                    .entry(partition)
                    .or_default()
                    .fail(&message);
                self.notify(Some(partition), &message);
                Err(message)
            }
        }
    }

    /// Push the employee roster
    pub async fn push_employees(&self) -> Result<()> {
        if !self.is_online() {
            return Err(PermisyncError::Network(
                "offline, employee push not attempted".to_string(),
            ));
        }

        lock(&self.inner.employee_status).begin();
        let rows = records::employees_to_rows(&lock(&self.inner.employees));

        match self.inner.api.push_employee_rows(rows).await {
            Ok(()) => {
                lock(&self.inner.employee_status).succeed(Utc::now());
                self.persist_backup();
                Ok(())
            }
            Err(e) => {
                let message = format!("employee push failed: {}", e);
                lock(&self.inner.employee_status).fail(&message);
                self.notify(None, &message);
                Err(PermisyncError::Remote(message))
            }
        }
    }

    // ---- mutation ----

    /// Apply a local mutation
    ///
    /// Identity validation runs synchronously and rejects the change before
    /// any snapshot or network call. Valid record changes snapshot the
    /// pre-mutation state, mutate, publish a peer event, and push.
    pub async fn apply(&self, change: RecordChange) -> Result<()> {
        match change {
            RecordChange::UpsertRecord(record) => self.upsert_record(record).await,
            RecordChange::DeleteRecord(id) => self.delete_record(&id).await,
            RecordChange::ReplaceRecords(new_records) => self.replace_records(new_records).await,
            RecordChange::UpsertEmployee(employee) => self.upsert_employee(employee).await,
            RecordChange::DeleteEmployee(rut) => self.delete_employee(&rut).await,
        }
    }

    /// Undo the most recent record mutation
    ///
    /// The restored state is itself pushed to the remote: undo is a durable
    /// mutation, not a local view change. Returns false when there is
    /// nothing to undo.
    pub async fn undo(&self) -> Result<bool> {
        let Some(previous) = lock(&self.inner.undo).undo() else {
            return Ok(false);
        };

        *lock(&self.inner.records) = previous;
        self.publish_change(EventScope::Records, "undo");
        self.finish_record_mutation().await?;
        Ok(true)
    }

    async fn upsert_record(&self, mut record: LeaveRecord) -> Result<()> {
        let canonical = self.validate_identity(&record.rut)?;

        {
            let employees = lock(&self.inner.employees);
            let current = lock(&self.inner.records);
            let ignore = IgnoreSpec {
                record_id: (!record.id.is_empty()).then(|| record.id.clone()),
                ..Default::default()
            };
            if let Some(found) = conflict::find_conflict(
                &canonical,
                &record.display_name,
                &employees,
                &current,
                &ignore,
            ) {
                return Err(PermisyncError::IdentityConflict {
                    rut: rut::format_for_display(&canonical),
                    existing_name: found.existing_name,
                });
            }
        }

        self.snapshot();

        if record.id.is_empty() {
            record.id = format!(
                "{}-local-{}",
                record.partition.tag().to_lowercase(),
                Utc::now().timestamp_millis()
            );
        }
        if record.created_at.is_empty() {
            record.created_at = Utc::now().to_rfc3339();
        }

        {
            let mut current = lock(&self.inner.records);
            match current.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => current.push(record),
            }
        }

        self.publish_change(EventScope::Records, "upsert");
        self.finish_record_mutation().await
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        {
            let current = lock(&self.inner.records);
            if !current.iter().any(|r| r.id == id) {
                return Err(PermisyncError::RecordNotFound(id.to_string()));
            }
        }

        self.snapshot();
        lock(&self.inner.records).retain(|r| r.id != id);

        self.publish_change(EventScope::Records, "delete");
        // Deletion is final only once the overwrite push lands remotely
        self.finish_record_mutation().await
    }

    async fn replace_records(&self, new_records: Vec<LeaveRecord>) -> Result<()> {
        self.snapshot();

        let mut sorted = new_records;
        sorted.sort_by(|a, b| (self.inner.compare)(a, b));
        *lock(&self.inner.records) = sorted;

        self.publish_change(EventScope::Records, "bulk_import");
        self.finish_record_mutation().await
    }

    async fn upsert_employee(&self, employee: Employee) -> Result<()> {
        let canonical = self.validate_identity(&employee.rut)?;

        {
            let current_employees = lock(&self.inner.employees);
            let current_records = lock(&self.inner.records);
            if let Some(found) = conflict::find_conflict(
                &canonical,
                &employee.display_name,
                &current_employees,
                &current_records,
                &IgnoreSpec::default(),
            ) {
                return Err(match found.source {
                    ConflictSource::Employees => PermisyncError::DuplicateIdentity(format!(
                        "{} already belongs to \"{}\"",
                        rut::format_for_display(&canonical),
                        found.existing_name
                    )),
                    ConflictSource::Records => PermisyncError::IdentityConflict {
                        rut: rut::format_for_display(&canonical),
                        existing_name: found.existing_name,
                    },
                });
            }
        }

        {
            let mut current = lock(&self.inner.employees);
            let slot = current
                .iter_mut()
                .find(|e| rut::canonicalize(&e.rut).as_deref() == Some(canonical.as_str()));
            match slot {
                Some(existing) => *existing = employee,
                None => current.push(employee),
            }
        }

        self.publish_change(EventScope::Employees, "upsert");
        self.persist_backup();
        self.tolerate_transient(self.push_employees().await)
    }

    async fn delete_employee(&self, raw_rut: &str) -> Result<()> {
        let canonical = rut::canonicalize(raw_rut)
            .ok_or_else(|| PermisyncError::Validation(format!("malformed identity \"{}\"", raw_rut)))?;

        {
            let mut current = lock(&self.inner.employees);
            let before = current.len();
            current.retain(|e| rut::canonicalize(&e.rut).as_deref() != Some(canonical.as_str()));
            if current.len() == before {
                return Err(PermisyncError::RecordNotFound(raw_rut.to_string()));
            }
        }

        self.publish_change(EventScope::Employees, "delete");
        self.persist_backup();
        self.tolerate_transient(self.push_employees().await)
    }

    fn validate_identity(&self, raw: &str) -> Result<String> {
        let canonical = rut::canonicalize(raw)
            .ok_or_else(|| PermisyncError::Validation(format!("malformed identity \"{}\"", raw)))?;
        if !rut::validate_checksum(raw) {
            return Err(PermisyncError::Validation(format!(
                "identity \"{}\" fails its check digit",
                raw
            )));
        }
        Ok(canonical)
    }

    fn snapshot(&self) {
        let current = lock(&self.inner.records).clone();
        lock(&self.inner.undo).record(current);
    }

    async fn finish_record_mutation(&self) -> Result<()> {
        self.persist_backup();
        self.tolerate_transient(self.push_records().await)
    }

    /// Transient push failures keep the optimistic local mutation: a retry
    /// is already armed (or pending) and the caller was notified.
    fn tolerate_transient(&self, result: Result<()>) -> Result<()> {
        match result {
            Err(e) if e.is_transient() => Ok(()),
            other => other,
        }
    }

    // ---- events ----

    /// Attach the realtime event bus
    ///
    /// Local mutations publish to the bus; peer events (other origins, in
    /// the records/employees scopes) schedule a debounced re-fetch. The
    /// listener exits when the bus is dropped.
    pub fn attach_bus(&self, bus: &Arc<EventBus>) {
        *lock(&self.inner.bus) = Arc::downgrade(bus);

        let mut rx = bus.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => this.handle_peer_event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event listener lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn handle_peer_event(&self, event: SyncEvent) {
        if event.origin_client_id == self.inner.config.client_id {
            return;
        }
        if event.scope == EventScope::Admin {
            return;
        }

        tracing::debug!(
            scope = ?event.scope,
            action = %event.action,
            origin = %event.origin_client_id,
            "Peer change event"
        );

        let this = self.clone();
        self.inner.debounce.trigger(move || async move {
            tracing::info!("Peer changes settled, re-fetching");
            if let Err(e) = this.fetch_records().await {
                tracing::warn!(error = %e, "Debounced record re-fetch failed");
            }
            if let Err(e) = this.fetch_employees().await {
                tracing::warn!(error = %e, "Debounced employee re-fetch failed");
            }
        });
    }

    fn publish_change(&self, scope: EventScope, action: &str) {
        if let Some(bus) = lock(&self.inner.bus).upgrade() {
            bus.publish(SyncEvent::new(
                scope,
                action,
                self.inner.config.client_id.clone(),
            ));
        }
    }

    fn notify(&self, partition: Option<Partition>, message: &str) {
        tracing::warn!(?partition, %message, "Sync failure");
        let _ = self.inner.notices.send(SyncNotice {
            partition,
            message: message.to_string(),
        });
    }

    /// Write the current dataset to the backup store, fire-and-forget
    fn persist_backup(&self) {
        let Some(store) = self.inner.backup.as_ref().map(Arc::clone) else {
            return;
        };
        let backup_records = lock(&self.inner.records).clone();
        let backup_employees = lock(&self.inner.employees).clone();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.save_records(&backup_records) {
                tracing::warn!(error = %e, "Records backup write failed");
            }
            if let Err(e) = store.save_employees(&backup_employees) {
                tracing::warn!(error = %e, "Employees backup write failed");
            }
        });
    }
}
