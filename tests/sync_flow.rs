//! End-to-end orchestrator behavior over a scripted mock remote

use async_trait::async_trait;
use permisync::backup::BackupStore;
use permisync::config::SyncConfig;
use permisync::records::{Employee, LeaveRecord, Partition};
use permisync::remote::RemoteApi;
use permisync::sync::{
    default_date_comparator, EventBus, EventScope, FetchOutcome, RecordChange, SyncEvent,
    SyncOrchestrator, SyncState,
};
use permisync::{PermisyncError, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Default)]
struct MockApi {
    pa_rows: Mutex<Vec<Vec<String>>>,
    fl_rows: Mutex<Vec<Vec<String>>>,
    employee_rows: Mutex<Vec<Vec<String>>>,

    fail_fetch_pa: AtomicBool,
    fail_fetch_fl: AtomicBool,
    fail_push: AtomicBool,
    fail_push_pa: AtomicBool,
    fetch_delay_ms: AtomicU64,

    fetch_count: AtomicU32,
    push_count: AtomicU32,
    pushed_pa: Mutex<Option<Vec<Vec<String>>>>,
    pushed_fl: Mutex<Option<Vec<Vec<String>>>>,
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn fetch_rows(&self, partition: Partition) -> Result<Vec<Vec<String>>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }

        let failing = match partition {
            Partition::Administrative => &self.fail_fetch_pa,
            Partition::Legal => &self.fail_fetch_fl,
        };
        if failing.load(Ordering::SeqCst) {
            return Err(PermisyncError::Network("connection reset".to_string()));
        }

        let rows = match partition {
            Partition::Administrative => self.pa_rows.lock().unwrap().clone(),
            Partition::Legal => self.fl_rows.lock().unwrap().clone(),
        };
        Ok(rows)
    }

    async fn fetch_employee_rows(&self) -> Result<Vec<Vec<String>>> {
        Ok(self.employee_rows.lock().unwrap().clone())
    }

    async fn push_rows(&self, partition: Partition, rows: Vec<Vec<String>>) -> Result<()> {
        self.push_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(PermisyncError::Remote("write rejected".to_string()));
        }
        if partition == Partition::Administrative && self.fail_push_pa.load(Ordering::SeqCst) {
            return Err(PermisyncError::Remote("write rejected".to_string()));
        }

        match partition {
            Partition::Administrative => *self.pushed_pa.lock().unwrap() = Some(rows),
            Partition::Legal => *self.pushed_fl.lock().unwrap() = Some(rows),
        }
        Ok(())
    }

    async fn push_employee_rows(&self, _rows: Vec<Vec<String>>) -> Result<()> {
        Ok(())
    }
}

fn pa_row(rut: &str, name: &str, act: &str, decree: &str) -> Vec<String> {
    vec![
        rut.to_string(),
        name.to_string(),
        act.to_string(),
        decree.to_string(),
        "2026-02-01".to_string(),
        "2026-02-03".to_string(),
        "3".to_string(),
        "6".to_string(),
        "2026-01-15T09:00:00Z".to_string(),
    ]
}

fn test_config() -> SyncConfig {
    SyncConfig::default()
        .with_client_id("test-client")
        .with_retry_delay(Duration::from_millis(40))
        .with_debounce_window(Duration::from_millis(30))
}

fn orchestrator_over(api: Arc<MockApi>) -> SyncOrchestrator {
    SyncOrchestrator::new(test_config(), api)
}

fn valid_record(id: &str) -> LeaveRecord {
    let mut record = LeaveRecord::new(Partition::Administrative, "12345678-5", "Juan Pérez");
    record.id = id.to_string();
    record.start_date = "2026-02-01".to_string();
    record.created_at = "2026-01-15T09:00:00Z".to_string();
    record
}

#[tokio::test]
async fn fetch_merges_both_partitions() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];
    *api.fl_rows.lock().unwrap() = vec![pa_row("7654321-4", "Ana Soto", "55", "2026-01-05")];

    let orchestrator = orchestrator_over(Arc::clone(&api));
    let outcome = orchestrator.fetch_records().await.unwrap();

    assert!(matches!(outcome, FetchOutcome::Remote { .. }));
    let records = orchestrator.records();
    assert_eq!(records.len(), 2);
    // sorted ascending by start date by the default comparator
    assert!(records[0].start_date <= records[1].start_date);

    for partition in Partition::ALL {
        let status = orchestrator.status(partition);
        assert_eq!(status.state, SyncState::Idle);
        assert!(status.last_success.is_some());
    }
}

#[tokio::test]
async fn partition_failure_never_masks_the_other() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];
    api.fail_fetch_fl.store(true, Ordering::SeqCst);

    let orchestrator = orchestrator_over(Arc::clone(&api));
    let outcome = orchestrator.fetch_records().await.unwrap();

    assert!(matches!(outcome, FetchOutcome::Remote { .. }));
    assert_eq!(orchestrator.records().len(), 1);

    let pa = orchestrator.status(Partition::Administrative);
    assert_eq!(pa.state, SyncState::Idle);
    assert!(pa.last_success.is_some());

    let fl = orchestrator.status(Partition::Legal);
    assert!(fl.is_error());
    assert!(fl.last_error.unwrap().contains("connection reset"));
}

#[tokio::test]
async fn push_failure_arms_exactly_one_retry() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];

    let orchestrator = orchestrator_over(Arc::clone(&api));
    orchestrator.fetch_records().await.unwrap();

    api.fail_push.store(true, Ordering::SeqCst);
    assert!(orchestrator.push_records().await.is_err());
    assert!(orchestrator.retry_armed());
    assert_eq!(api.push_count.load(Ordering::SeqCst), 1);

    // A second failed attempt re-arms exactly one new timer
    assert!(orchestrator.push_records().await.is_err());
    assert!(orchestrator.retry_armed());
    assert_eq!(api.push_count.load(Ordering::SeqCst), 2);

    // Let the single armed retry fire against a healthy remote
    api.fail_push.store(false, Ordering::SeqCst);
    sleep(Duration::from_millis(150)).await;

    assert_eq!(
        api.push_count.load(Ordering::SeqCst),
        3,
        "exactly one retry fired"
    );
    assert!(api.pushed_pa.lock().unwrap().is_some());
    assert!(!orchestrator.retry_armed());
}

#[tokio::test]
async fn offline_push_resumes_on_reconnect() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];

    let orchestrator = orchestrator_over(Arc::clone(&api));
    orchestrator.fetch_records().await.unwrap();

    orchestrator.set_online(false);
    orchestrator.push_records().await.unwrap();

    assert!(orchestrator.retry_pending());
    assert!(!orchestrator.retry_armed(), "no timer while offline");
    assert_eq!(api.push_count.load(Ordering::SeqCst), 0);

    orchestrator.set_online(true);
    sleep(Duration::from_millis(80)).await;

    assert_eq!(api.push_count.load(Ordering::SeqCst), 1, "push resumed automatically");
    assert!(api.pushed_pa.lock().unwrap().is_some());
    assert!(!orchestrator.retry_pending());
}

#[tokio::test]
async fn empty_partition_short_circuits_push() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];

    let orchestrator = orchestrator_over(Arc::clone(&api));
    orchestrator.fetch_records().await.unwrap();

    orchestrator.push_records().await.unwrap();

    assert!(api.pushed_pa.lock().unwrap().is_some());
    assert!(
        api.pushed_fl.lock().unwrap().is_none(),
        "empty partition sends no request"
    );
    assert_eq!(api.push_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_partition_push_failure_leaves_other_successful() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];
    *api.fl_rows.lock().unwrap() = vec![pa_row("7654321-4", "Ana Soto", "55", "2026-01-05")];

    let orchestrator = orchestrator_over(Arc::clone(&api));
    orchestrator.fetch_records().await.unwrap();

    api.fail_push_pa.store(true, Ordering::SeqCst);
    let result = orchestrator.push_records().await;
    assert!(result.is_err(), "one failed partition fails the whole push");

    let fl = orchestrator.status(Partition::Legal);
    assert_eq!(fl.state, SyncState::Idle);
    assert!(fl.last_success.is_some());
    assert!(api.pushed_fl.lock().unwrap().is_some());

    let pa = orchestrator.status(Partition::Administrative);
    assert!(pa.is_error());

    orchestrator.shutdown();
}

#[tokio::test]
async fn undo_stack_bounded_and_durable() {
    let api = Arc::new(MockApi::default());
    let orchestrator = orchestrator_over(Arc::clone(&api));

    for i in 0..11 {
        orchestrator
            .apply(RecordChange::UpsertRecord(valid_record(&format!("r-{}", i))))
            .await
            .unwrap();
    }

    assert_eq!(orchestrator.undo_depth(), 10, "oldest snapshot evicted");
    assert_eq!(orchestrator.records().len(), 11);
    let pushes_before = api.push_count.load(Ordering::SeqCst);

    assert!(orchestrator.undo().await.unwrap());
    assert_eq!(orchestrator.records().len(), 10);
    assert!(
        api.push_count.load(Ordering::SeqCst) > pushes_before,
        "undo pushes the restored state"
    );
    let pushed = api.pushed_pa.lock().unwrap().clone().unwrap();
    assert_eq!(pushed.len(), 10);
}

#[tokio::test]
async fn degraded_fallback_serves_backup() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];

    let orchestrator = SyncOrchestrator::with_options(
        test_config(),
        Arc::clone(&api) as Arc<dyn RemoteApi>,
        Some(BackupStore::open_in_memory().unwrap()),
        Arc::new(default_date_comparator),
    );

    orchestrator.fetch_records().await.unwrap();
    // backup writes are fire-and-forget; give them a moment to land
    sleep(Duration::from_millis(80)).await;

    api.fail_fetch_pa.store(true, Ordering::SeqCst);
    api.fail_fetch_fl.store(true, Ordering::SeqCst);

    let outcome = orchestrator.fetch_records().await.unwrap();
    match outcome {
        FetchOutcome::Degraded { last_backup } => assert!(last_backup.is_some()),
        other => panic!("expected degraded outcome, got {:?}", other),
    }
    assert_eq!(orchestrator.records().len(), 1);
}

#[tokio::test]
async fn offline_without_backup_reports_no_data() {
    let api = Arc::new(MockApi::default());
    let orchestrator = orchestrator_over(api);

    orchestrator.set_online(false);
    let result = orchestrator.fetch_records().await;

    assert!(matches!(result, Err(PermisyncError::NoLocalData)));
}

#[tokio::test]
async fn stale_fetch_is_superseded() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];
    api.fetch_delay_ms.store(100, Ordering::SeqCst);

    let orchestrator = orchestrator_over(Arc::clone(&api));

    let slow = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.fetch_records().await })
    };
    sleep(Duration::from_millis(20)).await;

    // The newer fetch completes quickly and wins
    api.fetch_delay_ms.store(0, Ordering::SeqCst);
    let fresh = orchestrator.fetch_records().await.unwrap();
    assert!(matches!(fresh, FetchOutcome::Remote { .. }));

    let stale = slow.await.unwrap().unwrap();
    assert!(matches!(stale, FetchOutcome::Superseded));
    assert_eq!(orchestrator.records().len(), 1);
}

#[tokio::test]
async fn validation_rejects_before_any_network_call() {
    let api = Arc::new(MockApi::default());
    let orchestrator = orchestrator_over(Arc::clone(&api));

    let mut bad = valid_record("r-1");
    bad.rut = "not-a-rut".to_string();
    let result = orchestrator.apply(RecordChange::UpsertRecord(bad)).await;
    assert!(matches!(result, Err(PermisyncError::Validation(_))));

    let mut wrong_digit = valid_record("r-2");
    wrong_digit.rut = "12345678-9".to_string();
    let result = orchestrator
        .apply(RecordChange::UpsertRecord(wrong_digit))
        .await;
    assert!(matches!(result, Err(PermisyncError::Validation(_))));

    assert_eq!(api.push_count.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.undo_depth(), 0, "rejected mutations never snapshot");
}

#[tokio::test]
async fn conflicting_name_rejects_mutation() {
    let api = Arc::new(MockApi::default());
    *api.employee_rows.lock().unwrap() = vec![vec![
        "12345678-5".to_string(),
        "Juan Pérez".to_string(),
        String::new(),
    ]];

    let orchestrator = orchestrator_over(Arc::clone(&api));
    orchestrator.fetch_employees().await.unwrap();

    let mut other_name = valid_record("r-1");
    other_name.display_name = "Pedro Soto".to_string();
    let result = orchestrator
        .apply(RecordChange::UpsertRecord(other_name))
        .await;
    assert!(matches!(result, Err(PermisyncError::IdentityConflict { .. })));

    // Accent/case variance of the same name is not a conflict
    let mut same_name = valid_record("r-2");
    same_name.display_name = "JUAN PEREZ".to_string();
    orchestrator
        .apply(RecordChange::UpsertRecord(same_name))
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_employee_identity_rejected() {
    let api = Arc::new(MockApi::default());
    *api.employee_rows.lock().unwrap() = vec![vec![
        "12345678-5".to_string(),
        "Juan Pérez".to_string(),
        String::new(),
    ]];

    let orchestrator = orchestrator_over(Arc::clone(&api));
    orchestrator.fetch_employees().await.unwrap();

    let intruder = Employee {
        rut: "12.345.678-5".to_string(),
        display_name: "Pedro Soto".to_string(),
        department: None,
    };
    let result = orchestrator
        .apply(RecordChange::UpsertEmployee(intruder))
        .await;
    assert!(matches!(result, Err(PermisyncError::DuplicateIdentity(_))));

    // Same identity with the same name is an update, not a duplicate
    let update = Employee {
        rut: "12345678-5".to_string(),
        display_name: "Juan Pérez".to_string(),
        department: Some("Finanzas".to_string()),
    };
    orchestrator
        .apply(RecordChange::UpsertEmployee(update))
        .await
        .unwrap();
    assert_eq!(
        orchestrator.employees()[0].department.as_deref(),
        Some("Finanzas")
    );
}

#[tokio::test]
async fn peer_event_burst_collapses_into_one_refetch() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];

    let orchestrator = orchestrator_over(Arc::clone(&api));
    let bus = Arc::new(EventBus::default());
    orchestrator.attach_bus(&bus);

    let baseline = api.fetch_count.load(Ordering::SeqCst);
    for i in 0..5 {
        bus.publish(
            SyncEvent::new(EventScope::Records, "upsert", "peer-client")
                .with_metadata(serde_json::json!({ "n": i })),
        );
        sleep(Duration::from_millis(3)).await;
    }

    sleep(Duration::from_millis(200)).await;

    let fetches = api.fetch_count.load(Ordering::SeqCst) - baseline;
    assert_eq!(fetches, 2, "one re-fetch (both partitions), not one per event");
}

#[tokio::test]
async fn own_events_do_not_trigger_refetch() {
    let api = Arc::new(MockApi::default());
    let orchestrator = orchestrator_over(Arc::clone(&api));
    let bus = Arc::new(EventBus::default());
    orchestrator.attach_bus(&bus);

    bus.publish(SyncEvent::new(EventScope::Records, "upsert", "test-client"));
    sleep(Duration::from_millis(100)).await;

    assert_eq!(api.fetch_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failure_notices_reach_subscribers() {
    let api = Arc::new(MockApi::default());
    *api.pa_rows.lock().unwrap() = vec![pa_row("12345678-5", "Juan Pérez", "101", "2026-01-10")];
    api.fail_fetch_pa.store(true, Ordering::SeqCst);

    let orchestrator = orchestrator_over(Arc::clone(&api));
    let mut notices = orchestrator.subscribe_notices();

    let _ = orchestrator.fetch_records().await;

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.partition, Some(Partition::Administrative));
    assert!(notice.message.contains("fetch failed"));
}
