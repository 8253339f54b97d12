// End-to-end scenarios against the in-memory backend
use netsentry_core::bridge::{JobMode, MemoryBackend};
use netsentry_core::model::{Alert, AnalysisKind};
use netsentry_core::navigator::{file_key, CardBody, Listing, View};
use netsentry_core::progress::ToastKind;
use netsentry_core::{Config, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn session(backend: &Arc<MemoryBackend>) -> Session {
    Session::new(backend.clone(), Config::default())
}

// ============================================================================
// Dashboard
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_updates_are_single_flight() {
    let backend = Arc::new(MemoryBackend::demo());
    backend.set_latency(Duration::from_millis(200));
    let session = session(&backend);

    let (first, second) = tokio::join!(
        session.dashboard.update_all_data(),
        session.dashboard.update_all_data()
    );
    assert!(first != second);
    assert_eq!(backend.call_count("get_network_data"), 1);
    assert_eq!(session.dashboard.state().updates_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_log_growth_push_is_debounced_and_throttled() {
    let backend = Arc::new(MemoryBackend::new());
    let session = session(&backend);
    session.start().await;
    assert_eq!(session.dashboard.state().updates_completed, 1);

    // inside the throttle window: counter moves, no refresh
    backend.simulate_traffic(5);
    sleep(Duration::from_millis(600)).await;
    let state = session.dashboard.state();
    assert_eq!(state.log_count, 5);
    assert_eq!(state.updates_completed, 1);

    sleep(Duration::from_secs(2)).await;
    backend.simulate_traffic(3);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(session.dashboard.state().updates_completed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_alert_push_toasts_and_refetches_alerts() {
    let backend = Arc::new(MemoryBackend::new());
    let session = session(&backend);
    session.start().await;
    let before = backend.call_count("get_alert_data");

    backend.push_alert(Alert {
        alert_type: "Port Scan".to_string(),
        description: "45 ports scanned".to_string(),
        source_ip: "10.0.0.9".to_string(),
        timestamp: "2024-01-02T10:14:03".to_string(),
        severity: "High".to_string(),
        ..Default::default()
    });
    sleep(Duration::from_millis(50)).await;

    let toast = session.notifier.toast().unwrap();
    assert_eq!(toast.title.as_deref(), Some("Port Scan"));
    assert_eq!(toast.kind, ToastKind::Error);
    assert_eq!(backend.call_count("get_alert_data"), before + 1);

    let alerts = session.dashboard.state().alerts;
    assert_eq!(alerts[0].time, "10:14:03");
    assert_eq!(alerts[0].severity, "high");
}

#[tokio::test(start_paused = true)]
async fn test_offline_then_back_online() {
    let backend = Arc::new(MemoryBackend::demo());
    let session = session(&backend);
    session.start().await;

    backend.fail_method("get_log_count", "connection refused");
    session.dashboard.update_all_data().await;
    sleep(Duration::from_millis(10)).await;
    let state = session.dashboard.state();
    assert!(!state.online);
    assert!(state.connection_modal);

    backend.restore_method("get_log_count");
    session.dashboard.retry_connection().await;
    sleep(Duration::from_millis(10)).await;
    let state = session.dashboard.state();
    assert!(state.online);
    assert!(!state.connection_modal);
    assert!(state.back_online_until.is_some());

    session.tick(Instant::now() + Duration::from_secs(6));
    assert!(session.dashboard.state().back_online_until.is_none());
}

// ============================================================================
// Log browser
// ============================================================================

#[tokio::test]
async fn test_first_listed_folder_is_opened() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_file("2024-01-01", "auth.log", "a");
    backend.add_folder("2024-01-02");
    backend.set_payload("list_folders", r#"["2024-01-01","2024-01-02"]"#);
    let session = session(&backend);

    session.navigator.load_folders().await;
    let state = session.navigator.state();
    assert_eq!(
        state.view,
        View::Files {
            folder: "2024-01-01".to_string()
        }
    );
    assert_eq!(state.files, Listing::Loaded(vec!["auth.log".to_string()]));
}

#[tokio::test]
async fn test_open_twice_then_close_last() {
    let backend = Arc::new(MemoryBackend::demo());
    let session = session(&backend);
    let nav = &session.navigator;

    nav.load_files("2024-01-01").await;
    nav.open_file("2024-01-01", "auth.log").await;
    nav.open_file("2024-01-01", "auth.log").await;

    let state = nav.state();
    assert_eq!(state.cards.len(), 1);
    assert!(state.cards[0].highlight_until.is_some());

    nav.close_file(&file_key("2024-01-01", "auth.log")).await;
    let state = nav.state();
    assert!(state.cards.is_empty());
    assert_eq!(
        state.view,
        View::Files {
            folder: "2024-01-01".to_string()
        }
    );
}

#[tokio::test]
async fn test_unreadable_file_shows_error_card() {
    let backend = Arc::new(MemoryBackend::demo());
    backend.set_payload("read_log_file", r#"{"success":false,"message":"not found"}"#);
    let session = session(&backend);

    session.navigator.open_file("2024-01-01", "auth.log").await;
    let state = session.navigator.state();
    let card = &state.cards[0];
    assert_eq!(
        card.body,
        CardBody::Failed {
            message: "Error: not found".to_string()
        }
    );
    assert!(card.visible_lines().is_empty());
    assert_eq!(card.footer(), "Failed to load file");
}

// ============================================================================
// Jobs and progress
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_background_scan_closes_overlay_on_progress() {
    let backend = Arc::new(MemoryBackend::demo());
    backend.set_job_mode(JobMode::Background);
    let session = session(&backend);
    session.start().await;

    session.navigator.load_files("2024-01-01").await;
    assert_eq!(session.navigator.open_all("2024-01-01").await, 2);

    session.analysis.run(AnalysisKind::Anomaly).await;
    assert_eq!(
        session.notifier.toast().unwrap().message,
        "Anomaly scan started in background"
    );
    assert!(session.notifier.is_loading());

    // two files, three 400 ms steps
    sleep(Duration::from_millis(1300)).await;
    assert_eq!(session.notifier.overlay().unwrap().percentage, 100);

    let now = Instant::now();
    session.tick(now);
    assert!(session.notifier.is_loading());
    session.tick(now + Duration::from_secs(1));
    assert!(!session.notifier.is_loading());
    assert_eq!(
        session.notifier.toast().unwrap().message,
        "Process completed successfully"
    );
    assert!(!session.analysis.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_progress_pushes_drive_overlay() {
    let backend = Arc::new(MemoryBackend::new());
    let session = session(&backend);
    session.start().await;

    session.notifier.show_loading("Starting Deep Analysis");
    backend.emit_progress(50, "Scanning...");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(session.notifier.overlay().unwrap().percentage, 50);

    backend.emit_progress(100, "Done");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(session.notifier.overlay().unwrap().percentage, 100);

    session.tick(Instant::now() + Duration::from_secs(1));
    assert!(!session.notifier.is_loading());
    let toast = session.notifier.toast().unwrap();
    assert_eq!(toast.kind, ToastKind::Success);
}

#[tokio::test(start_paused = true)]
async fn test_system_log_collection() {
    let backend = Arc::new(MemoryBackend::new());
    let session = session(&backend);
    session.start().await;

    session.system_log.fetch_system_logs().await;
    assert!(session.notifier.is_loading());

    sleep(Duration::from_secs(2)).await;
    session.tick(Instant::now() + Duration::from_secs(1));
    assert!(!session.notifier.is_loading());
    assert_eq!(backend.call_count("fetch_logs"), 1);
}
