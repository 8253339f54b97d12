//! System log collection page

use crate::bridge::BridgeAdapter;
use crate::error::{SentryError, SentryResult};
use crate::progress::{LoadingOverlay, Notifier, ToastKind};
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// How often [`SystemLogController::wait_for_completion`] looks at the overlay
const WAIT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    NotConnected,
    /// Collection runs in the background; progress arrives on the overlay
    Started,
    /// Backend answered with something other than `started`
    Rejected,
    Failed,
}

/// Starts the backend's system log collection
pub struct SystemLogController {
    bridge: RwLock<Option<BridgeAdapter>>,
    notifier: Notifier,
}

impl SystemLogController {
    pub fn new(bridge: Option<BridgeAdapter>, notifier: Notifier) -> Self {
        Self {
            bridge: RwLock::new(bridge),
            notifier,
        }
    }

    /// Attach the bridge once the backend channel is up
    pub fn attach(&self, bridge: BridgeAdapter) {
        *self.bridge.write() = Some(bridge);
    }

    pub fn is_attached(&self) -> bool {
        self.bridge.read().is_some()
    }

    pub async fn fetch_system_logs(&self) -> FetchOutcome {
        let Some(bridge) = self.bridge.read().clone() else {
            self.notifier
                .notify(SentryError::NotConnected.to_string(), ToastKind::Error);
            return FetchOutcome::NotConnected;
        };

        self.notifier.show_loading("Starting system log collection...");
        match bridge.fetch_logs().await {
            Ok(ack) if ack.is_started() => {
                log::info!("system log collection started");
                self.notifier
                    .notify("Log collection started in background", ToastKind::Info);
                FetchOutcome::Started
            }
            Ok(ack) => {
                log::warn!("unexpected fetch_logs response: {:?}", ack);
                self.notifier.hide_loading();
                self.notifier
                    .notify("Unknown response from backend", ToastKind::Error);
                FetchOutcome::Rejected
            }
            Err(e) if e.is_parse() => {
                self.notifier.hide_loading();
                self.notifier.notify(e.to_string(), ToastKind::Error);
                FetchOutcome::Failed
            }
            Err(e) => {
                self.notifier.hide_loading();
                self.notifier
                    .notify(format!("Error fetching system logs: {}", e), ToastKind::Error);
                FetchOutcome::Failed
            }
        }
    }

    /// Follow a started collection until its overlay closes, calling
    /// `on_progress` on every change. Gives up and closes the overlay when
    /// nothing has changed for `stall`.
    pub async fn wait_for_completion<F>(&self, stall: Duration, mut on_progress: F) -> SentryResult<()>
    where
        F: FnMut(&LoadingOverlay),
    {
        let mut last: Option<(u32, Option<String>)> = None;
        let mut last_change = Instant::now();
        loop {
            let now = Instant::now();
            self.notifier.tick(now);
            let Some(overlay) = self.notifier.overlay() else {
                return Ok(());
            };

            let seen = (overlay.percentage, overlay.detail.clone());
            if last.as_ref() != Some(&seen) {
                on_progress(&overlay);
                last = Some(seen);
                last_change = now;
            } else if now.duration_since(last_change) >= stall {
                log::warn!("system log collection stalled at {}%", overlay.percentage);
                self.notifier.hide_loading();
                let err = SentryError::Timeout(format!(
                    "no progress from system log collection for {}s",
                    stall.as_secs()
                ));
                self.notifier.notify(err.to_string(), ToastKind::Error);
                return Err(err);
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Backend, MemoryBackend};
    use crate::config::NotificationConfig;
    use std::sync::Arc;

    fn notifier() -> Notifier {
        Notifier::new(&NotificationConfig::default())
    }

    #[tokio::test]
    async fn test_not_connected() {
        let notifier = notifier();
        let controller = SystemLogController::new(None, notifier.clone());

        assert_eq!(controller.fetch_system_logs().await, FetchOutcome::NotConnected);
        assert!(!notifier.is_loading());
        assert_eq!(
            notifier.last_message().as_deref(),
            Some("Backend not connected yet. Please try again.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_keeps_overlay_until_progress_completes() {
        let backend = Arc::new(MemoryBackend::new());
        let notifier = notifier();
        notifier.ensure_progress_handler(&backend.signals());
        let controller = SystemLogController::new(None, notifier.clone());
        controller.attach(BridgeAdapter::new(backend.clone()));

        assert_eq!(controller.fetch_system_logs().await, FetchOutcome::Started);
        assert!(notifier.is_loading());
        assert_eq!(
            notifier.toast().unwrap().message,
            "Log collection started in background"
        );

        // four 400 ms stages
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let overlay = notifier.overlay().unwrap();
        assert_eq!(overlay.percentage, 100);

        notifier.tick(tokio::time::Instant::now() + std::time::Duration::from_secs(1));
        assert!(!notifier.is_loading());
        assert_eq!(
            notifier.toast().unwrap().message,
            "Process completed successfully"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_follows_progress_to_completion() {
        let backend = Arc::new(MemoryBackend::new());
        let notifier = notifier();
        notifier.ensure_progress_handler(&backend.signals());
        let controller =
            SystemLogController::new(Some(BridgeAdapter::new(backend.clone())), notifier.clone());

        assert_eq!(controller.fetch_system_logs().await, FetchOutcome::Started);
        let mut seen = Vec::new();
        controller
            .wait_for_completion(Duration::from_secs(30), |overlay| seen.push(overlay.percentage))
            .await
            .unwrap();

        assert_eq!(seen.last(), Some(&100));
        assert!(!notifier.is_loading());
        assert_eq!(
            notifier.last_message().as_deref(),
            Some("Process completed successfully")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_when_progress_stalls() {
        let backend = Arc::new(MemoryBackend::new());
        // acknowledges the job but never finishes it
        backend.set_payload("fetch_logs", r#"{"status":"started"}"#);
        let notifier = notifier();
        notifier.ensure_progress_handler(&backend.signals());
        let controller =
            SystemLogController::new(Some(BridgeAdapter::new(backend.clone())), notifier.clone());

        assert_eq!(controller.fetch_system_logs().await, FetchOutcome::Started);
        backend.emit_progress(40, "Reading security events...");

        let mut seen = Vec::new();
        let err = controller
            .wait_for_completion(Duration::from_secs(5), |overlay| seen.push(overlay.percentage))
            .await
            .unwrap_err();

        assert!(matches!(err, SentryError::Timeout(_)));
        assert_eq!(seen.last(), Some(&40));
        assert!(!notifier.is_loading());
        assert_eq!(
            notifier.last_message().as_deref(),
            Some("Timed out: no progress from system log collection for 5s")
        );
    }

    #[tokio::test]
    async fn test_unknown_status_and_transport_error() {
        let backend = Arc::new(MemoryBackend::new());
        let notifier = notifier();
        let controller =
            SystemLogController::new(Some(BridgeAdapter::new(backend.clone())), notifier.clone());

        backend.set_payload("fetch_logs", r#"{"status":"queued"}"#);
        assert_eq!(controller.fetch_system_logs().await, FetchOutcome::Rejected);
        assert!(!notifier.is_loading());
        assert_eq!(
            notifier.last_message().as_deref(),
            Some("Unknown response from backend")
        );

        backend.clear_payload("fetch_logs");
        backend.fail_method("fetch_logs", "connection refused");
        assert_eq!(controller.fetch_system_logs().await, FetchOutcome::Failed);
        assert!(notifier
            .last_message()
            .unwrap()
            .starts_with("Error fetching system logs:"));
    }
}
