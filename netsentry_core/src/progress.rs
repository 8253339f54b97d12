//! Toasts and the loading overlay
//!
//! There is exactly one toast slot: a new toast replaces the previous one and
//! restarts its timer. The loading overlay is driven by `progressSignal`
//! pushes. Deadlines only move on [`Notifier::tick`], so a renderer sees the
//! same state for the same clock.

use crate::config::NotificationConfig;
use crate::signal::{ProgressUpdate, SignalHub};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Recent toasts kept for the status history
const HISTORY_LEN: usize = 50;

/// Subscriber key used for the progress handler
const PROGRESS_KEY: &str = "notifier";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Colour override for risk-bearing toasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTint {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskTint {
    /// Case-insensitive; anything unrecognised yields `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "critical" => Some(RiskTint::Critical),
            "high" => Some(RiskTint::High),
            "medium" => Some(RiskTint::Medium),
            "low" => Some(RiskTint::Low),
            _ => None,
        }
    }
}

impl ToastKind {
    /// Map a backend severity string onto a toast kind
    pub fn from_severity(severity: &str) -> Self {
        match severity.to_ascii_lowercase().as_str() {
            "critical" | "high" | "error" => ToastKind::Error,
            "medium" | "warning" => ToastKind::Warning,
            "success" => ToastKind::Success,
            _ => ToastKind::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    /// Monotonic, so renderers can tell a replaced toast from the same one
    pub seq: u64,
    pub title: Option<String>,
    pub message: String,
    pub kind: ToastKind,
    pub risk: Option<RiskTint>,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadingOverlay {
    pub message: String,
    pub percentage: u32,
    /// Latest message from the progress signal
    pub detail: Option<String>,
}

struct Completion {
    at: Instant,
    kind: ToastKind,
    message: String,
}

struct NotifierState {
    toast: Option<Toast>,
    overlay: Option<LoadingOverlay>,
    completion: Option<Completion>,
    history: VecDeque<Toast>,
    next_seq: u64,
    toast_duration: Duration,
    grace: Duration,
}

/// Shared toast/overlay surface
#[derive(Clone)]
pub struct Notifier {
    state: Arc<Mutex<NotifierState>>,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState {
                toast: None,
                overlay: None,
                completion: None,
                history: VecDeque::with_capacity(HISTORY_LEN),
                next_seq: 1,
                toast_duration: config.toast_duration(),
                grace: config.progress_close_grace(),
            })),
        }
    }

    // ====================================================================
    // Toasts
    // ====================================================================

    pub fn notify(&self, message: impl Into<String>, kind: ToastKind) {
        self.push(None, message.into(), kind, None);
    }

    pub fn notify_titled(&self, title: impl Into<String>, message: impl Into<String>, kind: ToastKind) {
        self.push(Some(title.into()), message.into(), kind, None);
    }

    pub fn notify_risk(&self, message: impl Into<String>, kind: ToastKind, risk: Option<RiskTint>) {
        self.push(None, message.into(), kind, risk);
    }

    fn push(&self, title: Option<String>, message: String, kind: ToastKind, risk: Option<RiskTint>) {
        let mut state = self.state.lock();
        let toast = Toast {
            seq: state.next_seq,
            title,
            message,
            kind,
            risk,
            expires_at: Instant::now() + state.toast_duration,
        };
        state.next_seq += 1;
        log::debug!("toast {:?}: {}", toast.kind, toast.message);

        if state.history.len() == HISTORY_LEN {
            state.history.pop_front();
        }
        state.history.push_back(toast.clone());
        state.toast = Some(toast);
    }

    /// The toast currently on screen
    pub fn toast(&self) -> Option<Toast> {
        self.state.lock().toast.clone()
    }

    pub fn dismiss(&self) {
        self.state.lock().toast = None;
    }

    /// Recent toasts, oldest first
    pub fn history(&self) -> Vec<Toast> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Most recent toast message, including ones already replaced or expired
    pub fn last_message(&self) -> Option<String> {
        self.state.lock().history.back().map(|t| t.message.clone())
    }

    // ====================================================================
    // Loading overlay
    // ====================================================================

    pub fn show_loading(&self, message: impl Into<String>) {
        let mut state = self.state.lock();
        state.completion = None;
        state.overlay = Some(LoadingOverlay {
            message: message.into(),
            percentage: 0,
            detail: None,
        });
    }

    pub fn hide_loading(&self) {
        self.state.lock().overlay = None;
    }

    pub fn overlay(&self) -> Option<LoadingOverlay> {
        self.state.lock().overlay.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().overlay.is_some()
    }

    /// Apply one progress push. At 100 % the overlay is scheduled to close
    /// after the grace period, followed by an outcome toast.
    pub fn update_progress(&self, update: &ProgressUpdate, now: Instant) {
        let mut state = self.state.lock();
        let percentage = update.percentage.min(100);

        if let Some(overlay) = state.overlay.as_mut() {
            overlay.percentage = percentage;
            if !update.message.is_empty() {
                overlay.detail = Some(update.message.clone());
            }
        }

        if percentage >= 100 {
            let (kind, message) = if update.message.contains("Error:") {
                (ToastKind::Error, update.message.clone())
            } else {
                (ToastKind::Success, "Process completed successfully".to_string())
            };
            state.completion = Some(Completion {
                at: now + state.grace,
                kind,
                message,
            });
        }
    }

    /// Advance toast expiry and overlay close deadlines
    pub fn tick(&self, now: Instant) {
        let completion = {
            let mut state = self.state.lock();
            if state
                .toast
                .as_ref()
                .map(|t| now >= t.expires_at)
                .unwrap_or(false)
            {
                state.toast = None;
            }
            match state.completion.as_ref() {
                Some(c) if now >= c.at => {
                    state.overlay = None;
                    state.completion.take()
                }
                _ => None,
            }
        };

        if let Some(completion) = completion {
            self.notify(completion.message, completion.kind);
        }
    }

    /// Subscribe to `progressSignal` once per hub; later calls are no-ops.
    ///
    /// Needs a running tokio runtime; returns whether a handler was installed.
    pub fn ensure_progress_handler(&self, hub: &Arc<SignalHub>) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("no async runtime, progress updates will not be shown");
            return false;
        };
        let Some(mut subscription) = hub.progress.connect(PROGRESS_KEY) else {
            return false;
        };

        let notifier = self.clone();
        runtime.spawn(async move {
            while let Some(update) = subscription.recv().await {
                notifier.update_progress(&update, Instant::now());
            }
        });
        true
    }
}
