//! Network dashboard controller
//!
//! Owns the four charts, the alert feed, the log counter and the
//! capture/sound/auto-update toggles. Refreshes come from three triggers
//! (initial load, debounced + throttled log-growth pushes, the optional
//! auto-update timer) and all funnel into [`DashboardController::update_all_data`],
//! which is single-flight.

use crate::bridge::BridgeAdapter;
use crate::chart::{parse_timestamp, ChartRenderer};
use crate::config::{Config, DashboardConfig};
use crate::coordinator::{AutoUpdate, Debouncer, SingleFlight, Throttle};
use crate::model::{Alert, LogCountUpdate};
use crate::progress::{Notifier, ToastKind};
use crate::signal::Subscription;
use crate::SentryResult;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const SIGNAL_KEY: &str = "dashboard";

/// How long the "Back Online" notice stays up
const BACK_ONLINE_NOTICE: Duration = Duration::from_secs(5);

/// `(alert_type, description prefix)` cycled by [`DashboardController::add_test_alert`]
const TEST_ALERTS: &[(&str, &str)] = &[
    ("intrusion_attempt", "Possible intrusion attempt from"),
    ("port_scan", "Port scan detected from"),
    ("malware_detection", "Potential malware activity from"),
    ("unusual_traffic", "Unusual network traffic pattern from"),
    ("authentication_failure", "Multiple authentication failures from"),
];

const TEST_SEVERITIES: &[&str] = &["low", "medium", "high", "critical"];

/// One rendered row of the alert feed
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRow {
    pub alert_type: String,
    pub description: String,
    pub source_ip: String,
    /// `HH:MM:SS`
    pub time: String,
    pub severity: String,
}

/// Everything the dashboard view renders
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub charts: ChartRenderer,
    pub alerts: Vec<AlertRow>,
    pub log_count: u64,
    pub capturing: bool,
    pub auto_update: bool,
    /// `None` until the backend has been asked
    pub sound_enabled: Option<bool>,
    /// A refresh is in flight
    pub loading: bool,
    pub online: bool,
    /// "Connection Issue" modal with a retry action
    pub connection_modal: bool,
    pub back_online_until: Option<Instant>,
    pub updates_completed: u64,
}

/// Bounded `HH:MM:SS` formatter; drops the oldest half when full
#[derive(Debug)]
pub struct TimeFormatCache {
    capacity: usize,
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl TimeFormatCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn format(&mut self, timestamp: &str) -> String {
        if timestamp.is_empty() {
            return String::new();
        }
        if let Some(hit) = self.entries.get(timestamp) {
            return hit.clone();
        }

        let formatted = parse_timestamp(timestamp)
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| timestamp.to_string());

        if self.entries.len() >= self.capacity {
            for _ in 0..self.capacity / 2 {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(timestamp.to_string(), formatted.clone());
        self.order.push_back(timestamp.to_string());
        formatted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Inner {
    bridge: BridgeAdapter,
    notifier: Notifier,
    config: DashboardConfig,
    state: Mutex<DashboardState>,
    time_cache: Mutex<TimeFormatCache>,
    flight: SingleFlight,
    throttle: Throttle,
    push_debounce: Debouncer,
    auto: AutoUpdate,
    test_alerts: AtomicUsize,
}

#[derive(Clone)]
pub struct DashboardController {
    inner: Arc<Inner>,
}

impl DashboardController {
    pub fn new(bridge: BridgeAdapter, notifier: Notifier, config: &Config) -> Self {
        let dashboard = config.dashboard.clone();
        let state = DashboardState {
            charts: ChartRenderer::new(&dashboard),
            alerts: Vec::new(),
            log_count: 0,
            capturing: false,
            auto_update: false,
            sound_enabled: None,
            loading: false,
            online: bridge.is_online(),
            connection_modal: false,
            back_online_until: None,
            updates_completed: 0,
        };

        Self {
            inner: Arc::new(Inner {
                time_cache: Mutex::new(TimeFormatCache::new(dashboard.time_cache_entries)),
                flight: SingleFlight::new(),
                throttle: Throttle::new(dashboard.push_throttle()),
                push_debounce: Debouncer::new(dashboard.push_debounce()),
                auto: AutoUpdate::new(dashboard.auto_update_interval()),
                test_alerts: AtomicUsize::new(0),
                state: Mutex::new(state),
                config: dashboard,
                bridge,
                notifier,
            }),
        }
    }

    pub fn state(&self) -> DashboardState {
        self.inner.state.lock().clone()
    }

    pub fn is_updating(&self) -> bool {
        self.inner.flight.is_busy()
    }

    // ====================================================================
    // Signals
    // ====================================================================

    /// Subscribe to alert pushes, log-count pushes and connectivity changes.
    /// Returns `false` when already connected.
    pub fn connect_signals(&self) -> bool {
        let hub = self.inner.bridge.signals();
        let Some(alerts) = hub.update_alerts.connect(SIGNAL_KEY) else {
            return false;
        };

        let this = self.clone();
        spawn_listener(alerts, move |payload: String| {
            let this = this.clone();
            async move { this.handle_new_alert(&payload).await }
        });

        if let Some(log_updates) = hub.update_network_log.connect(SIGNAL_KEY) {
            let this = self.clone();
            spawn_listener(log_updates, move |payload: String| {
                let handler = this.clone();
                this.inner.push_debounce.schedule(async move {
                    handler.handle_database_update(&payload).await;
                });
                async {}
            });
        }

        if let Some(connectivity) = self.inner.bridge.connectivity().connect(SIGNAL_KEY) {
            let this = self.clone();
            spawn_listener(connectivity, move |online: bool| {
                this.on_connectivity(online, Instant::now());
                async {}
            });
        }

        log::debug!("dashboard connected to backend signals");
        true
    }

    pub fn disconnect_signals(&self) {
        let hub = self.inner.bridge.signals();
        hub.update_alerts.disconnect(SIGNAL_KEY);
        hub.update_network_log.disconnect(SIGNAL_KEY);
        self.inner.bridge.connectivity().disconnect(SIGNAL_KEY);
        self.inner.push_debounce.cancel();
    }

    // ====================================================================
    // Refresh
    // ====================================================================

    /// Sound status plus a full refresh
    pub async fn initial_load(&self) {
        self.refresh_sound_status().await;
        self.update_all_data().await;
    }

    /// Fetch log count, timeline, traffic summary and alerts concurrently.
    ///
    /// Returns `false` without doing anything if a refresh is already in
    /// flight. Each fetch settles independently.
    pub async fn update_all_data(&self) -> bool {
        let Some(_guard) = self.inner.flight.try_begin() else {
            log::trace!("refresh already in flight, dropping trigger");
            return false;
        };
        self.inner.throttle.mark(Instant::now());
        self.inner.state.lock().loading = true;

        let bridge = &self.inner.bridge;
        let (count, timeline, summary, alerts) = tokio::join!(
            bridge.log_count(),
            bridge.network_data(),
            bridge.traffic_summary(),
            bridge.alerts(),
        );

        let mut failures = Vec::new();
        {
            let mut state = self.inner.state.lock();
            match count {
                Ok(count) => state.log_count = count,
                Err(e) => failures.push(e),
            }
            match timeline {
                Ok(points) => {
                    state.charts.render_timeline(&points);
                }
                Err(e) => failures.push(e),
            }
            match summary {
                Ok(summary) => {
                    state.charts.render_summary(&summary);
                }
                Err(e) => failures.push(e),
            }
        }
        match alerts {
            Ok(alerts) => self.apply_alerts(&alerts),
            Err(e) => failures.push(e),
        }

        for failure in &failures {
            log::warn!("dashboard refresh: {}", failure);
        }
        // Offline is already shown by the connectivity modal
        if let Some(first) = failures.first() {
            if self.inner.bridge.is_online() {
                self.inner.notifier.notify_titled(
                    "Update Error",
                    first.to_string(),
                    ToastKind::Warning,
                );
            }
        }

        let mut state = self.inner.state.lock();
        state.loading = false;
        state.updates_completed += 1;
        true
    }

    /// Refetch only the alert list
    pub async fn refresh_alerts(&self) -> SentryResult<()> {
        let alerts = self.inner.bridge.alerts().await?;
        self.apply_alerts(&alerts);
        Ok(())
    }

    /// An empty list leaves the current feed in place
    fn apply_alerts(&self, alerts: &[Alert]) {
        if alerts.is_empty() {
            return;
        }
        let rows: Vec<AlertRow> = {
            let mut cache = self.inner.time_cache.lock();
            alerts
                .iter()
                .take(self.inner.config.max_alerts)
                .map(|alert| AlertRow {
                    alert_type: alert.alert_type.clone(),
                    description: alert.description.clone(),
                    source_ip: alert.source_ip.clone(),
                    time: cache.format(&alert.timestamp),
                    severity: alert.severity.to_ascii_lowercase(),
                })
                .collect()
        };
        self.inner.state.lock().alerts = rows;
    }

    /// `updateNetworkLog` handler (after debounce)
    pub async fn handle_database_update(&self, payload: &str) {
        let update: LogCountUpdate = match serde_json::from_str(payload) {
            Ok(update) => update,
            Err(e) => {
                log::warn!("ignoring malformed log count push: {}", e);
                return;
            }
        };

        let auto_update = {
            let mut state = self.inner.state.lock();
            if update.count == 0 || update.count == state.log_count {
                return;
            }
            state.log_count = update.count;
            state.auto_update
        };

        let now = Instant::now();
        if self.inner.throttle.ready(now, auto_update) {
            self.update_all_data().await;
            self.inner.throttle.mark(now);
        }
    }

    /// `updateAlerts` handler
    pub async fn handle_new_alert(&self, payload: &str) {
        let alert: Alert = match serde_json::from_str(payload) {
            Ok(alert) => alert,
            Err(e) => {
                log::warn!("ignoring malformed alert push: {}", e);
                return;
            }
        };

        self.inner.notifier.notify_titled(
            alert.alert_type.clone(),
            alert.description.clone(),
            ToastKind::from_severity(&alert.severity),
        );

        if let Err(e) = self.refresh_alerts().await {
            log::warn!("refreshing alerts after push failed: {}", e);
        }
    }

    /// Put a synthetic alert at the top of the feed without touching the
    /// backend, for checking toasts and severity colours
    pub fn add_test_alert(&self) -> Alert {
        let n = self.inner.test_alerts.fetch_add(1, Ordering::Relaxed);
        let (alert_type, prefix) = TEST_ALERTS[n % TEST_ALERTS.len()];
        let severity = TEST_SEVERITIES[n % TEST_SEVERITIES.len()];
        let source_ip = format!("10.0.{}.{}", n / 254 % 256, n % 254 + 1);
        let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();

        let alert = Alert {
            alert_type: alert_type.to_string(),
            description: format!("{} {}", prefix, source_ip),
            source_ip,
            timestamp,
            severity: severity.to_string(),
            details: serde_json::json!({ "test_generated": true }),
        };

        let row = AlertRow {
            alert_type: alert.alert_type.clone(),
            description: alert.description.clone(),
            source_ip: alert.source_ip.clone(),
            time: self.inner.time_cache.lock().format(&alert.timestamp),
            severity: alert.severity.clone(),
        };
        {
            let mut state = self.inner.state.lock();
            state.alerts.insert(0, row);
            state.alerts.truncate(self.inner.config.max_alerts);
        }

        log::debug!("added test alert {} ({})", alert.alert_type, alert.severity);
        self.inner.notifier.notify(
            format!("Created {} test alert: {}", alert.severity, alert.description),
            ToastKind::Info,
        );
        alert
    }

    // ====================================================================
    // Toggles
    // ====================================================================

    pub async fn toggle_capture(&self) {
        let capturing = self.inner.state.lock().capturing;
        let bridge = &self.inner.bridge;

        if !capturing {
            match bridge.start_capture().await {
                Ok(true) => {
                    log::info!("network capture started");
                    self.inner.state.lock().capturing = true;
                    self.update_all_data().await;
                }
                Ok(false) => self.inner.notifier.notify_titled(
                    "Capture Error",
                    "Failed to start network capture",
                    ToastKind::Error,
                ),
                Err(e) => {
                    log::error!("starting capture: {}", e);
                    self.inner.notifier.notify_titled(
                        "Capture Error",
                        "Exception while starting capture",
                        ToastKind::Error,
                    );
                }
            }
        } else {
            match bridge.stop_capture().await {
                Ok(true) => {
                    log::info!("network capture stopped");
                    self.inner.state.lock().capturing = false;
                }
                Ok(false) => self.inner.notifier.notify_titled(
                    "Capture Error",
                    "Failed to stop network capture",
                    ToastKind::Error,
                ),
                Err(e) => {
                    log::error!("stopping capture: {}", e);
                    self.inner.notifier.notify_titled(
                        "Capture Error",
                        "Exception while stopping capture",
                        ToastKind::Error,
                    );
                }
            }
        }
    }

    pub async fn refresh_sound_status(&self) {
        match self.inner.bridge.sound_status().await {
            Ok(enabled) => self.inner.state.lock().sound_enabled = Some(enabled),
            Err(e) => log::warn!("reading sound status: {}", e),
        }
    }

    /// Read the current sound flag and flip it
    pub async fn toggle_sound(&self) {
        let bridge = &self.inner.bridge;
        let current = match bridge.sound_status().await {
            Ok(current) => current,
            Err(e) => {
                log::warn!("reading sound status: {}", e);
                return;
            }
        };

        match bridge.set_alert_sound(!current).await {
            Ok(_) => {
                self.inner.state.lock().sound_enabled = Some(!current);
                if !current {
                    self.inner.notifier.notify_titled(
                        "Alert Sound Enabled",
                        "You will now hear sound notifications for alerts.",
                        ToastKind::Info,
                    );
                } else {
                    self.inner.notifier.notify_titled(
                        "Alert Sound Disabled",
                        "Sound notifications have been turned off.",
                        ToastKind::Info,
                    );
                }
            }
            Err(e) => log::warn!("toggling alert sound: {}", e),
        }
    }

    /// Flip the fixed-period refresh timer; returns the new setting
    pub fn toggle_auto_update(&self) -> bool {
        let enabled = {
            let mut state = self.inner.state.lock();
            state.auto_update = !state.auto_update;
            state.auto_update
        };

        if enabled {
            let this = self.clone();
            self.inner.auto.start(move || {
                let this = this.clone();
                async move {
                    if !this.is_updating() {
                        this.update_all_data().await;
                    }
                }
            });
            log::info!(
                "auto-update every {:?}",
                self.inner.config.auto_update_interval()
            );
        } else {
            self.inner.auto.stop();
            log::info!("auto-update off");
        }
        enabled
    }

    pub fn auto_update_running(&self) -> bool {
        self.inner.auto.is_running()
    }

    // ====================================================================
    // Connectivity
    // ====================================================================

    pub fn on_connectivity(&self, online: bool, now: Instant) {
        let mut state = self.inner.state.lock();
        state.online = online;
        if online {
            state.connection_modal = false;
            state.back_online_until = Some(now + BACK_ONLINE_NOTICE);
        } else {
            state.connection_modal = true;
            state.back_online_until = None;
        }
    }

    /// Retry action of the "Connection Issue" modal
    pub async fn retry_connection(&self) {
        self.inner.state.lock().connection_modal = false;
        self.initial_load().await;
    }

    pub fn dismiss_connection_modal(&self) {
        self.inner.state.lock().connection_modal = false;
    }

    pub fn dismiss_back_online(&self) {
        self.inner.state.lock().back_online_until = None;
    }

    pub fn tick(&self, now: Instant) {
        let mut state = self.inner.state.lock();
        if state.back_online_until.map(|t| now >= t).unwrap_or(false) {
            state.back_online_until = None;
        }
    }

    pub fn shutdown(&self) {
        self.disconnect_signals();
        self.inner.auto.stop();
    }
}

/// Drive `handler` for every value delivered on `subscription`
pub(crate) fn spawn_listener<T, F, Fut>(mut subscription: Subscription<T>, handler: F)
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(value) = subscription.recv().await {
            handler(value).await;
        }
    });
}
