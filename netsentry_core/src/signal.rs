//! Backend push signals
//!
//! A [`Signal`] is a one-producer, many-consumer event channel with explicit
//! connect/disconnect. Subscribers are keyed by name, and connecting a key that
//! already has a live subscriber is refused, which gives callers an
//! idempotent "register once" guard. Delivery is fire-and-forget over
//! unbounded channels; there is no backpressure.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// `progressSignal(percentage, message)` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub percentage: u32,
    #[serde(default)]
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(percentage: u32, message: impl Into<String>) -> Self {
        Self {
            percentage,
            message: message.into(),
        }
    }
}

struct Subscriber<T> {
    key: String,
    tx: mpsc::UnboundedSender<T>,
}

/// Named push channel
pub struct Signal<T> {
    name: &'static str,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

/// Receiving end handed out by [`Signal::connect`]
pub struct Subscription<T> {
    key: String,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T: Clone + Send + 'static> Signal<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Subscribe under `key`. Returns `None` if `key` is already connected.
    ///
    /// A subscriber whose [`Subscription`] was dropped no longer counts as
    /// connected, so its key can be reused.
    pub fn connect(&self, key: &str) -> Option<Subscription<T>> {
        let mut subs = self.subscribers.lock();
        subs.retain(|s| !s.tx.is_closed());

        if subs.iter().any(|s| s.key == key) {
            log::debug!("signal '{}': '{}' already connected", self.name, key);
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        subs.push(Subscriber {
            key: key.to_string(),
            tx,
        });
        Some(Subscription {
            key: key.to_string(),
            rx,
        })
    }

    /// Drop the subscriber registered under `key`
    pub fn disconnect(&self, key: &str) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.key != key);
        subs.len() != before
    }

    pub fn is_connected(&self, key: &str) -> bool {
        self.subscribers
            .lock()
            .iter()
            .any(|s| s.key == key && !s.tx.is_closed())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }

    /// Deliver `value` to every live subscriber; returns how many received it
    pub fn emit(&self, value: T) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|s| s.tx.send(value.clone()).is_ok());
        subs.len()
    }
}

impl<T> Subscription<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// One decoded push from a remote backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendSignal {
    /// `updateAlerts(json Alert)`
    Alert(String),
    /// `updateNetworkLog(json {count})`
    NetworkLog(String),
    /// `progressSignal(percentage, message)`
    Progress(ProgressUpdate),
}

/// The three push channels a backend exposes
pub struct SignalHub {
    pub update_alerts: Signal<String>,
    pub update_network_log: Signal<String>,
    pub progress: Signal<ProgressUpdate>,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            update_alerts: Signal::new("updateAlerts"),
            update_network_log: Signal::new("updateNetworkLog"),
            progress: Signal::new("progressSignal"),
        }
    }

    /// Route a decoded push to its channel
    pub fn dispatch(&self, signal: BackendSignal) -> usize {
        match signal {
            BackendSignal::Alert(json) => self.update_alerts.emit(json),
            BackendSignal::NetworkLog(json) => self.update_network_log.emit(json),
            BackendSignal::Progress(update) => self.progress.emit(update),
        }
    }

    pub fn emit_progress(&self, percentage: u32, message: impl Into<String>) -> usize {
        self.progress.emit(ProgressUpdate::new(percentage, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_idempotent_per_key() {
        let signal: Signal<u32> = Signal::new("test");
        let first = signal.connect("ui");
        assert!(first.is_some());
        assert!(signal.connect("ui").is_none());
        assert_eq!(signal.subscriber_count(), 1);
    }

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let signal: Signal<String> = Signal::new("test");
        let mut a = signal.connect("a").unwrap();
        let mut b = signal.connect("b").unwrap();

        assert_eq!(signal.emit("hello".to_string()), 2);
        assert_eq!(a.try_recv().as_deref(), Some("hello"));
        assert_eq!(b.try_recv().as_deref(), Some("hello"));
    }

    #[test]
    fn test_disconnect_stops_delivery() {
        let signal: Signal<u32> = Signal::new("test");
        let mut sub = signal.connect("ui").unwrap();
        assert!(signal.disconnect("ui"));
        assert!(!signal.disconnect("ui"));

        assert_eq!(signal.emit(7), 0);
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_dropped_subscription_frees_key() {
        let signal: Signal<u32> = Signal::new("test");
        let sub = signal.connect("ui").unwrap();
        drop(sub);

        assert!(!signal.is_connected("ui"));
        assert!(signal.connect("ui").is_some());
    }

    #[test]
    fn test_hub_dispatch_routes_by_kind() {
        let hub = SignalHub::new();
        let mut alerts = hub.update_alerts.connect("t").unwrap();
        let mut progress = hub.progress.connect("t").unwrap();

        hub.dispatch(BackendSignal::Alert("{}".to_string()));
        hub.dispatch(BackendSignal::Progress(ProgressUpdate::new(50, "Scanning...")));

        assert_eq!(alerts.try_recv().as_deref(), Some("{}"));
        assert_eq!(
            progress.try_recv(),
            Some(ProgressUpdate::new(50, "Scanning..."))
        );
    }

    #[tokio::test]
    async fn test_async_recv() {
        let hub = SignalHub::new();
        let mut sub = hub.update_network_log.connect("t").unwrap();
        hub.update_network_log.emit(r#"{"count":3}"#.to_string());
        assert_eq!(sub.recv().await.as_deref(), Some(r#"{"count":3}"#));
    }
}
