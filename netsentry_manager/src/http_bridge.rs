//! HTTP client for a remote NetSentry backend
//!
//! Calls go to `POST {base}/api/call/{method}` with the arguments as a JSON
//! array; the response body is the method's payload. Push signals are
//! long-polled from `GET {base}/api/signals?after={seq}`.

use async_trait::async_trait;
use netsentry_core::signal::BackendSignal;
use netsentry_core::{Backend, ProgressUpdate, SentryError, SentryResult, SignalHub};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Per-request timeout; long polls are answered well inside it
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One queued push as served by `/api/signals`
#[derive(Debug, Clone, Deserialize)]
pub struct SignalEnvelope {
    pub seq: u64,
    pub signal: String,
    #[serde(default)]
    pub payload: Value,
}

/// Map an envelope onto a hub signal; unknown names yield `None`
pub fn decode_signal(envelope: &SignalEnvelope) -> Option<BackendSignal> {
    let as_text = |payload: &Value| match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match envelope.signal.as_str() {
        "updateAlerts" => Some(BackendSignal::Alert(as_text(&envelope.payload))),
        "updateNetworkLog" => Some(BackendSignal::NetworkLog(as_text(&envelope.payload))),
        "progressSignal" => {
            let (percentage, message) = match &envelope.payload {
                Value::Array(items) => (
                    items.first().and_then(Value::as_u64),
                    items.get(1).and_then(Value::as_str),
                ),
                Value::Object(map) => (
                    map.get("percentage").and_then(Value::as_u64),
                    map.get("message").and_then(Value::as_str),
                ),
                _ => (None, None),
            };
            let percentage = percentage?;
            Some(BackendSignal::Progress(ProgressUpdate::new(
                percentage.min(100) as u32,
                message.unwrap_or_default(),
            )))
        }
        _ => None,
    }
}

pub struct HttpBridge {
    client: reqwest::Client,
    base_url: String,
    signals: Arc<SignalHub>,
    last_seq: AtomicU64,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl HttpBridge {
    pub fn new(base_url: &str) -> SentryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SentryError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signals: Arc::new(SignalHub::new()),
            last_seq: AtomicU64::new(0),
            pump: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Invoke `method` and return the raw response body
    async fn call(&self, method: &str, args: Value) -> SentryResult<String> {
        let url = format!("{}/api/call/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(&args)
            .send()
            .await
            .map_err(|e| SentryError::transport(method, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SentryError::transport(method, e))?;
        if !status.is_success() {
            return Err(SentryError::transport(
                method,
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }
        Ok(body)
    }

    async fn call_scalar<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        args: Value,
    ) -> SentryResult<T> {
        let body = self.call(method, args).await?;
        serde_json::from_str(body.trim()).map_err(|e| SentryError::parse(method, e))
    }

    /// Fetch pending pushes once and route them to the hub; returns how many
    /// were delivered
    pub async fn poll_signals(&self) -> SentryResult<usize> {
        let after = self.last_seq.load(Ordering::SeqCst);
        let url = format!("{}/api/signals", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("after", after)])
            .send()
            .await
            .map_err(|e| SentryError::transport("signals", e))?;
        if !response.status().is_success() {
            return Err(SentryError::transport(
                "signals",
                format!("HTTP {}", response.status().as_u16()),
            ));
        }
        let envelopes: Vec<SignalEnvelope> = response
            .json()
            .await
            .map_err(|e| SentryError::parse("signal batch", e))?;

        let mut delivered = 0;
        for envelope in envelopes.iter().filter(|e| e.seq > after) {
            self.last_seq.fetch_max(envelope.seq, Ordering::SeqCst);
            match decode_signal(envelope) {
                Some(signal) => {
                    self.signals.dispatch(signal);
                    delivered += 1;
                }
                None => tracing::debug!("ignoring signal '{}'", envelope.signal),
            }
        }
        Ok(delivered)
    }

    /// Keep polling for pushes in the background until stopped or dropped
    pub fn start_signal_pump(self: &Arc<Self>, interval: Duration) -> bool {
        let mut pump = self.pump.lock();
        if pump.is_some() {
            return false;
        }
        let weak = Arc::downgrade(self);
        *pump = Some(tokio::spawn(async move {
            loop {
                let Some(bridge) = weak.upgrade() else { break };
                if let Err(e) = bridge.poll_signals().await {
                    tracing::debug!("signal poll failed: {}", e);
                }
                drop(bridge);
                tokio::time::sleep(interval).await;
            }
        }));
        true
    }

    pub fn stop_signal_pump(&self) -> bool {
        match self.pump.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for HttpBridge {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Backend for HttpBridge {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn signals(&self) -> Arc<SignalHub> {
        self.signals.clone()
    }

    async fn start_capture(&self) -> SentryResult<bool> {
        self.call_scalar("start_capture", json!([])).await
    }

    async fn stop_capture(&self) -> SentryResult<bool> {
        self.call_scalar("stop_capture", json!([])).await
    }

    async fn get_log_count(&self) -> SentryResult<u64> {
        self.call_scalar("get_log_count", json!([])).await
    }

    async fn get_network_data(&self) -> SentryResult<String> {
        self.call("get_network_data", json!([])).await
    }

    async fn get_traffic_summary(&self) -> SentryResult<String> {
        self.call("get_traffic_summary", json!([])).await
    }

    async fn get_alert_data(&self) -> SentryResult<String> {
        self.call("get_alert_data", json!([])).await
    }

    async fn get_sound_status(&self) -> SentryResult<bool> {
        self.call_scalar("get_sound_status", json!([])).await
    }

    async fn toggle_alert_sound(&self, enabled: bool) -> SentryResult<bool> {
        let body = self.call("toggle_alert_sound", json!([enabled])).await?;
        // Some backends answer with an empty body
        Ok(serde_json::from_str(body.trim()).unwrap_or(enabled))
    }

    async fn save_log_file(&self, name: &str, base64_data: &str) -> SentryResult<String> {
        self.call("save_log_file", json!([name, base64_data])).await
    }

    async fn list_folders(&self) -> SentryResult<String> {
        self.call("list_folders", json!([])).await
    }

    async fn list_files_in_folder(&self, folder: &str) -> SentryResult<String> {
        self.call("list_files_in_folder", json!([folder])).await
    }

    async fn read_log_file(&self, folder: &str, file: &str) -> SentryResult<String> {
        self.call("read_log_file", json!([folder, file])).await
    }

    async fn detect_anomalies(&self, folder: &str, files_json: &str) -> SentryResult<String> {
        self.call("detect_anomalies", json!([folder, files_json])).await
    }

    async fn perform_deep_analysis(
        &self,
        folder: &str,
        files_json: &str,
    ) -> SentryResult<String> {
        self.call("perform_deep_analysis", json!([folder, files_json]))
            .await
    }

    async fn export_analysis_to_csv(
        &self,
        analysis_type: &str,
        folder: &str,
        data: &str,
    ) -> SentryResult<String> {
        self.call("export_analysis_to_csv", json!([analysis_type, folder, data]))
            .await
    }

    async fn fetch_logs(&self) -> SentryResult<String> {
        self.call("fetch_logs", json!([])).await
    }
}
