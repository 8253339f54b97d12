//! Backend bridge
//!
//! [`Backend`] is the raw contract: every method resolves to the backend's
//! own payload (a JSON string, or a scalar for the few methods that return
//! one) or fails with a transport error. [`BridgeAdapter`] sits on top, decodes
//! payloads into [`crate::model`] types and tracks whether the backend is
//! reachable.

mod memory;

pub use memory::{JobMode, MemoryBackend};

use crate::error::{SentryError, SentryResult};
use crate::model::{
    Alert, AnalysisKind, ExportResponse, FileListing, JobAck, LogFileContent, TimelinePoint,
    TrafficSummary, UploadResponse,
};
use crate::signal::{Signal, SignalHub};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Calls exposed by a monitoring backend
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Human readable name for logs and the status bar
    fn name(&self) -> &str;

    /// Push channels fed by this backend
    fn signals(&self) -> Arc<SignalHub>;

    async fn start_capture(&self) -> SentryResult<bool>;
    async fn stop_capture(&self) -> SentryResult<bool>;
    async fn get_log_count(&self) -> SentryResult<u64>;
    async fn get_network_data(&self) -> SentryResult<String>;
    async fn get_traffic_summary(&self) -> SentryResult<String>;
    async fn get_alert_data(&self) -> SentryResult<String>;
    async fn get_sound_status(&self) -> SentryResult<bool>;
    async fn toggle_alert_sound(&self, enabled: bool) -> SentryResult<bool>;
    async fn save_log_file(&self, name: &str, base64_data: &str) -> SentryResult<String>;
    async fn list_folders(&self) -> SentryResult<String>;
    async fn list_files_in_folder(&self, folder: &str) -> SentryResult<String>;
    async fn read_log_file(&self, folder: &str, file: &str) -> SentryResult<String>;
    /// `files_json` is a JSON array of file names inside `folder`
    async fn detect_anomalies(&self, folder: &str, files_json: &str) -> SentryResult<String>;
    async fn perform_deep_analysis(&self, folder: &str, files_json: &str)
        -> SentryResult<String>;
    async fn export_analysis_to_csv(
        &self,
        analysis_type: &str,
        folder: &str,
        data: &str,
    ) -> SentryResult<String>;
    async fn fetch_logs(&self) -> SentryResult<String>;
}

/// Decode a backend payload, mapping failures to [`SentryError::Parse`]
pub fn parse_payload<T: DeserializeOwned>(context: &str, raw: &str) -> SentryResult<T> {
    serde_json::from_str(raw).map_err(|e| SentryError::parse(context, e))
}

/// Acknowledgement of a job request together with the raw payload, which
/// holds the full report when the backend ran the job inline
#[derive(Debug, Clone)]
pub struct JobResponse {
    pub ack: JobAck,
    pub raw: String,
}

/// Typed, connectivity-aware wrapper around a [`Backend`]
#[derive(Clone)]
pub struct BridgeAdapter {
    backend: Arc<dyn Backend>,
    online: Arc<AtomicBool>,
    connectivity: Arc<Signal<bool>>,
}

impl BridgeAdapter {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            online: Arc::new(AtomicBool::new(true)),
            connectivity: Arc::new(Signal::new("connectivity")),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn signals(&self) -> Arc<SignalHub> {
        self.backend.signals()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Emits `true`/`false` on every online/offline transition
    pub fn connectivity(&self) -> Arc<Signal<bool>> {
        self.connectivity.clone()
    }

    fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            if online {
                log::info!("backend '{}' reachable again", self.backend.name());
            } else {
                log::warn!("backend '{}' unreachable", self.backend.name());
            }
            self.connectivity.emit(online);
        }
    }

    /// Record the outcome of a raw call. Only transport failures flip the
    /// bridge offline; any answer at all means it is online.
    fn track<T>(&self, method: &str, result: SentryResult<T>) -> SentryResult<T> {
        match &result {
            Ok(_) => self.set_online(true),
            Err(e) if e.is_transport() => {
                log::debug!("{} transport failure: {}", method, e);
                self.set_online(false);
            }
            Err(_) => {}
        }
        result
    }

    // ====================================================================
    // Dashboard
    // ====================================================================

    pub async fn start_capture(&self) -> SentryResult<bool> {
        let result = self.backend.start_capture().await;
        self.track("start_capture", result)
    }

    pub async fn stop_capture(&self) -> SentryResult<bool> {
        let result = self.backend.stop_capture().await;
        self.track("stop_capture", result)
    }

    pub async fn log_count(&self) -> SentryResult<u64> {
        let result = self.backend.get_log_count().await;
        self.track("get_log_count", result)
    }

    pub async fn network_data(&self) -> SentryResult<Vec<TimelinePoint>> {
        let result = self.backend.get_network_data().await;
        let raw = self.track("get_network_data", result)?;
        parse_payload("network data", &raw)
    }

    pub async fn traffic_summary(&self) -> SentryResult<TrafficSummary> {
        let result = self.backend.get_traffic_summary().await;
        let raw = self.track("get_traffic_summary", result)?;
        parse_payload("traffic summary", &raw)
    }

    pub async fn alerts(&self) -> SentryResult<Vec<Alert>> {
        let result = self.backend.get_alert_data().await;
        let raw = self.track("get_alert_data", result)?;
        parse_payload("alert data", &raw)
    }

    pub async fn sound_status(&self) -> SentryResult<bool> {
        let result = self.backend.get_sound_status().await;
        self.track("get_sound_status", result)
    }

    pub async fn set_alert_sound(&self, enabled: bool) -> SentryResult<bool> {
        let result = self.backend.toggle_alert_sound(enabled).await;
        self.track("toggle_alert_sound", result)
    }

    // ====================================================================
    // Log browser
    // ====================================================================

    pub async fn list_folders(&self) -> SentryResult<Vec<String>> {
        let result = self.backend.list_folders().await;
        let raw = self.track("list_folders", result)?;
        parse_payload("folder list", &raw)
    }

    pub async fn list_files(&self, folder: &str) -> SentryResult<FileListing> {
        let result = self.backend.list_files_in_folder(folder).await;
        let raw = self.track("list_files_in_folder", result)?;
        parse_payload("file list", &raw)
    }

    pub async fn read_log_file(&self, folder: &str, file: &str) -> SentryResult<LogFileContent> {
        let result = self.backend.read_log_file(folder, file).await;
        let raw = self.track("read_log_file", result)?;
        parse_payload("log file", &raw)
    }

    /// Base64-encode `bytes` and hand them to `save_log_file`
    pub async fn save_log_file(&self, name: &str, bytes: &[u8]) -> SentryResult<UploadResponse> {
        let encoded = STANDARD.encode(bytes);
        let result = self.backend.save_log_file(name, &encoded).await;
        let raw = self.track("save_log_file", result)?;
        parse_payload("upload response", &raw)
    }

    pub async fn start_analysis(
        &self,
        kind: AnalysisKind,
        folder: &str,
        files: &[String],
    ) -> SentryResult<JobResponse> {
        let files_json = serde_json::to_string(files)?;
        let (method, result) = match kind {
            AnalysisKind::Anomaly => (
                "detect_anomalies",
                self.backend.detect_anomalies(folder, &files_json).await,
            ),
            AnalysisKind::Deep => (
                "perform_deep_analysis",
                self.backend.perform_deep_analysis(folder, &files_json).await,
            ),
        };
        let raw = self.track(method, result)?;
        let ack = parse_payload("response", &raw)?;
        Ok(JobResponse { ack, raw })
    }

    pub async fn export(
        &self,
        kind: AnalysisKind,
        folder: &str,
        data: &str,
    ) -> SentryResult<ExportResponse> {
        let result = self
            .backend
            .export_analysis_to_csv(kind.export_type(), folder, data)
            .await;
        let raw = self.track("export_analysis_to_csv", result)?;
        parse_payload("export response", &raw)
    }

    // ====================================================================
    // System logs
    // ====================================================================

    pub async fn fetch_logs(&self) -> SentryResult<JobAck> {
        let result = self.backend.fetch_logs().await;
        let raw = self.track("fetch_logs", result)?;
        parse_payload("backend response", &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> (Arc<MemoryBackend>, BridgeAdapter) {
        let backend = Arc::new(MemoryBackend::new());
        let bridge = BridgeAdapter::new(backend.clone());
        (backend, bridge)
    }

    #[tokio::test]
    async fn test_transport_failure_marks_offline_and_recovers() {
        let (backend, bridge) = adapter();
        let mut connectivity = bridge.connectivity().connect("test").unwrap();

        backend.fail_method("get_alert_data", "connection refused");
        let err = bridge.alerts().await.unwrap_err();
        assert!(err.is_transport());
        assert!(!bridge.is_online());
        assert_eq!(connectivity.try_recv(), Some(false));

        backend.restore_method("get_alert_data");
        assert!(bridge.alerts().await.is_ok());
        assert!(bridge.is_online());
        assert_eq!(connectivity.try_recv(), Some(true));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_parse_error_and_stays_online() {
        let (backend, bridge) = adapter();
        backend.set_payload("get_traffic_summary", "{not json");

        let err = bridge.traffic_summary().await.unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().starts_with("Error parsing traffic summary"));
        assert!(bridge.is_online());
    }

    #[tokio::test]
    async fn test_repeated_failures_emit_single_transition() {
        let (backend, bridge) = adapter();
        let mut connectivity = bridge.connectivity().connect("test").unwrap();
        backend.fail_method("get_log_count", "down");

        let _ = bridge.log_count().await;
        let _ = bridge.log_count().await;
        assert_eq!(connectivity.try_recv(), Some(false));
        assert_eq!(connectivity.try_recv(), None);
    }

    #[tokio::test]
    async fn test_save_log_file_encodes_base64() {
        let (backend, bridge) = adapter();
        let response = bridge.save_log_file("upload.log", b"line one\nline two").await.unwrap();
        assert!(response.success);

        let folder = response.folder.unwrap();
        let content = bridge.read_log_file(&folder, "upload.log").await.unwrap();
        assert_eq!(content.content, "line one\nline two");
        assert_eq!(backend.call_count("save_log_file"), 1);
    }

    #[tokio::test]
    async fn test_start_analysis_passes_file_list() {
        let (backend, bridge) = adapter();
        backend.add_file("2024-01-01", "auth.log", "Failed password for root\nok");

        let response = bridge
            .start_analysis(AnalysisKind::Anomaly, "2024-01-01", &["auth.log".to_string()])
            .await
            .unwrap();
        assert!(response.ack.is_success());
        assert!(response.raw.contains("auth.log"));
    }
}
