//! In-process backend used by `--demo` mode and by the test suites

use super::Backend;
use crate::error::{SentryError, SentryResult};
use crate::model::{
    Alert, AnomalyFinding, AnomalyReport, AnomalyStats, DangerLevel, DeepReport,
    DeepStats, FileAnalysis, LineFinding, RiskCounts, RiskLevel, TimelinePoint, TrafficSummary,
};
use crate::signal::SignalHub;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// How analysis requests are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// Run inline, emit progress while running, return the full report
    Immediate,
    /// Return `{"status":"started"}` and report only through progress signals
    Background,
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    created_at: Option<String>,
}

struct MemoryState {
    capturing: bool,
    capture_ok: bool,
    sound_enabled: bool,
    log_count: u64,
    timeline: Vec<TimelinePoint>,
    summary: TrafficSummary,
    alerts: Vec<Alert>,
    folders: BTreeMap<String, BTreeMap<String, StoredFile>>,
    payloads: HashMap<String, String>,
    failures: HashMap<String, String>,
    job_mode: JobMode,
    job_step: Duration,
    latency: Option<Duration>,
    calls: Vec<String>,
    exports: Vec<(String, String, String)>,
}

/// Deterministic [`Backend`] holding all of its data in memory
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    signals: Arc<SignalHub>,
}

/// (keyword, anomaly name, danger level) for the built-in line classifier
const SIGNATURES: &[(&str, &str, DangerLevel)] = &[
    ("sudo su", "Suspicious Command Execution", DangerLevel::Critical),
    ("outbound transfer", "Data Exfiltration Signs", DangerLevel::Critical),
    ("failed password", "Brute Force Attempt", DangerLevel::High),
    ("union select", "SQL Injection", DangerLevel::High),
    ("' or 1=1", "SQL Injection", DangerLevel::High),
    ("permission denied", "Privilege Escalation", DangerLevel::Medium),
    ("segfault", "Process Crash", DangerLevel::Medium),
    ("error", "Error Event", DangerLevel::Low),
];

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Empty backend: no traffic, no alerts, no folders
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                capturing: false,
                capture_ok: true,
                sound_enabled: true,
                log_count: 0,
                timeline: Vec::new(),
                summary: TrafficSummary::default(),
                alerts: Vec::new(),
                folders: BTreeMap::new(),
                payloads: HashMap::new(),
                failures: HashMap::new(),
                job_mode: JobMode::Immediate,
                job_step: Duration::from_millis(150),
                latency: None,
                calls: Vec::new(),
                exports: Vec::new(),
            }),
            signals: Arc::new(SignalHub::new()),
        }
    }

    /// Backend seeded with an hour and a quarter of traffic, a few alerts and
    /// two days of log folders
    pub fn demo() -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state.lock();
            state.timeline = (0..75u64)
                .map(|i| TimelinePoint {
                    timestamp: format!("2024-01-02T{:02}:{:02}", 9 + i / 60, i % 60),
                    count: 40 + (i * 37 % 23) * 3,
                })
                .collect();
            state.log_count = state.timeline.iter().map(|p| p.count).sum();
            state.summary = TrafficSummary {
                protocol_distribution: [("TCP", 2210), ("UDP", 734), ("ICMP", 51), ("ARP", 18)]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                top_sources: (1..=10u64)
                    .map(|i| (format!("192.168.1.{}", 10 + i), 400 / i))
                    .collect(),
                top_services: [
                    ("443", 1380),
                    ("80", 512),
                    ("53", 388),
                    ("22", 120),
                    ("3306", 64),
                    ("123", 40),
                    ("8080", 33),
                    ("5353", 21),
                    ("993", 12),
                    ("25", 4),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            };
            state.alerts = vec![
                Alert {
                    alert_type: "Port Scan".to_string(),
                    description: "Sequential SYN packets to 120 ports".to_string(),
                    source_ip: "10.0.0.66".to_string(),
                    timestamp: "2024-01-02T10:14:03".to_string(),
                    severity: "high".to_string(),
                    details: json!({"ports_scanned": 120}),
                },
                Alert {
                    alert_type: "DNS Tunneling".to_string(),
                    description: "Unusually long TXT queries".to_string(),
                    source_ip: "192.168.1.23".to_string(),
                    timestamp: "2024-01-02T10:02:41".to_string(),
                    severity: "medium".to_string(),
                    details: serde_json::Value::Null,
                },
            ];
            state.job_step = Duration::from_millis(400);
        }

        backend.add_file(
            "2024-01-01",
            "auth.log",
            "Jan  1 08:00:01 host sshd[311]: Accepted publickey for admin\n\
             Jan  1 08:03:12 host sshd[318]: Failed password for root from 10.0.0.66\n\
             Jan  1 08:03:14 host sshd[318]: Failed password for root from 10.0.0.66\n\
             Jan  1 08:10:00 host sudo: admin : permission denied ; COMMAND=/bin/cat /etc/shadow",
        );
        backend.add_file(
            "2024-01-01",
            "web.log",
            "GET /index.html 200\n\
             GET /search?q=1' OR 1=1-- 500\n\
             GET /products?id=5 UNION SELECT password FROM users 500\n\
             GET /favicon.ico 404",
        );
        backend.add_file(
            "2024-01-02",
            "kernel.log",
            "kernel: eth0 link up\nkernel: app[2231]: segfault at 0 ip 0000\nkernel: usb 1-1 connected",
        );
        backend.add_file(
            "2024-01-02",
            "app.log",
            "INFO service started\nWARN cache miss ratio high\nERROR upstream timeout\nINFO request served",
        );
        backend
    }

    // ====================================================================
    // Fixture controls
    // ====================================================================

    pub fn add_file(&self, folder: &str, name: &str, content: &str) {
        self.state
            .lock()
            .folders
            .entry(folder.to_string())
            .or_default()
            .insert(
                name.to_string(),
                StoredFile {
                    content: content.to_string(),
                    created_at: Some(format!("{} 00:00:00", folder)),
                },
            );
    }

    pub fn add_folder(&self, folder: &str) {
        self.state
            .lock()
            .folders
            .entry(folder.to_string())
            .or_default();
    }

    /// Clear the creation date the backend reports for a file
    pub fn clear_created_at(&self, folder: &str, name: &str) {
        if let Some(file) = self
            .state
            .lock()
            .folders
            .get_mut(folder)
            .and_then(|files| files.get_mut(name))
        {
            file.created_at = None;
        }
    }

    /// Answer `method` with `raw` verbatim from now on
    pub fn set_payload(&self, method: &str, raw: &str) {
        self.state
            .lock()
            .payloads
            .insert(method.to_string(), raw.to_string());
    }

    pub fn clear_payload(&self, method: &str) {
        self.state.lock().payloads.remove(method);
    }

    /// Make `method` fail with a transport error
    pub fn fail_method(&self, method: &str, message: &str) {
        self.state
            .lock()
            .failures
            .insert(method.to_string(), message.to_string());
    }

    pub fn restore_method(&self, method: &str) {
        self.state.lock().failures.remove(method);
    }

    pub fn set_job_mode(&self, mode: JobMode) {
        self.state.lock().job_mode = mode;
    }

    /// Delay between progress steps of background jobs
    pub fn set_job_step(&self, step: Duration) {
        self.state.lock().job_step = step;
    }

    /// Delay applied before every call completes
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Value returned by `start_capture`/`stop_capture`
    pub fn set_capture_result(&self, ok: bool) {
        self.state.lock().capture_ok = ok;
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().capturing
    }

    pub fn sound_enabled(&self) -> bool {
        self.state.lock().sound_enabled
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.as_str() == method)
            .count()
    }

    /// `(analysis_type, folder, data)` of every export request
    pub fn exports(&self) -> Vec<(String, String, String)> {
        self.state.lock().exports.clone()
    }

    // ====================================================================
    // Simulated pushes
    // ====================================================================

    /// Record `packets` new packets and push the new log count
    pub fn simulate_traffic(&self, packets: u64) -> u64 {
        let count = {
            let mut state = self.state.lock();
            state.log_count += packets;
            if let Some(last) = state.timeline.last_mut() {
                last.count += packets;
            }
            if let Some(tcp) = state.summary.protocol_distribution.get_mut("TCP") {
                *tcp += packets;
            }
            state.log_count
        };
        self.signals
            .update_network_log
            .emit(json!({ "count": count }).to_string());
        count
    }

    /// Store `alert` as the newest one and push it
    pub fn push_alert(&self, alert: Alert) {
        let payload = serde_json::to_string(&alert).unwrap_or_default();
        self.state.lock().alerts.insert(0, alert);
        self.signals.update_alerts.emit(payload);
    }

    pub fn emit_progress(&self, percentage: u32, message: &str) {
        self.signals.emit_progress(percentage, message);
    }

    // ====================================================================
    // Internals
    // ====================================================================

    /// Record the call, apply latency and injected failures, and return a
    /// canned payload when one is set
    async fn enter(&self, method: &str) -> SentryResult<Option<String>> {
        let latency = {
            let mut state = self.state.lock();
            state.calls.push(method.to_string());
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.state.lock();
        if let Some(message) = state.failures.get(method) {
            return Err(SentryError::transport(method, message));
        }
        Ok(state.payloads.get(method).cloned())
    }

    fn files_for(&self, folder: &str, files_json: &str) -> Vec<(String, String)> {
        let names: Vec<String> = serde_json::from_str(files_json).unwrap_or_default();
        let state = self.state.lock();
        let Some(stored) = state.folders.get(folder) else {
            return Vec::new();
        };
        names
            .into_iter()
            .filter_map(|name| {
                stored
                    .get(&name)
                    .map(|file| (name.clone(), file.content.clone()))
            })
            .collect()
    }

    fn classify(line: &str) -> Option<(&'static str, &'static str, DangerLevel)> {
        let lower = line.to_lowercase();
        SIGNATURES
            .iter()
            .find(|(keyword, _, _)| lower.contains(keyword))
            .copied()
    }

    fn anomaly_report(files: &[(String, String)]) -> AnomalyReport {
        let mut stats = AnomalyStats {
            total_files: files.len() as u64,
            ..Default::default()
        };
        let mut results = Vec::new();

        for (name, content) in files {
            for (index, line) in content.lines().enumerate() {
                let Some((_, anomaly, danger)) = Self::classify(line) else {
                    continue;
                };
                stats.total_anomalies += 1;
                match danger {
                    DangerLevel::Critical => stats.danger_levels.critical += 1,
                    DangerLevel::High => stats.danger_levels.high += 1,
                    DangerLevel::Medium => stats.danger_levels.medium += 1,
                    DangerLevel::Low => stats.danger_levels.low += 1,
                    DangerLevel::Unknown => {}
                }
                results.push(AnomalyFinding {
                    anomaly_name: anomaly.to_string(),
                    danger_level: danger,
                    file_name: name.clone(),
                    line_number: index + 1,
                    log_content: line.trim().to_string(),
                    raw_content: line.to_string(),
                });
            }
        }

        AnomalyReport {
            success: true,
            message: None,
            stats,
            results,
        }
    }

    fn deep_report(files: &[(String, String)]) -> DeepReport {
        let mut totals = RiskCounts::default();
        let mut file_results = Vec::new();

        for (name, content) in files {
            let mut prediction = RiskCounts::default();
            let mut lines = Vec::new();

            for (index, line) in content.lines().enumerate() {
                let (risk, risk_type, keyword, confidence) = match Self::classify(line) {
                    Some((keyword, anomaly, DangerLevel::Critical | DangerLevel::High)) => {
                        (RiskLevel::Critical, anomaly, keyword, 0.93)
                    }
                    Some((keyword, anomaly, DangerLevel::Medium)) => {
                        (RiskLevel::Medium, anomaly, keyword, 0.78)
                    }
                    Some((keyword, anomaly, _)) => (RiskLevel::Low, anomaly, keyword, 0.61),
                    None => {
                        prediction.normal += 1;
                        continue;
                    }
                };
                match risk {
                    RiskLevel::Critical => prediction.critical += 1,
                    RiskLevel::Medium => prediction.medium += 1,
                    _ => prediction.low += 1,
                }
                lines.push(LineFinding {
                    line_number: index + 1,
                    risk_level: risk,
                    risk_type: risk_type.to_string(),
                    confidence,
                    log_content: line.trim().to_string(),
                    raw_content: line.to_string(),
                    indicators: keyword.split_whitespace().map(str::to_string).collect(),
                });
            }

            lines.sort_by(|a, b| {
                a.risk_level
                    .cmp(&b.risk_level)
                    .then(b.confidence.total_cmp(&a.confidence))
            });
            let overall = Self::overall(&prediction);
            totals.critical += prediction.critical;
            totals.high += prediction.high;
            totals.medium += prediction.medium;
            totals.low += prediction.low;
            totals.normal += prediction.normal;

            file_results.push(FileAnalysis {
                file_name: name.clone(),
                total_lines: content.lines().count() as u64,
                risk_prediction: prediction,
                line_analysis: lines,
                overall_risk: overall,
            });
        }

        file_results.sort_by_key(|f| f.overall_risk);
        DeepReport {
            success: true,
            message: None,
            stats: DeepStats {
                total_files: files.len() as u64,
                risk_counts: totals,
                overall_risk: Self::overall(&totals),
            },
            file_results,
        }
    }

    fn overall(counts: &RiskCounts) -> RiskLevel {
        RiskLevel::ORDERED
            .into_iter()
            .find(|level| counts.get(*level) > 0)
            .unwrap_or(RiskLevel::Normal)
    }

    /// Run an analysis job according to the current [`JobMode`]
    fn run_job(
        &self,
        label: &'static str,
        files: Vec<(String, String)>,
        build: fn(&[(String, String)]) -> String,
    ) -> String {
        let (mode, step) = {
            let state = self.state.lock();
            (state.job_mode, state.job_step)
        };

        match mode {
            JobMode::Immediate => {
                self.signals
                    .emit_progress(0, format!("Starting {}...", label));
                let total = files.len().max(1);
                for (i, (name, _)) in files.iter().enumerate() {
                    let pct = 5 + (90 * (i + 1) / total) as u32;
                    self.signals
                        .emit_progress(pct.min(95), format!("Processed {}", name));
                }
                self.signals.emit_progress(100, "Analysis complete");
                build(&files)
            }
            JobMode::Background => {
                let signals = self.signals.clone();
                let names: Vec<String> = files.into_iter().map(|(name, _)| name).collect();
                tokio::spawn(async move {
                    signals.emit_progress(0, format!("Starting {}...", label));
                    let total = names.len().max(1);
                    for (i, name) in names.iter().enumerate() {
                        tokio::time::sleep(step).await;
                        let pct = 5 + (90 * (i + 1) / total) as u32;
                        signals.emit_progress(pct.min(95), format!("Processed {}", name));
                    }
                    tokio::time::sleep(step).await;
                    signals.emit_progress(100, "Analysis complete");
                });
                json!({ "status": "started" }).to_string()
            }
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn signals(&self) -> Arc<SignalHub> {
        self.signals.clone()
    }

    async fn start_capture(&self) -> SentryResult<bool> {
        self.enter("start_capture").await?;
        let mut state = self.state.lock();
        if state.capture_ok {
            state.capturing = true;
        }
        Ok(state.capture_ok)
    }

    async fn stop_capture(&self) -> SentryResult<bool> {
        self.enter("stop_capture").await?;
        let mut state = self.state.lock();
        if state.capture_ok {
            state.capturing = false;
        }
        Ok(state.capture_ok)
    }

    async fn get_log_count(&self) -> SentryResult<u64> {
        self.enter("get_log_count").await?;
        Ok(self.state.lock().log_count)
    }

    async fn get_network_data(&self) -> SentryResult<String> {
        if let Some(raw) = self.enter("get_network_data").await? {
            return Ok(raw);
        }
        Ok(serde_json::to_string(&self.state.lock().timeline)?)
    }

    async fn get_traffic_summary(&self) -> SentryResult<String> {
        if let Some(raw) = self.enter("get_traffic_summary").await? {
            return Ok(raw);
        }
        Ok(serde_json::to_string(&self.state.lock().summary)?)
    }

    async fn get_alert_data(&self) -> SentryResult<String> {
        if let Some(raw) = self.enter("get_alert_data").await? {
            return Ok(raw);
        }
        Ok(serde_json::to_string(&self.state.lock().alerts)?)
    }

    async fn get_sound_status(&self) -> SentryResult<bool> {
        self.enter("get_sound_status").await?;
        Ok(self.state.lock().sound_enabled)
    }

    async fn toggle_alert_sound(&self, enabled: bool) -> SentryResult<bool> {
        self.enter("toggle_alert_sound").await?;
        self.state.lock().sound_enabled = enabled;
        Ok(enabled)
    }

    async fn save_log_file(&self, name: &str, base64_data: &str) -> SentryResult<String> {
        if let Some(raw) = self.enter("save_log_file").await? {
            return Ok(raw);
        }
        let bytes = match STANDARD.decode(base64_data) {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(json!({ "success": false, "message": e.to_string() }).to_string())
            }
        };
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let created_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.state
            .lock()
            .folders
            .entry(today.clone())
            .or_default()
            .insert(
                name.to_string(),
                StoredFile {
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                    created_at: Some(created_at),
                },
            );
        Ok(json!({
            "success": true,
            "message": "File saved successfully",
            "path": format!("logs/{}/{}", today, name),
            "folder": today,
        })
        .to_string())
    }

    async fn list_folders(&self) -> SentryResult<String> {
        if let Some(raw) = self.enter("list_folders").await? {
            return Ok(raw);
        }
        let folders: Vec<String> = self.state.lock().folders.keys().rev().cloned().collect();
        Ok(serde_json::to_string(&folders)?)
    }

    async fn list_files_in_folder(&self, folder: &str) -> SentryResult<String> {
        if let Some(raw) = self.enter("list_files_in_folder").await? {
            return Ok(raw);
        }
        let state = self.state.lock();
        let payload = match state.folders.get(folder) {
            Some(files) => {
                let names: Vec<&String> = files.keys().collect();
                let count = names.len();
                json!({
                    "success": true,
                    "folder": folder,
                    "files": names,
                    "count": count,
                })
            }
            None => json!({
                "success": false,
                "message": format!("Folder not found: {}", folder),
                "files": [],
            }),
        };
        Ok(payload.to_string())
    }

    async fn read_log_file(&self, folder: &str, file: &str) -> SentryResult<String> {
        if let Some(raw) = self.enter("read_log_file").await? {
            return Ok(raw);
        }
        let state = self.state.lock();
        let payload = match state.folders.get(folder).and_then(|files| files.get(file)) {
            Some(stored) => json!({
                "success": true,
                "folder": folder,
                "file": file,
                "content": stored.content,
                "created_at": stored.created_at,
            }),
            None => json!({
                "success": false,
                "message": format!("File not found: {}", file),
            }),
        };
        Ok(payload.to_string())
    }

    async fn detect_anomalies(&self, folder: &str, files_json: &str) -> SentryResult<String> {
        if let Some(raw) = self.enter("detect_anomalies").await? {
            return Ok(raw);
        }
        let files = self.files_for(folder, files_json);
        if files.is_empty() {
            return Ok(json!({ "success": false, "message": "No valid files to analyze" }).to_string());
        }
        Ok(self.run_job("anomaly detection", files, |files| {
            serde_json::to_string(&Self::anomaly_report(files)).unwrap_or_default()
        }))
    }

    async fn perform_deep_analysis(
        &self,
        folder: &str,
        files_json: &str,
    ) -> SentryResult<String> {
        if let Some(raw) = self.enter("perform_deep_analysis").await? {
            return Ok(raw);
        }
        let files = self.files_for(folder, files_json);
        if files.is_empty() {
            return Ok(json!({ "success": false, "message": "No valid files to analyze" }).to_string());
        }
        Ok(self.run_job("deep analysis", files, |files| {
            serde_json::to_string(&Self::deep_report(files)).unwrap_or_default()
        }))
    }

    async fn export_analysis_to_csv(
        &self,
        analysis_type: &str,
        folder: &str,
        data: &str,
    ) -> SentryResult<String> {
        if let Some(raw) = self.enter("export_analysis_to_csv").await? {
            return Ok(raw);
        }
        if serde_json::from_str::<serde_json::Value>(data).is_err() {
            return Ok(json!({ "success": false, "message": "Invalid analysis data" }).to_string());
        }
        self.state.lock().exports.push((
            analysis_type.to_string(),
            folder.to_string(),
            data.to_string(),
        ));
        let file_name = format!("{}_{}.csv", analysis_type, folder.replace('/', "_"));
        Ok(json!({
            "success": true,
            "message": format!("Analysis exported to {}", file_name),
        })
        .to_string())
    }

    async fn fetch_logs(&self) -> SentryResult<String> {
        if let Some(raw) = self.enter("fetch_logs").await? {
            return Ok(raw);
        }
        let step = self.state.lock().job_step;
        let signals = self.signals.clone();
        tokio::spawn(async move {
            let stages = [
                (10, "Collecting system logs..."),
                (40, "Reading security events..."),
                (75, "Writing log archive..."),
                (100, "System log collection complete"),
            ];
            for (pct, message) in stages {
                tokio::time::sleep(step).await;
                signals.emit_progress(pct, message);
            }
        });
        Ok(json!({ "status": "started", "message": "Log collection started in background" }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_folders_listed_newest_first() {
        let backend = MemoryBackend::new();
        backend.add_folder("2024-01-01");
        backend.add_folder("2024-01-02");

        let raw = backend.list_folders().await.unwrap();
        assert_eq!(raw, r#"["2024-01-02","2024-01-01"]"#);
    }

    #[tokio::test]
    async fn test_immediate_anomaly_job_emits_progress_and_report() {
        let backend = MemoryBackend::new();
        backend.add_file("d", "a.log", "ok\nFailed password for root\nan error here");
        let mut progress = backend.signals().progress.connect("t").unwrap();

        let raw = backend.detect_anomalies("d", r#"["a.log"]"#).await.unwrap();
        let report: AnomalyReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(report.stats.total_anomalies, 2);
        assert_eq!(report.stats.danger_levels.high, 1);
        assert_eq!(report.stats.danger_levels.low, 1);
        assert_eq!(report.results[0].line_number, 2);

        let mut last = None;
        while let Some(update) = progress.try_recv() {
            last = Some(update);
        }
        assert_eq!(last.map(|u| u.percentage), Some(100));
    }

    #[tokio::test]
    async fn test_critical_findings_are_counted() {
        let backend = MemoryBackend::new();
        backend.add_file("d", "auth.log", "user ran sudo su -\nFailed password for bob");

        let raw = backend.detect_anomalies("d", r#"["auth.log"]"#).await.unwrap();
        let report: AnomalyReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(report.stats.danger_levels.critical, 1);
        assert_eq!(report.stats.danger_levels.high, 1);
        assert_eq!(report.results[0].danger_level, DangerLevel::Critical);

        let raw = backend
            .perform_deep_analysis("d", r#"["auth.log"]"#)
            .await
            .unwrap();
        let report: DeepReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(report.stats.risk_counts.critical, 2);
    }

    #[tokio::test]
    async fn test_deep_report_orders_by_risk() {
        let backend = MemoryBackend::new();
        backend.add_file("d", "calm.log", "all good\nstill good");
        backend.add_file("d", "hot.log", "an error\nUNION SELECT * FROM users");

        let raw = backend
            .perform_deep_analysis("d", r#"["calm.log","hot.log"]"#)
            .await
            .unwrap();
        let report: DeepReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(report.stats.overall_risk, RiskLevel::Critical);
        assert_eq!(report.file_results[0].file_name, "hot.log");
        assert_eq!(report.file_results[0].line_analysis[0].line_number, 2);
        assert_eq!(report.file_results[1].overall_risk, RiskLevel::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_job_acks_then_streams_progress() {
        let backend = MemoryBackend::new();
        backend.set_job_mode(JobMode::Background);
        backend.add_file("d", "a.log", "error");
        let mut progress = backend.signals().progress.connect("t").unwrap();

        let raw = backend.detect_anomalies("d", r#"["a.log"]"#).await.unwrap();
        assert_eq!(raw, r#"{"status":"started"}"#);

        let mut last = 0;
        while let Some(update) = progress.recv().await {
            last = update.percentage;
            if last >= 100 {
                break;
            }
        }
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_injected_failure_and_payload() {
        let backend = MemoryBackend::new();
        backend.fail_method("get_alert_data", "boom");
        assert!(backend.get_alert_data().await.unwrap_err().is_transport());

        backend.restore_method("get_alert_data");
        backend.set_payload("get_alert_data", "garbage");
        assert_eq!(backend.get_alert_data().await.unwrap(), "garbage");
        assert_eq!(backend.call_count("get_alert_data"), 2);
    }

    #[tokio::test]
    async fn test_simulate_traffic_pushes_count() {
        let backend = MemoryBackend::new();
        let mut sub = backend.signals().update_network_log.connect("t").unwrap();
        backend.simulate_traffic(5);
        assert_eq!(sub.try_recv().as_deref(), Some(r#"{"count":5}"#));
    }
}
