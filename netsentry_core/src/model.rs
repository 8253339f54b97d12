//! Wire payloads returned by the backend
//!
//! Every struct is lenient: missing fields fall back to defaults
//! so a partially populated payload still renders.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One minute bucket of captured traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub count: u64,
}

/// A JSON object of counts, kept in the order the backend wrote it
///
/// Chart ranking is a stable sort, so equal counts stay in payload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountMap(Vec<(String, u64)>);

impl CountMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut u64> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Replaces the value in place when the key already exists
    pub fn insert(&mut self, key: impl Into<String>, value: u64) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for CountMap {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut map = CountMap::default();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for CountMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CountMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountVisitor;

        impl<'de> Visitor<'de> for CountVisitor {
            type Value = CountMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of counts")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<CountMap, A::Error> {
                let mut map = CountMap::default();
                while let Some((key, value)) = access.next_entry::<String, u64>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(CountVisitor)
    }
}

/// `get_traffic_summary()` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficSummary {
    pub protocol_distribution: CountMap,
    pub top_sources: CountMap,
    /// Keyed by destination port, as a string
    pub top_services: CountMap,
}

/// A security alert raised by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alert {
    pub alert_type: String,
    pub description: String,
    pub source_ip: String,
    pub timestamp: String,
    pub severity: String,
    pub details: serde_json::Value,
}

/// `updateNetworkLog` push payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCountUpdate {
    #[serde(default)]
    pub count: u64,
}

/// `list_files_in_folder(folder)` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileListing {
    pub success: bool,
    pub folder: String,
    pub files: Vec<String>,
    pub count: usize,
    pub message: Option<String>,
}

/// `read_log_file(folder, file)` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileContent {
    pub success: bool,
    pub folder: String,
    pub file: String,
    pub content: String,
    pub created_at: Option<String>,
    pub message: Option<String>,
}

/// Acknowledgement of a job request: either `{status: "started"}` for
/// background work or an inline `{success, ...}` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobAck {
    pub status: Option<String>,
    pub success: Option<bool>,
    pub message: Option<String>,
}

impl JobAck {
    pub fn is_started(&self) -> bool {
        self.status.as_deref() == Some("started")
    }

    pub fn is_success(&self) -> bool {
        self.success == Some(true)
    }

    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// `export_analysis_to_csv` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportResponse {
    pub success: bool,
    pub message: String,
}

/// `save_log_file` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub path: Option<String>,
    pub folder: Option<String>,
}

/// The two backend analysis jobs that share the results panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    Anomaly,
    Deep,
}

impl AnalysisKind {
    /// Value passed as `analysis_type` to `export_analysis_to_csv`
    pub fn export_type(&self) -> &'static str {
        match self {
            AnalysisKind::Anomaly => "anomaly",
            AnalysisKind::Deep => "deep_analysis",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::Anomaly => "Anomaly scan",
            AnalysisKind::Deep => "Deep analysis",
        }
    }
}

/// Deep-analysis risk scale, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
    Normal,
    #[serde(other)]
    Unknown,
}

impl RiskLevel {
    pub const ORDERED: [RiskLevel; 5] = [
        RiskLevel::Critical,
        RiskLevel::High,
        RiskLevel::Medium,
        RiskLevel::Low,
        RiskLevel::Normal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "Critical",
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
            RiskLevel::Normal => "Normal",
            RiskLevel::Unknown => "Unknown",
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Unknown
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anomaly-scan danger scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DangerLevel {
    Critical,
    High,
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

impl Default for DangerLevel {
    fn default() -> Self {
        DangerLevel::Unknown
    }
}

impl DangerLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DangerLevel::Critical => "Critical",
            DangerLevel::High => "High",
            DangerLevel::Medium => "Medium",
            DangerLevel::Low => "Low",
            DangerLevel::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DangerCounts {
    #[serde(rename = "Critical")]
    pub critical: u64,
    #[serde(rename = "High")]
    pub high: u64,
    #[serde(rename = "Medium")]
    pub medium: u64,
    #[serde(rename = "Low")]
    pub low: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyStats {
    pub total_files: u64,
    pub total_anomalies: u64,
    pub danger_levels: DangerCounts,
}

/// One matched line from an anomaly scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyFinding {
    pub anomaly_name: String,
    pub danger_level: DangerLevel,
    pub file_name: String,
    pub line_number: usize,
    pub log_content: String,
    pub raw_content: String,
}

/// Completed anomaly scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyReport {
    pub success: bool,
    pub message: Option<String>,
    pub stats: AnomalyStats,
    pub results: Vec<AnomalyFinding>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskCounts {
    #[serde(rename = "Critical")]
    pub critical: u64,
    #[serde(rename = "High")]
    pub high: u64,
    #[serde(rename = "Medium")]
    pub medium: u64,
    #[serde(rename = "Low")]
    pub low: u64,
    #[serde(rename = "Normal")]
    pub normal: u64,
}

impl RiskCounts {
    pub fn get(&self, level: RiskLevel) -> u64 {
        match level {
            RiskLevel::Critical => self.critical,
            RiskLevel::High => self.high,
            RiskLevel::Medium => self.medium,
            RiskLevel::Low => self.low,
            RiskLevel::Normal => self.normal,
            RiskLevel::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepStats {
    pub total_files: u64,
    pub risk_counts: RiskCounts,
    pub overall_risk: RiskLevel,
}

/// One classified line from deep analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFinding {
    pub line_number: usize,
    pub risk_level: RiskLevel,
    pub risk_type: String,
    pub confidence: f64,
    pub log_content: String,
    pub raw_content: String,
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAnalysis {
    pub file_name: String,
    pub total_lines: u64,
    pub risk_prediction: RiskCounts,
    pub line_analysis: Vec<LineFinding>,
    pub overall_risk: RiskLevel,
}

/// Completed deep analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepReport {
    pub success: bool,
    pub message: Option<String>,
    pub stats: DeepStats,
    pub file_results: Vec<FileAnalysis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_tolerates_missing_fields() {
        let alert: Alert = serde_json::from_str(r#"{"alert_type":"Port Scan"}"#).unwrap();
        assert_eq!(alert.alert_type, "Port Scan");
        assert!(alert.source_ip.is_empty());
        assert!(alert.details.is_null());
    }

    #[test]
    fn test_job_ack_variants() {
        let started: JobAck = serde_json::from_str(r#"{"status":"started"}"#).unwrap();
        assert!(started.is_started());
        assert!(!started.is_success());

        let failed: JobAck =
            serde_json::from_str(r#"{"success":false,"message":"No files"}"#).unwrap();
        assert!(!failed.is_started());
        assert!(!failed.is_success());
        assert_eq!(failed.message_or("Unknown error"), "No files");
    }

    #[test]
    fn test_risk_level_ordering_and_unknown() {
        assert!(RiskLevel::Critical < RiskLevel::High);
        assert!(RiskLevel::Low < RiskLevel::Normal);

        let parsed: RiskLevel = serde_json::from_str(r#""Catastrophic""#).unwrap();
        assert_eq!(parsed, RiskLevel::Unknown);
    }

    #[test]
    fn test_deep_report_parses() {
        let raw = r#"{
            "success": true,
            "stats": {"total_files": 1, "risk_counts": {"Critical": 1, "Normal": 9}, "overall_risk": "Critical"},
            "file_results": [{
                "file_name": "auth.log",
                "total_lines": 10,
                "risk_prediction": {"Critical": 1, "Normal": 9},
                "line_analysis": [{"line_number": 4, "risk_level": "Critical", "risk_type": "Brute Force",
                                   "confidence": 0.93, "log_content": "failed password", "raw_content": "failed password",
                                   "indicators": ["failed", "password"]}],
                "overall_risk": "Critical"
            }]
        }"#;
        let report: DeepReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.stats.risk_counts.get(RiskLevel::Critical), 1);
        assert_eq!(report.stats.risk_counts.high, 0);
        assert_eq!(report.file_results[0].line_analysis[0].indicators.len(), 2);
    }

    #[test]
    fn test_anomaly_report_parses() {
        let raw = r#"{"success":true,"stats":{"total_files":2,"total_anomalies":1,
            "danger_levels":{"High":1,"Medium":0,"Low":0}},
            "results":[{"anomaly_name":"SQL Injection","danger_level":"High","file_name":"web.log",
            "line_number":12,"log_content":"' OR 1=1","raw_content":"' OR 1=1"}]}"#;
        let report: AnomalyReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.stats.danger_levels.high, 1);
        assert_eq!(report.results[0].danger_level, DangerLevel::High);
        assert_eq!(report.stats.danger_levels.critical, 0);
    }

    #[test]
    fn test_traffic_summary_keeps_payload_order() {
        let raw = r#"{"protocol_distribution":{"UDP":5,"TCP":5,"ARP":1},
            "top_sources":{},"top_services":{"8080":3,"443":3}}"#;
        let summary: TrafficSummary = serde_json::from_str(raw).unwrap();
        let keys: Vec<&str> = summary.protocol_distribution.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["UDP", "TCP", "ARP"]);
        assert_eq!(summary.top_services.get("443"), Some(3));
        assert!(summary.top_sources.is_empty());

        let back = serde_json::to_string(&summary.top_services).unwrap();
        assert_eq!(back, r#"{"8080":3,"443":3}"#);
    }

    #[test]
    fn test_critical_danger_level_is_counted() {
        let raw = r#"{"success":true,"stats":{"total_files":1,"total_anomalies":2,
            "danger_levels":{"Critical":2,"High":0,"Medium":0,"Low":0}},
            "results":[{"anomaly_name":"Suspicious Command Execution","danger_level":"Critical",
            "file_name":"auth.log","line_number":3,"log_content":"sudo su","raw_content":"sudo su"}]}"#;
        let report: AnomalyReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.stats.danger_levels.critical, 2);
        assert_eq!(report.results[0].danger_level, DangerLevel::Critical);
        assert_eq!(report.results[0].danger_level.as_str(), "Critical");
        assert!(DangerLevel::Critical < DangerLevel::High);
    }
}
