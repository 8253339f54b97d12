//! Anomaly scan / deep analysis launcher and results panel
//!
//! Both jobs share a single panel. The raw JSON of the last report of each
//! kind is cached, so switching modes re-renders without calling the backend
//! again. Any navigation discards the panel and both cached reports, and
//! reports that arrive after the user has moved on are dropped.

use crate::bridge::{parse_payload, BridgeAdapter, JobResponse};
use crate::model::{AnalysisKind, AnomalyFinding, AnomalyReport, DeepReport, LineFinding, RiskLevel};
use crate::navigator::LogNavigator;
use crate::progress::{Notifier, RiskTint, ToastKind};
use crate::{SentryError, SentryResult};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// What happened to a scan request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Rejected before reaching the backend
    Invalid,
    /// Another job still owns the overlay
    Busy,
    /// Backend acknowledged a background job
    Started,
    /// Report returned inline and rendered
    Displayed,
    /// Report arrived for a folder that is no longer shown
    Discarded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelView {
    Anomaly(AnomalyReport),
    Deep {
        report: DeepReport,
        /// One flag per file accordion
        expanded: Vec<bool>,
    },
}

/// One selectable row of the results panel
#[derive(Debug, Clone, PartialEq)]
pub enum PanelRow {
    Accordion {
        index: usize,
        file_name: String,
        risk: RiskLevel,
        /// e.g. `Critical: 1 Low: 2`
        counts: String,
        expanded: bool,
    },
    Anomaly(AnomalyFinding),
    Line {
        file_name: String,
        finding: LineFinding,
    },
    /// Expanded accordion with no findings
    NoIssues,
}

impl PanelRow {
    /// Cells in column order, for the table renderer
    pub fn cells(&self) -> Vec<String> {
        match self {
            PanelRow::Accordion {
                file_name,
                risk,
                counts,
                expanded,
                ..
            } => vec![
                format!("{} {}", if *expanded { "▲" } else { "▼" }, file_name),
                risk.to_string(),
                counts.clone(),
            ],
            PanelRow::Anomaly(finding) => vec![
                finding.anomaly_name.clone(),
                finding.danger_level.as_str().to_string(),
                finding.file_name.clone(),
                finding.line_number.to_string(),
                plain_line(&finding.raw_content, &finding.log_content),
            ],
            PanelRow::Line { finding, .. } => vec![
                format!(
                    "{} ({}%)",
                    finding.risk_level,
                    (finding.confidence * 100.0).round() as i64
                ),
                finding.line_number.to_string(),
                if finding.risk_type.is_empty() {
                    "Unclassified".to_string()
                } else {
                    finding.risk_type.clone()
                },
                if finding.indicators.is_empty() {
                    "-".to_string()
                } else {
                    finding.indicators.join(", ")
                },
                plain_line(&finding.raw_content, &finding.log_content),
            ],
            PanelRow::NoIssues => vec!["No issues detected in this file.".to_string()],
        }
    }
}

/// `log_content` carries HTML highlight markup; show the untouched line
fn plain_line(raw: &str, marked: &str) -> String {
    if raw.trim().is_empty() {
        marked.trim().to_string()
    } else {
        raw.trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPanel {
    pub folder: String,
    pub view: PanelView,
}

impl AnalysisPanel {
    pub fn kind(&self) -> AnalysisKind {
        match self.view {
            PanelView::Anomaly(_) => AnalysisKind::Anomaly,
            PanelView::Deep { .. } => AnalysisKind::Deep,
        }
    }

    pub fn title(&self) -> &'static str {
        match self.view {
            PanelView::Anomaly(_) => "Anomaly Detection Results",
            PanelView::Deep { .. } => "Deep Analysis Results",
        }
    }

    /// Label of the mode switch button
    pub fn switch_label(&self) -> &'static str {
        match self.view {
            PanelView::Anomaly(_) => "Switch to Deep Analysis",
            PanelView::Deep { .. } => "Switch to Anomaly Scan",
        }
    }

    /// `(label, value)` pairs for the summary strip
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        match &self.view {
            PanelView::Anomaly(report) => {
                let stats = &report.stats;
                let levels = &stats.danger_levels;
                let mut parts = Vec::new();
                for (name, count) in [
                    ("Critical", levels.critical),
                    ("High", levels.high),
                    ("Medium", levels.medium),
                    ("Low", levels.low),
                ] {
                    if count > 0 {
                        parts.push(format!("{}: {}", name, count));
                    }
                }
                if stats.total_anomalies == 0 {
                    parts.push("No anomalies detected".to_string());
                }
                vec![
                    ("Total Files", stats.total_files.to_string()),
                    ("Total Anomalies", stats.total_anomalies.to_string()),
                    ("Danger Levels", parts.join("  ")),
                ]
            }
            PanelView::Deep { report, .. } => {
                let stats = &report.stats;
                let breakdown: Vec<String> = RiskLevel::ORDERED
                    .into_iter()
                    .filter(|level| *level != RiskLevel::Normal)
                    .filter(|level| stats.risk_counts.get(*level) > 0)
                    .map(|level| format!("{}: {}", level, stats.risk_counts.get(level)))
                    .collect();
                vec![
                    ("Total Files", stats.total_files.to_string()),
                    ("Overall Risk", stats.overall_risk.to_string()),
                    ("Risk Breakdown", breakdown.join("  ")),
                ]
            }
        }
    }

    /// Shown instead of the table when the report has no findings
    pub fn empty_message(&self) -> Option<&'static str> {
        match &self.view {
            PanelView::Anomaly(report) if report.results.is_empty() => {
                Some("No anomalies detected in the analyzed files.")
            }
            PanelView::Deep { report, .. } if report.file_results.is_empty() => {
                Some("No issues detected in the analyzed files.")
            }
            _ => None,
        }
    }

    /// Visible rows; collapsed accordions hide their findings
    pub fn rows(&self) -> Vec<PanelRow> {
        match &self.view {
            PanelView::Anomaly(report) => report.results.iter().cloned().map(PanelRow::Anomaly).collect(),
            PanelView::Deep { report, expanded } => {
                let mut rows = Vec::new();
                for (index, file) in report.file_results.iter().enumerate() {
                    let open = expanded.get(index).copied().unwrap_or(false);
                    let counts: Vec<String> = RiskLevel::ORDERED
                        .into_iter()
                        .filter(|level| *level != RiskLevel::Normal)
                        .filter(|level| file.risk_prediction.get(*level) > 0)
                        .map(|level| format!("{}: {}", level, file.risk_prediction.get(level)))
                        .collect();
                    rows.push(PanelRow::Accordion {
                        index,
                        file_name: file.file_name.clone(),
                        risk: file.overall_risk,
                        counts: counts.join(" "),
                        expanded: open,
                    });
                    if !open {
                        continue;
                    }
                    if file.line_analysis.is_empty() {
                        rows.push(PanelRow::NoIssues);
                    }
                    rows.extend(file.line_analysis.iter().map(|finding| PanelRow::Line {
                        file_name: file.file_name.clone(),
                        finding: finding.clone(),
                    }));
                }
                rows
            }
        }
    }
}

#[derive(Default)]
struct AnalysisState {
    panel: Option<AnalysisPanel>,
    anomaly_raw: Option<String>,
    deep_raw: Option<String>,
    /// Navigator generation the cached reports belong to
    generation: u64,
}

impl AnalysisState {
    fn clear(&mut self) {
        self.panel = None;
        self.anomaly_raw = None;
        self.deep_raw = None;
    }
}

struct Inner {
    bridge: BridgeAdapter,
    navigator: LogNavigator,
    notifier: Notifier,
    running: AtomicBool,
    state: Mutex<AnalysisState>,
}

#[derive(Clone)]
pub struct AnalysisController {
    inner: Arc<Inner>,
}

impl AnalysisController {
    pub fn new(bridge: BridgeAdapter, navigator: LogNavigator, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(Inner {
                bridge,
                navigator,
                notifier,
                running: AtomicBool::new(false),
                state: Mutex::new(AnalysisState::default()),
            }),
        }
    }

    /// A job is running. Background jobs stay busy until their overlay closes.
    pub fn is_busy(&self) -> bool {
        if !self.inner.running.load(Ordering::SeqCst) {
            return false;
        }
        if self.inner.notifier.is_loading() {
            return true;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        false
    }

    /// Lock the panel state, dropping it first if the navigator has moved on
    fn state(&self) -> MutexGuard<'_, AnalysisState> {
        let generation = self.inner.navigator.generation();
        let mut state = self.inner.state.lock();
        if state.generation != generation {
            if state.panel.is_some() || state.anomaly_raw.is_some() || state.deep_raw.is_some() {
                log::debug!("navigation discarded analysis results");
            }
            state.clear();
            state.generation = generation;
        }
        state
    }

    pub fn panel(&self) -> Option<AnalysisPanel> {
        self.state().panel.clone()
    }

    pub fn has_results(&self, kind: AnalysisKind) -> bool {
        let state = self.state();
        match kind {
            AnalysisKind::Anomaly => state.anomaly_raw.is_some(),
            AnalysisKind::Deep => state.deep_raw.is_some(),
        }
    }

    /// Start an analysis of every open file in the current folder
    pub async fn run(&self, kind: AnalysisKind) -> RunOutcome {
        let notifier = &self.inner.notifier;
        let (folder, files) = match self.target() {
            Ok(target) => target,
            Err(e) => {
                notifier.notify(e.to_string(), ToastKind::Error);
                return RunOutcome::Invalid;
            }
        };
        if self.is_busy() {
            log::debug!("{} requested while another job is running", kind.label());
            return RunOutcome::Busy;
        }

        self.inner.running.store(true, Ordering::SeqCst);
        notifier.show_loading(match kind {
            AnalysisKind::Anomaly => "Starting Anomaly Scan",
            AnalysisKind::Deep => "Starting Deep Analysis",
        });
        let generation = self.inner.navigator.generation();
        log::info!("{} of {} file(s) in {}", kind.label(), files.len(), folder);

        let outcome = match self.inner.bridge.start_analysis(kind, &folder, &files).await {
            Ok(response) => self.handle_response(kind, &folder, generation, response),
            Err(e) if e.is_parse() => {
                notifier.hide_loading();
                notifier.notify(e.to_string(), ToastKind::Error);
                RunOutcome::Failed
            }
            Err(e) => {
                notifier.hide_loading();
                notifier.notify(
                    format!("Error during {}: {}", kind.label().to_lowercase(), e),
                    ToastKind::Error,
                );
                RunOutcome::Failed
            }
        };

        if outcome != RunOutcome::Started {
            self.inner.running.store(false, Ordering::SeqCst);
        }
        outcome
    }

    /// Folder and open files an analysis would cover
    fn target(&self) -> SentryResult<(String, Vec<String>)> {
        let folder = self.inner.navigator.current_folder().ok_or_else(|| {
            SentryError::InvalidInput("Please select a folder first".to_string())
        })?;
        let files = self.inner.navigator.open_files();
        if files.is_empty() {
            return Err(SentryError::InvalidInput(
                "Please open files to analyze".to_string(),
            ));
        }
        Ok((folder, files))
    }

    fn handle_response(
        &self,
        kind: AnalysisKind,
        folder: &str,
        generation: u64,
        response: JobResponse,
    ) -> RunOutcome {
        let notifier = &self.inner.notifier;
        if response.ack.is_started() {
            notifier.notify(
                format!("{} started in background", kind.label()),
                ToastKind::Info,
            );
            return RunOutcome::Started;
        }

        notifier.hide_loading();
        if !response.ack.is_success() {
            let err = SentryError::Backend {
                method: kind.label().to_string(),
                message: response.ack.message_or("unknown error"),
            };
            notifier.notify(err.to_string(), ToastKind::Error);
            return RunOutcome::Failed;
        }

        if self.inner.navigator.generation() != generation {
            log::info!("dropping {} results for {}, folder changed", kind.label(), folder);
            return RunOutcome::Discarded;
        }

        match self.display(kind, folder, response.raw) {
            Ok(()) => RunOutcome::Displayed,
            Err(e) => {
                notifier.notify(e.to_string(), ToastKind::Error);
                RunOutcome::Failed
            }
        }
    }

    /// Parse and show a report, caching its raw JSON
    fn display(&self, kind: AnalysisKind, folder: &str, raw: String) -> SentryResult<()> {
        let notifier = &self.inner.notifier;
        let view = match kind {
            AnalysisKind::Anomaly => {
                let report: AnomalyReport = parse_payload("response", &raw)?;
                let stats = &report.stats;
                let levels = &stats.danger_levels;
                let critical = if levels.critical > 0 {
                    format!("{} Critical, ", levels.critical)
                } else {
                    String::new()
                };
                notifier.notify_risk(
                    format!(
                        "Total Anomalies Found: {} ({}{} High, {} Medium, {} Low)",
                        stats.total_anomalies, critical, levels.high, levels.medium, levels.low
                    ),
                    ToastKind::Warning,
                    Some(if levels.critical > 0 {
                        RiskTint::Critical
                    } else if stats.total_anomalies > 0 {
                        RiskTint::High
                    } else {
                        RiskTint::Low
                    }),
                );
                PanelView::Anomaly(report)
            }
            AnalysisKind::Deep => {
                let report: DeepReport = parse_payload("response", &raw)?;
                let overall = report.stats.overall_risk;
                notifier.notify_risk(
                    format!("Overall Risk Level: {}", overall),
                    ToastKind::Info,
                    RiskTint::parse(overall.as_str()),
                );
                let expanded = (0..report.file_results.len()).map(|i| i == 0).collect();
                PanelView::Deep { report, expanded }
            }
        };

        let mut state = self.state();
        match kind {
            AnalysisKind::Anomaly => state.anomaly_raw = Some(raw),
            AnalysisKind::Deep => state.deep_raw = Some(raw),
        }
        state.panel = Some(AnalysisPanel {
            folder: folder.to_string(),
            view,
        });
        Ok(())
    }

    /// Show the other cached report, if any
    pub fn switch_mode(&self) -> bool {
        let (target, folder, raw) = {
            let state = self.state();
            let Some(panel) = state.panel.as_ref() else {
                return false;
            };
            match panel.kind() {
                AnalysisKind::Anomaly => (AnalysisKind::Deep, panel.folder.clone(), state.deep_raw.clone()),
                AnalysisKind::Deep => (AnalysisKind::Anomaly, panel.folder.clone(), state.anomaly_raw.clone()),
            }
        };

        let Some(raw) = raw else {
            let message = match target {
                AnalysisKind::Anomaly => "No anomaly scan results available",
                AnalysisKind::Deep => "No analysis results available",
            };
            self.inner.notifier.notify(message, ToastKind::Info);
            return false;
        };

        match self.display(target, &folder, raw) {
            Ok(()) => true,
            Err(e) => {
                self.inner.notifier.notify(e.to_string(), ToastKind::Error);
                false
            }
        }
    }

    pub fn toggle_accordion(&self, index: usize) -> bool {
        let mut state = self.state();
        match state.panel.as_mut().map(|p| &mut p.view) {
            Some(PanelView::Deep { expanded, .. }) => match expanded.get_mut(index) {
                Some(flag) => {
                    *flag = !*flag;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Activate a visible row: toggles an accordion, or highlights the
    /// finding's source line in its file card
    pub fn activate_row(&self, row: usize, now: Instant) -> bool {
        let Some(target) = self.panel().and_then(|p| p.rows().into_iter().nth(row)) else {
            return false;
        };
        match target {
            PanelRow::Accordion { index, .. } => self.toggle_accordion(index),
            PanelRow::Anomaly(finding) => {
                self.inner
                    .navigator
                    .highlight_line(&finding.file_name, finding.line_number, now)
            }
            PanelRow::Line { file_name, finding } => {
                self.inner
                    .navigator
                    .highlight_line(&file_name, finding.line_number, now)
            }
            PanelRow::NoIssues => false,
        }
    }

    /// Export the report currently shown
    pub async fn export(&self) -> bool {
        let request = {
            let state = self.state();
            state.panel.as_ref().and_then(|panel| {
                let raw = match panel.kind() {
                    AnalysisKind::Anomaly => state.anomaly_raw.clone(),
                    AnalysisKind::Deep => state.deep_raw.clone(),
                };
                raw.map(|raw| (panel.kind(), panel.folder.clone(), raw))
            })
        };
        let notifier = &self.inner.notifier;
        let Some((kind, folder, raw)) = request else {
            notifier.notify("No data available for download", ToastKind::Error);
            return false;
        };

        match self.inner.bridge.export(kind, &folder, &raw).await {
            Ok(response) if response.success => {
                notifier.notify(response.message, ToastKind::Success);
                true
            }
            Ok(response) => {
                let err = SentryError::Backend {
                    method: "Export".to_string(),
                    message: response.message,
                };
                notifier.notify(err.to_string(), ToastKind::Error);
                false
            }
            Err(e) if e.is_parse() => {
                notifier.notify(e.to_string(), ToastKind::Error);
                false
            }
            Err(e) => {
                notifier.notify(format!("Error during export: {}", e), ToastKind::Error);
                false
            }
        }
    }

    /// Hide the panel and drop both cached reports
    pub fn close(&self) {
        self.inner.state.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{JobMode, MemoryBackend};
    use crate::config::NotificationConfig;
    use crate::model::DangerLevel;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        navigator: LogNavigator,
        notifier: Notifier,
        analysis: AnalysisController,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file("d", "auth.log", "ok\nFailed password for root\nan error here");
        backend.add_file("d", "calm.log", "all good");
        backend.add_file("e", "other.log", "nothing");

        let config = NotificationConfig::default();
        let notifier = Notifier::new(&config);
        let bridge = BridgeAdapter::new(backend.clone());
        let navigator = LogNavigator::new(bridge.clone(), notifier.clone(), &config);
        let analysis = AnalysisController::new(bridge, navigator.clone(), notifier.clone());
        Fixture {
            backend,
            navigator,
            notifier,
            analysis,
        }
    }

    async fn open_both(f: &Fixture) {
        f.navigator.load_files("d").await;
        f.navigator.open_file("d", "auth.log").await;
        f.navigator.open_file("d", "calm.log").await;
    }

    // ========================================================================
    // Launch
    // ========================================================================

    #[tokio::test]
    async fn test_requires_open_files() {
        let f = fixture();
        assert_eq!(f.analysis.run(AnalysisKind::Anomaly).await, RunOutcome::Invalid);
        assert_eq!(
            f.notifier.last_message().as_deref(),
            Some("Please select a folder first")
        );
        assert_eq!(f.backend.call_count("detect_anomalies"), 0);
    }

    #[tokio::test]
    async fn test_inline_anomaly_report_is_displayed() {
        let f = fixture();
        open_both(&f).await;

        assert_eq!(f.analysis.run(AnalysisKind::Anomaly).await, RunOutcome::Displayed);
        assert!(!f.notifier.is_loading());
        assert!(!f.analysis.is_busy());

        let toast = f.notifier.toast().unwrap();
        assert_eq!(toast.message, "Total Anomalies Found: 2 (1 High, 0 Medium, 1 Low)");
        assert_eq!(toast.kind, ToastKind::Warning);
        assert_eq!(toast.risk, Some(RiskTint::High));

        let panel = f.analysis.panel().unwrap();
        assert_eq!(panel.title(), "Anomaly Detection Results");
        let rows = panel.rows();
        assert_eq!(rows.len(), 2);
        match &rows[0] {
            PanelRow::Anomaly(finding) => {
                assert_eq!(finding.danger_level, DangerLevel::High);
                assert_eq!(finding.line_number, 2);
            }
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_critical_anomalies_lead_the_summary() {
        let f = fixture();
        f.backend.add_file("d", "shell.log", "admin ran sudo su\nFailed password for root");
        f.navigator.load_files("d").await;
        f.navigator.open_file("d", "shell.log").await;

        assert_eq!(f.analysis.run(AnalysisKind::Anomaly).await, RunOutcome::Displayed);
        let toast = f.notifier.toast().unwrap();
        assert_eq!(
            toast.message,
            "Total Anomalies Found: 2 (1 Critical, 1 High, 0 Medium, 0 Low)"
        );
        assert_eq!(toast.risk, Some(RiskTint::Critical));

        let summary = f.analysis.panel().unwrap().summary();
        assert_eq!(summary[2], ("Danger Levels", "Critical: 1  High: 1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_job_keeps_overlay_and_busy() {
        let f = fixture();
        f.backend.set_job_mode(JobMode::Background);
        open_both(&f).await;

        assert_eq!(f.analysis.run(AnalysisKind::Deep).await, RunOutcome::Started);
        assert_eq!(
            f.notifier.toast().unwrap().message,
            "Deep analysis started in background"
        );
        assert!(f.notifier.is_loading());
        assert!(f.analysis.is_busy());
        assert_eq!(f.analysis.run(AnalysisKind::Anomaly).await, RunOutcome::Busy);

        f.notifier.hide_loading();
        assert!(!f.analysis.is_busy());
    }

    #[tokio::test]
    async fn test_backend_rejection_and_transport_failure() {
        let f = fixture();
        open_both(&f).await;

        f.backend
            .set_payload("detect_anomalies", r#"{"success":false,"message":"model missing"}"#);
        assert_eq!(f.analysis.run(AnalysisKind::Anomaly).await, RunOutcome::Failed);
        assert_eq!(
            f.notifier.last_message().as_deref(),
            Some("Anomaly scan failed: model missing")
        );
        assert!(!f.notifier.is_loading());

        f.backend.fail_method("perform_deep_analysis", "socket closed");
        assert_eq!(f.analysis.run(AnalysisKind::Deep).await, RunOutcome::Failed);
        let message = f.notifier.last_message().unwrap();
        assert!(message.starts_with("Error during deep analysis:"), "{}", message);
        assert!(!f.analysis.is_busy());
    }

    #[tokio::test]
    async fn test_unparseable_response() {
        let f = fixture();
        open_both(&f).await;
        f.backend.set_payload("detect_anomalies", "<html>");

        assert_eq!(f.analysis.run(AnalysisKind::Anomaly).await, RunOutcome::Failed);
        let message = f.notifier.last_message().unwrap();
        assert!(message.starts_with("Error parsing response"), "{}", message);
    }

    // ========================================================================
    // Panel
    // ========================================================================

    #[tokio::test]
    async fn test_deep_panel_accordions() {
        let f = fixture();
        open_both(&f).await;
        f.analysis.run(AnalysisKind::Deep).await;

        let toast = f.notifier.toast().unwrap();
        assert_eq!(toast.message, "Overall Risk Level: Critical");
        assert_eq!(toast.risk, Some(RiskTint::Critical));

        let panel = f.analysis.panel().unwrap();
        let rows = panel.rows();
        // auth.log expanded with its two findings, calm.log collapsed
        assert_eq!(rows.len(), 4);
        match &rows[0] {
            PanelRow::Accordion {
                file_name, expanded, counts, ..
            } => {
                assert_eq!(file_name, "auth.log");
                assert!(*expanded);
                assert_eq!(counts, "Critical: 1 Low: 1");
            }
            other => panic!("unexpected row {:?}", other),
        }
        assert!(matches!(&rows[3], PanelRow::Accordion { expanded: false, .. }));

        // expanding the clean file shows its placeholder
        assert!(f.analysis.activate_row(3, Instant::now()));
        let rows = f.analysis.panel().unwrap().rows();
        assert_eq!(rows.last(), Some(&PanelRow::NoIssues));
    }

    #[tokio::test]
    async fn test_row_activation_highlights_line() {
        let f = fixture();
        open_both(&f).await;
        f.analysis.run(AnalysisKind::Anomaly).await;

        assert!(f.analysis.activate_row(0, Instant::now()));
        let state = f.navigator.state();
        let card = state.cards.iter().find(|c| c.file == "auth.log").unwrap();
        assert_eq!(card.highlighted_line.map(|(line, _)| line), Some(2));
    }

    #[tokio::test]
    async fn test_switch_mode_uses_cache() {
        let f = fixture();
        open_both(&f).await;
        f.analysis.run(AnalysisKind::Anomaly).await;

        assert!(!f.analysis.switch_mode());
        assert_eq!(
            f.notifier.last_message().as_deref(),
            Some("No analysis results available")
        );

        f.analysis.run(AnalysisKind::Deep).await;
        assert!(f.analysis.switch_mode());
        assert_eq!(f.analysis.panel().unwrap().kind(), AnalysisKind::Anomaly);
        assert_eq!(f.backend.call_count("detect_anomalies"), 1);
    }

    #[tokio::test]
    async fn test_export_current_mode() {
        let f = fixture();
        assert!(!f.analysis.export().await);
        assert_eq!(
            f.notifier.last_message().as_deref(),
            Some("No data available for download")
        );

        open_both(&f).await;
        f.analysis.run(AnalysisKind::Deep).await;
        assert!(f.analysis.export().await);

        let exports = f.backend.exports();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].0, "deep_analysis");
        assert_eq!(exports[0].1, "d");

        f.backend.set_payload(
            "export_analysis_to_csv",
            r#"{"success":false,"message":"disk full"}"#,
        );
        assert!(!f.analysis.export().await);
        assert_eq!(
            f.notifier.last_message().as_deref(),
            Some("Export failed: disk full")
        );
    }

    #[tokio::test]
    async fn test_close_drops_caches() {
        let f = fixture();
        open_both(&f).await;
        f.analysis.run(AnalysisKind::Anomaly).await;
        assert!(f.analysis.has_results(AnalysisKind::Anomaly));

        f.analysis.close();
        assert!(f.analysis.panel().is_none());
        assert!(!f.analysis.has_results(AnalysisKind::Anomaly));
    }

    #[tokio::test]
    async fn test_navigation_discards_results() {
        let f = fixture();
        open_both(&f).await;
        f.analysis.run(AnalysisKind::Anomaly).await;
        assert_eq!(f.analysis.panel().unwrap().folder, "d");

        f.navigator.load_files("e").await;
        f.navigator.open_file("e", "other.log").await;
        assert!(f.analysis.panel().is_none());
        assert!(!f.analysis.has_results(AnalysisKind::Anomaly));

        // d's anomaly report must not resurface under e
        f.analysis.run(AnalysisKind::Deep).await;
        assert_eq!(f.analysis.panel().unwrap().folder, "e");
        assert!(!f.analysis.switch_mode());
        assert_eq!(
            f.notifier.last_message().as_deref(),
            Some("No anomaly scan results available")
        );
        assert_eq!(f.analysis.panel().unwrap().kind(), AnalysisKind::Deep);
    }

    #[tokio::test]
    async fn test_export_after_navigation_has_no_data() {
        let f = fixture();
        open_both(&f).await;
        f.analysis.run(AnalysisKind::Deep).await;

        f.navigator.back_to_folders();
        assert!(!f.analysis.export().await);
        assert_eq!(
            f.notifier.last_message().as_deref(),
            Some("No data available for download")
        );
        assert!(f.backend.exports().is_empty());
    }

    #[test]
    fn test_rows_show_raw_line_without_markup() {
        let row = PanelRow::Anomaly(AnomalyFinding {
            anomaly_name: "SQL Injection".to_string(),
            danger_level: DangerLevel::High,
            file_name: "web.log".to_string(),
            line_number: 12,
            log_content: "GET /?q=<span class='highlight'>UNION SELECT</span>".to_string(),
            raw_content: "GET /?q=UNION SELECT\n".to_string(),
        });
        assert_eq!(
            row.cells(),
            vec!["SQL Injection", "High", "web.log", "12", "GET /?q=UNION SELECT"]
        );

        // Older payloads without raw_content fall back to the marked line
        let row = PanelRow::Line {
            file_name: "a.log".to_string(),
            finding: LineFinding {
                line_number: 1,
                risk_level: RiskLevel::Low,
                risk_type: "Noise".to_string(),
                confidence: 0.5,
                log_content: "plain".to_string(),
                raw_content: String::new(),
                indicators: vec![],
            },
        };
        assert_eq!(row.cells()[4], "plain");
    }

    #[test]
    fn test_line_row_cells() {
        let row = PanelRow::Line {
            file_name: "a.log".to_string(),
            finding: LineFinding {
                line_number: 7,
                risk_level: RiskLevel::High,
                risk_type: String::new(),
                confidence: 0.876,
                log_content: "boom".to_string(),
                raw_content: "boom".to_string(),
                indicators: vec![],
            },
        };
        assert_eq!(
            row.cells(),
            vec!["High (88%)", "7", "Unclassified", "-", "boom"]
        );
    }
}
