//! Chart state for the dashboard
//!
//! A chart holds the series it currently displays. Incoming data is shaped
//! (downsampled, ranked, relabelled) and compared against that series; the
//! chart only counts a redraw when something actually changed.

use crate::config::DashboardConfig;
use crate::model::{CountMap, TimelinePoint, TrafficSummary};
use chrono::{DateTime, NaiveDateTime};
use std::collections::HashMap;

/// Labels plus values, compared order-sensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

impl ChartSeries {
    pub fn new(labels: Vec<String>, values: Vec<u64>) -> Self {
        Self { labels, values }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn max_value(&self) -> u64 {
        self.values.iter().copied().max().unwrap_or(0)
    }

    pub fn points(&self) -> impl Iterator<Item = (&str, u64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    Timeline,
    Protocol,
    Sources,
    Services,
}

impl ChartKind {
    pub fn title(&self) -> &'static str {
        match self {
            ChartKind::Timeline => "Traffic Timeline",
            ChartKind::Protocol => "Protocol Distribution",
            ChartKind::Sources => "Top Source IPs",
            ChartKind::Services => "Top Services",
        }
    }

    pub fn all() -> [ChartKind; 4] {
        [
            ChartKind::Timeline,
            ChartKind::Protocol,
            ChartKind::Sources,
            ChartKind::Services,
        ]
    }
}

/// A single chart instance
#[derive(Debug, Clone)]
pub struct Chart {
    kind: ChartKind,
    series: ChartSeries,
    redraws: u64,
}

impl Chart {
    pub fn new(kind: ChartKind) -> Self {
        Self {
            kind,
            series: ChartSeries::default(),
            redraws: 0,
        }
    }

    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn series(&self) -> &ChartSeries {
        &self.series
    }

    /// Number of times the displayed series actually changed
    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    /// Replace the displayed series; returns `false` when nothing changed
    pub fn update(&mut self, series: ChartSeries) -> bool {
        if self.series == series {
            return false;
        }
        self.series = series;
        self.redraws += 1;
        true
    }
}

/// Keep every `step`-th point once the timeline grows past `threshold`,
/// where `step = max(1, ceil(n / target))`
pub fn downsample_timeline<'a>(
    points: &'a [TimelinePoint],
    threshold: usize,
    target: usize,
) -> Vec<&'a TimelinePoint> {
    if points.len() <= threshold {
        return points.iter().collect();
    }
    let step = points.len().div_ceil(target.max(1)).max(1);
    points.iter().step_by(step).collect()
}

/// `HH:MM` for a bucket timestamp, or the raw string when it does not parse
pub fn format_bucket_label(timestamp: &str) -> String {
    parse_timestamp(timestamp)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Accepts RFC 3339 and the naive ISO shapes the backend emits
pub fn parse_timestamp(timestamp: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.naive_local());
    }
    const FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(timestamp, fmt).ok())
}

/// Sort descending by value, ties keep payload order, optionally truncate
pub fn rank_entries(entries: &CountMap, limit: Option<usize>) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = entries.iter().map(|(k, v)| (k.to_string(), v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    ranked
}

const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (20, "FTP Data"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (67, "DHCP"),
    (68, "DHCP"),
    (80, "HTTP"),
    (110, "POP3"),
    (123, "NTP"),
    (143, "IMAP"),
    (161, "SNMP"),
    (162, "SNMP"),
    (389, "LDAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (465, "SMTPS"),
    (587, "SMTP"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "MSSQL"),
    (1521, "Oracle"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5060, "SIP"),
    (5061, "SIP"),
    (5432, "PostgreSQL"),
    (8080, "HTTP Alt"),
    (8443, "HTTPS Alt"),
];

/// Memoised port → service label lookup
#[derive(Debug, Clone, Default)]
pub struct ServiceNames {
    cache: HashMap<String, String>,
}

impl ServiceNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// `"HTTPS (443)"` for well-known ports, `"Port N"` otherwise
    pub fn label(&mut self, port: &str) -> String {
        if let Some(label) = self.cache.get(port) {
            return label.clone();
        }
        let label = match port.trim().parse::<u16>() {
            Ok(number) => match WELL_KNOWN_PORTS.iter().find(|(p, _)| *p == number) {
                Some((_, name)) => format!("{} ({})", name, number),
                None => format!("Port {}", number),
            },
            Err(_) => format!("Port {}", port),
        };
        self.cache.insert(port.to_string(), label.clone());
        label
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// The four dashboard charts and the shaping rules that feed them
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    timeline: Chart,
    protocol: Chart,
    sources: Chart,
    services: Chart,
    service_names: ServiceNames,
    timeline_threshold: usize,
    timeline_target: usize,
    top_entries: usize,
}

impl ChartRenderer {
    pub fn new(config: &DashboardConfig) -> Self {
        Self {
            timeline: Chart::new(ChartKind::Timeline),
            protocol: Chart::new(ChartKind::Protocol),
            sources: Chart::new(ChartKind::Sources),
            services: Chart::new(ChartKind::Services),
            service_names: ServiceNames::new(),
            timeline_threshold: config.timeline_threshold,
            timeline_target: config.timeline_target_points,
            top_entries: config.top_entries,
        }
    }

    pub fn chart(&self, kind: ChartKind) -> &Chart {
        match kind {
            ChartKind::Timeline => &self.timeline,
            ChartKind::Protocol => &self.protocol,
            ChartKind::Sources => &self.sources,
            ChartKind::Services => &self.services,
        }
    }

    /// An empty timeline leaves the chart untouched
    pub fn render_timeline(&mut self, points: &[TimelinePoint]) -> bool {
        if points.is_empty() {
            return false;
        }
        let sampled = downsample_timeline(points, self.timeline_threshold, self.timeline_target);
        let series = ChartSeries::new(
            sampled
                .iter()
                .map(|p| format_bucket_label(&p.timestamp))
                .collect(),
            sampled.iter().map(|p| p.count).collect(),
        );
        self.timeline.update(series)
    }

    pub fn render_protocol(&mut self, distribution: &CountMap) -> bool {
        let ranked = rank_entries(distribution, None);
        self.protocol.update(Self::to_series(ranked))
    }

    pub fn render_sources(&mut self, sources: &CountMap) -> bool {
        let ranked = rank_entries(sources, Some(self.top_entries));
        self.sources.update(Self::to_series(ranked))
    }

    pub fn render_services(&mut self, services: &CountMap) -> bool {
        let ranked = rank_entries(services, Some(self.top_entries));
        let series = ChartSeries::new(
            ranked
                .iter()
                .map(|(port, _)| self.service_names.label(port))
                .collect(),
            ranked.iter().map(|(_, count)| *count).collect(),
        );
        self.services.update(series)
    }

    /// Feed all three summary charts; returns how many redrew
    pub fn render_summary(&mut self, summary: &TrafficSummary) -> usize {
        [
            self.render_protocol(&summary.protocol_distribution),
            self.render_sources(&summary.top_sources),
            self.render_services(&summary.top_services),
        ]
        .into_iter()
        .filter(|redrawn| *redrawn)
        .count()
    }

    fn to_series(ranked: Vec<(String, u64)>) -> ChartSeries {
        let (labels, values) = ranked.into_iter().unzip();
        ChartSeries::new(labels, values)
    }
}
