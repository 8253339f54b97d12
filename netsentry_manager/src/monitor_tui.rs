// Terminal UI for NetSentry
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use netsentry_core::analysis::{PanelRow, RunOutcome};
use netsentry_core::chart::ChartKind;
use netsentry_core::dashboard::DashboardState;
use netsentry_core::model::AnalysisKind;
use netsentry_core::navigator::{
    card_layout, file_key, CardBody, CardLayout, FileCard, Listing, View,
};
use netsentry_core::progress::{RiskTint, ToastKind};
use netsentry_core::search::highlight_ranges;
use netsentry_core::Session;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        BarChart, Block, Borders, Cell, Clear, Gauge, List, ListItem, ListState, Paragraph, Row,
        Sparkline, Table, Tabs, Wrap,
    },
    Frame, Terminal,
};
use std::future::Future;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Widest a lone file card gets, in columns
const SINGLE_CARD_COLUMNS: u16 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Dashboard,
    Logs,
    System,
}

impl Tab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Dashboard => "Dashboard",
            Tab::Logs => "Logs",
            Tab::System => "System",
        }
    }

    pub fn all() -> Vec<Tab> {
        vec![Tab::Dashboard, Tab::Logs, Tab::System]
    }
}

#[derive(Debug, Clone, PartialEq)]
enum InputMode {
    Normal,
    Search,
    Upload,
}

pub struct TuiDashboard {
    session: Arc<Session>,
    runtime: Handle,
    active_tab: Tab,
    selected_index: usize,

    // Log browser
    card_index: usize,
    card_scroll: usize,
    /// Last card highlight deadline focus has followed
    followed_highlight: Option<tokio::time::Instant>,
    panel_row: usize,
    input_mode: InputMode,
    search_input: String,
    upload_input: String,

    show_help: bool,
}

impl TuiDashboard {
    pub fn new(session: Arc<Session>, runtime: Handle, initial_tab: Tab) -> Self {
        Self {
            session,
            runtime,
            active_tab: initial_tab,
            selected_index: 0,
            card_index: 0,
            card_scroll: 0,
            followed_highlight: None,
            panel_row: 0,
            input_mode: InputMode::Normal,
            search_input: String::new(),
            upload_input: String::new(),
            show_help: false,
        }
    }

    /// Take over the terminal until the user quits. Must be called from a
    /// thread that has entered `runtime`.
    pub fn run(session: Arc<Session>, runtime: Handle, initial_tab: Tab) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let mut app = TuiDashboard::new(session, runtime, initial_tab);
        app.on_tab_entered();
        let res = app.run_app(&mut terminal);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        app.session.shutdown();
        res
    }

    fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        loop {
            self.session.tick(tokio::time::Instant::now());
            self.follow_card_highlight();
            terminal.draw(|f| self.draw_ui(f))?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if !self.handle_key(key) {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(fut);
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Returns `false` when the user asked to quit
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if self.show_help {
            self.show_help = false;
            return true;
        }

        match self.input_mode {
            InputMode::Search => {
                self.handle_search_key(key);
                return true;
            }
            InputMode::Upload => {
                self.handle_upload_key(key);
                return true;
            }
            InputMode::Normal => {}
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return false,
            KeyCode::Tab => self.next_tab(),
            KeyCode::BackTab => self.prev_tab(),
            KeyCode::Char('?') => self.show_help = true,
            _ => match self.active_tab {
                Tab::Dashboard => self.handle_dashboard_key(key),
                Tab::Logs => self.handle_logs_key(key),
                Tab::System => self.handle_system_key(key),
            },
        }
        true
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) {
        let dashboard = self.session.dashboard.clone();
        let modal = dashboard.state().connection_modal;
        match key.code {
            KeyCode::Char('r') if modal => {
                self.spawn(async move { dashboard.retry_connection().await });
            }
            KeyCode::Esc if modal => dashboard.dismiss_connection_modal(),
            KeyCode::Char('r') => {
                self.spawn(async move {
                    dashboard.update_all_data().await;
                });
            }
            KeyCode::Char('c') => self.spawn(async move { dashboard.toggle_capture().await }),
            KeyCode::Char('s') => self.spawn(async move { dashboard.toggle_sound().await }),
            KeyCode::Char('a') => {
                dashboard.toggle_auto_update();
            }
            KeyCode::Char('t') => {
                dashboard.add_test_alert();
            }
            KeyCode::Esc => dashboard.dismiss_back_online(),
            _ => {}
        }
    }

    fn handle_logs_key(&mut self, key: KeyEvent) {
        let state = self.session.navigator.state();
        let navigator = self.session.navigator.clone();

        match (&state.view, key.code) {
            (View::Folders, KeyCode::Up) | (View::Files { .. }, KeyCode::Up) => self.select_prev(),
            (View::Folders, KeyCode::Down) => self.select_next(state.folders.items().len()),
            (View::Files { .. }, KeyCode::Down) => self.select_next(state.files.items().len()),
            (View::Folders, KeyCode::Enter) => {
                if let Some(folder) = state.folders.items().get(self.selected_index).cloned() {
                    self.selected_index = 0;
                    self.spawn(async move { navigator.load_files(&folder).await });
                }
            }
            (View::Folders, KeyCode::Char('r')) => {
                self.spawn(async move { navigator.load_folders().await });
            }
            (View::Files { folder }, KeyCode::Enter) => {
                if let Some(file) = state.files.items().get(self.selected_index).cloned() {
                    let folder = folder.clone();
                    self.card_scroll = 0;
                    let key = file_key(&folder, &file);
                    if let Some(index) = state.cards.iter().position(|c| c.key == key) {
                        self.card_index = index;
                    }
                    self.spawn(async move {
                        navigator.open_file(&folder, &file).await;
                    });
                }
            }
            (View::Files { folder }, KeyCode::Char('o')) => {
                let folder = folder.clone();
                self.card_index = 0;
                self.spawn(async move {
                    navigator.open_all(&folder).await;
                });
            }
            (View::Files { .. }, KeyCode::Esc) | (View::Files { .. }, KeyCode::Backspace) => {
                self.selected_index = 0;
                navigator.back_to_folders();
                self.spawn(async move { navigator.load_folders().await });
            }
            (View::Detail { .. }, _) => self.handle_detail_key(key),
            (_, KeyCode::Char('u')) => self.input_mode = InputMode::Upload,
            _ => {}
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        let state = self.session.navigator.state();
        let navigator = self.session.navigator.clone();
        let analysis = self.session.analysis.clone();
        let View::Detail { folder } = state.view.clone() else {
            return;
        };

        match key.code {
            KeyCode::Left => {
                self.card_index = self.card_index.saturating_sub(1);
                self.card_scroll = 0;
            }
            KeyCode::Right => {
                if self.card_index + 1 < state.cards.len() {
                    self.card_index += 1;
                    self.card_scroll = 0;
                }
            }
            KeyCode::Up => self.card_scroll = self.card_scroll.saturating_sub(1),
            KeyCode::Down => self.card_scroll = self.card_scroll.saturating_add(1),
            KeyCode::PageUp => self.card_scroll = self.card_scroll.saturating_sub(10),
            KeyCode::PageDown => self.card_scroll = self.card_scroll.saturating_add(10),
            KeyCode::Char('x') => {
                if let Some(card) = state.cards.get(self.card_index) {
                    let key = card.key.clone();
                    self.card_index = self.card_index.saturating_sub(1);
                    self.spawn(async move { navigator.close_file(&key).await });
                }
            }
            KeyCode::Char('o') => {
                self.spawn(async move {
                    navigator.open_all(&folder).await;
                });
            }
            KeyCode::Esc | KeyCode::Backspace => {
                self.card_index = 0;
                self.selected_index = 0;
                self.session.search.clear();
                self.search_input.clear();
                self.spawn(async move { navigator.back_to_files(&folder).await });
            }
            KeyCode::Char('/') => self.input_mode = InputMode::Search,
            KeyCode::Char('u') => self.input_mode = InputMode::Upload,
            KeyCode::Char('n') => self.start_analysis(AnalysisKind::Anomaly),
            KeyCode::Char('d') => self.start_analysis(AnalysisKind::Deep),
            KeyCode::Char('m') => {
                self.panel_row = 0;
                analysis.switch_mode();
            }
            KeyCode::Char('e') => self.spawn(async move {
                analysis.export().await;
            }),
            KeyCode::Char('z') => {
                self.panel_row = 0;
                analysis.close();
            }
            KeyCode::Char('[') => self.panel_row = self.panel_row.saturating_sub(1),
            KeyCode::Char(']') => {
                let rows = analysis.panel().map(|p| p.rows().len()).unwrap_or(0);
                if self.panel_row + 1 < rows {
                    self.panel_row += 1;
                }
            }
            KeyCode::Enter => {
                if analysis.activate_row(self.panel_row, tokio::time::Instant::now()) {
                    self.focus_highlighted_card();
                }
            }
            _ => {}
        }
    }

    fn start_analysis(&mut self, kind: AnalysisKind) {
        let analysis = self.session.analysis.clone();
        self.panel_row = 0;
        self.spawn(async move {
            if analysis.run(kind).await == RunOutcome::Busy {
                tracing::debug!("analysis already running");
            }
        });
    }

    /// Re-opening a file highlights its card; move focus there so it's visible
    fn follow_card_highlight(&mut self) {
        let state = self.session.navigator.state();
        let latest = state
            .cards
            .iter()
            .enumerate()
            .filter_map(|(index, card)| card.highlight_until.map(|until| (index, until)))
            .max_by_key(|(_, until)| *until);

        if let Some((index, until)) = latest {
            if self.followed_highlight != Some(until) {
                if index != self.card_index {
                    self.card_index = index;
                    self.card_scroll = 0;
                }
                self.followed_highlight = Some(until);
            }
        }
    }

    /// Move focus and scroll to the card whose line was just highlighted
    fn focus_highlighted_card(&mut self) {
        let state = self.session.navigator.state();
        if let Some((index, card)) = state
            .cards
            .iter()
            .enumerate()
            .find(|(_, c)| c.highlighted_line.is_some())
        {
            self.card_index = index;
            if let Some((line, _)) = card.highlighted_line {
                self.card_scroll = line.saturating_sub(3);
            }
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.search_input.clear();
                self.session.search.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Enter => self.input_mode = InputMode::Normal,
            KeyCode::Backspace => {
                self.search_input.pop();
                self.session.search.on_input(&self.search_input);
            }
            KeyCode::Char(c) => {
                self.search_input.push(c);
                self.card_scroll = 0;
                self.session.search.on_input(&self.search_input);
            }
            _ => {}
        }
    }

    fn handle_upload_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.upload_input.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Enter => {
                let paths: Vec<PathBuf> = self
                    .upload_input
                    .split_whitespace()
                    .map(PathBuf::from)
                    .collect();
                self.upload_input.clear();
                self.input_mode = InputMode::Normal;
                if !paths.is_empty() {
                    self.upload(paths);
                }
            }
            KeyCode::Backspace => {
                self.upload_input.pop();
            }
            KeyCode::Char(c) => self.upload_input.push(c),
            _ => {}
        }
    }

    fn upload(&self, paths: Vec<PathBuf>) {
        let navigator = self.session.navigator.clone();
        let notifier = self.session.notifier.clone();
        self.spawn(async move {
            let mut files = Vec::new();
            for path in paths {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                match tokio::fs::read(&path).await {
                    Ok(bytes) => files.push((name, bytes)),
                    Err(e) => notifier.notify(
                        format!("Error uploading {}: {}", name, e),
                        ToastKind::Error,
                    ),
                }
            }
            if !files.is_empty() {
                navigator.upload(files).await;
                navigator.load_folders().await;
            }
        });
    }

    fn handle_system_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('f') {
            let session = self.session.clone();
            self.spawn(async move {
                session.system_log.fetch_system_logs().await;
            });
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    fn next_tab(&mut self) {
        let tabs = Tab::all();
        let current = tabs.iter().position(|&t| t == self.active_tab).unwrap_or(0);
        self.active_tab = tabs[(current + 1) % tabs.len()];
        self.selected_index = 0;
        self.on_tab_entered();
    }

    fn prev_tab(&mut self) {
        let tabs = Tab::all();
        let current = tabs.iter().position(|&t| t == self.active_tab).unwrap_or(0);
        self.active_tab = tabs[if current == 0 {
            tabs.len() - 1
        } else {
            current - 1
        }];
        self.selected_index = 0;
        self.on_tab_entered();
    }

    /// The log browser loads its folder list the first time it is shown
    fn on_tab_entered(&self) {
        if self.active_tab == Tab::Logs
            && self.session.navigator.state().folders == Listing::Idle
        {
            let navigator = self.session.navigator.clone();
            self.spawn(async move { navigator.load_folders().await });
        }
    }

    fn select_next(&mut self, len: usize) {
        if self.selected_index + 1 < len {
            self.selected_index += 1;
        }
    }

    fn select_prev(&mut self) {
        self.selected_index = self.selected_index.saturating_sub(1);
    }

    // ========================================================================
    // Drawing
    // ========================================================================

    fn draw_ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4), // Header
                Constraint::Min(0),    // Content
                Constraint::Length(1), // Toast
                Constraint::Length(1), // Footer
            ])
            .split(f.area());

        let dashboard = self.session.dashboard.state();
        self.draw_header(f, chunks[0], &dashboard);

        if self.show_help {
            self.draw_help(f, chunks[1]);
        } else {
            match self.active_tab {
                Tab::Dashboard => self.draw_dashboard(f, chunks[1], &dashboard),
                Tab::Logs => self.draw_logs(f, chunks[1]),
                Tab::System => self.draw_system(f, chunks[1]),
            }
        }

        self.draw_toast(f, chunks[2]);
        self.draw_footer(f, chunks[3]);

        if dashboard.connection_modal {
            self.draw_connection_modal(f);
        }
        self.draw_loading_overlay(f);
    }

    fn draw_header(&self, f: &mut Frame, area: Rect, dashboard: &DashboardState) {
        let header_block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue));
        let inner_area = header_block.inner(area);
        f.render_widget(header_block, area);

        let header_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .split(inner_area);

        let (link, link_color) = if dashboard.online {
            if dashboard.back_online_until.is_some() {
                ("BACK ONLINE", Color::Green)
            } else {
                ("ONLINE", Color::Green)
            }
        } else {
            ("OFFLINE", Color::Red)
        };

        let mut status_text = vec![
            Span::styled(
                "NETSENTRY ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("{} | ", self.session.bridge.backend_name())),
            Span::styled(link, Style::default().fg(link_color)),
            Span::raw(" | Logs: "),
            Span::styled(
                dashboard.log_count.to_string(),
                Style::default().fg(Color::Cyan),
            ),
        ];
        if dashboard.capturing {
            status_text.push(Span::raw(" | "));
            status_text.push(Span::styled("CAPTURING", Style::default().fg(Color::Green)));
        }
        if dashboard.auto_update {
            status_text.push(Span::raw(" | "));
            status_text.push(Span::styled("AUTO", Style::default().fg(Color::Yellow)));
        }
        if dashboard.loading {
            status_text.push(Span::raw(" | updating..."));
        }

        let status_line = Paragraph::new(Line::from(status_text)).alignment(Alignment::Center);
        f.render_widget(status_line, header_chunks[0]);

        let titles: Vec<Line> = Tab::all()
            .iter()
            .map(|t| Line::from(vec![Span::raw(t.as_str())]))
            .collect();
        let selected = Tab::all()
            .iter()
            .position(|&t| t == self.active_tab)
            .unwrap_or(0);

        let tabs = Tabs::new(titles)
            .select(selected)
            .style(Style::default().fg(Color::Gray))
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .divider(Span::raw(" | "));
        f.render_widget(tabs, header_chunks[1]);
    }

    fn draw_dashboard(&self, f: &mut Frame, area: Rect, state: &DashboardState) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),      // Toggles
                Constraint::Percentage(35), // Timeline + protocols
                Constraint::Percentage(30), // Sources + services
                Constraint::Min(5),         // Alerts
            ])
            .split(area);

        let on_off = |flag: bool| if flag { "ON" } else { "OFF" };
        let sound = match state.sound_enabled {
            Some(enabled) => on_off(enabled),
            None => "?",
        };
        let toggles = Paragraph::new(Line::from(vec![
            Span::raw(" Capture: "),
            Span::styled(
                on_off(state.capturing),
                Style::default().fg(if state.capturing { Color::Green } else { Color::Gray }),
            ),
            Span::raw("   Alert sound: "),
            Span::raw(sound),
            Span::raw("   Auto-update: "),
            Span::raw(on_off(state.auto_update)),
            Span::raw(format!("   Refreshes: {}", state.updates_completed)),
        ]))
        .block(Block::default().borders(Borders::ALL).title("Controls"));
        f.render_widget(toggles, rows[0]);

        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[1]);
        self.draw_timeline(f, top[0], state);
        self.draw_bar_chart(f, top[1], state, ChartKind::Protocol, Direction::Vertical);

        let middle = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[2]);
        self.draw_bar_chart(f, middle[0], state, ChartKind::Sources, Direction::Horizontal);
        self.draw_bar_chart(f, middle[1], state, ChartKind::Services, Direction::Horizontal);

        self.draw_alerts(f, rows[3], state);
    }

    fn draw_timeline(&self, f: &mut Frame, area: Rect, state: &DashboardState) {
        let series = state.charts.chart(ChartKind::Timeline).series();
        let title = match (series.labels.first(), series.labels.last()) {
            (Some(first), Some(last)) => {
                format!("{} ({} - {})", ChartKind::Timeline.title(), first, last)
            }
            _ => ChartKind::Timeline.title().to_string(),
        };
        let sparkline = Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(title))
            .data(&series.values)
            .max(series.max_value().max(1))
            .style(Style::default().fg(Color::Cyan));
        f.render_widget(sparkline, area);
    }

    fn draw_bar_chart(
        &self,
        f: &mut Frame,
        area: Rect,
        state: &DashboardState,
        kind: ChartKind,
        direction: Direction,
    ) {
        let series = state.charts.chart(kind).series();
        let data: Vec<(&str, u64)> = series.points().collect();
        let chart = BarChart::default()
            .block(Block::default().borders(Borders::ALL).title(kind.title()))
            .data(&data[..])
            .direction(direction)
            .bar_width(if direction == Direction::Vertical { 6 } else { 1 })
            .bar_gap(if direction == Direction::Vertical { 1 } else { 0 })
            .bar_style(Style::default().fg(Color::Green))
            .value_style(Style::default().fg(Color::Black).bg(Color::Green));
        f.render_widget(chart, area);
    }

    fn draw_alerts(&self, f: &mut Frame, area: Rect, state: &DashboardState) {
        let rows: Vec<Row> = state
            .alerts
            .iter()
            .map(|alert| {
                Row::new(vec![
                    Cell::from(alert.time.clone()),
                    Cell::from(alert.alert_type.clone()),
                    Cell::from(alert.source_ip.clone()),
                    Cell::from(alert.severity.clone())
                        .style(Style::default().fg(severity_color(&alert.severity))),
                    Cell::from(alert.description.clone()),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(9),
                Constraint::Length(22),
                Constraint::Length(16),
                Constraint::Length(9),
                Constraint::Min(20),
            ],
        )
        .header(
            Row::new(vec!["Time", "Type", "Source", "Severity", "Description"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Recent Alerts ({})", state.alerts.len())),
        );
        f.render_widget(table, area);
    }

    fn draw_logs(&self, f: &mut Frame, area: Rect) {
        let state = self.session.navigator.state();
        match &state.view {
            View::Folders => self.draw_listing(f, area, "Log Folders", &state.folders),
            View::Files { folder } => {
                self.draw_listing(f, area, &format!("Files in {}", folder), &state.files)
            }
            View::Detail { folder } => {
                let panel = self.session.analysis.panel();
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints(match panel {
                        Some(_) => [Constraint::Percentage(55), Constraint::Percentage(45)],
                        None => [Constraint::Percentage(100), Constraint::Length(0)],
                    })
                    .split(area);
                self.draw_cards(f, chunks[0], folder, &state.cards);
                if panel.is_some() {
                    self.draw_analysis_panel(f, chunks[1]);
                }
            }
        }
    }

    fn draw_listing(&self, f: &mut Frame, area: Rect, title: &str, listing: &Listing) {
        let block = Block::default().borders(Borders::ALL).title(title.to_string());
        match listing {
            Listing::Loaded(items) => {
                let list_items: Vec<ListItem> =
                    items.iter().map(|i| ListItem::new(i.as_str())).collect();
                let list = List::new(list_items)
                    .block(block)
                    .highlight_style(
                        Style::default()
                            .fg(Color::Black)
                            .bg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    )
                    .highlight_symbol("> ");
                let mut list_state = ListState::default();
                list_state.select(Some(self.selected_index.min(items.len().saturating_sub(1))));
                f.render_stateful_widget(list, area, &mut list_state);
            }
            other => {
                let (text, color) = match other {
                    Listing::Idle | Listing::Loading => ("Loading...".to_string(), Color::Gray),
                    Listing::Empty(message) => (message.clone(), Color::Gray),
                    Listing::Failed(message) => (message.clone(), Color::Red),
                    Listing::Loaded(_) => (String::new(), Color::Gray),
                };
                let paragraph = Paragraph::new(text)
                    .style(Style::default().fg(color))
                    .block(block);
                f.render_widget(paragraph, area);
            }
        }
    }

    fn draw_cards(&self, f: &mut Frame, area: Rect, folder: &str, cards: &[FileCard]) {
        let Some(layout) = card_layout(cards.len()) else {
            let empty = Paragraph::new("No files open")
                .block(Block::default().borders(Borders::ALL).title(folder.to_string()));
            f.render_widget(empty, area);
            return;
        };

        match layout {
            CardLayout::Single { .. } => {
                let width = area.width.min(SINGLE_CARD_COLUMNS);
                let rect = Rect {
                    x: area.x + (area.width - width) / 2,
                    width,
                    ..area
                };
                self.draw_card(f, rect, &cards[0], 0);
            }
            CardLayout::Grid { columns, span_last } => {
                let columns = columns as usize;
                let row_count = cards.len().div_ceil(columns);
                let rows = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints(vec![Constraint::Ratio(1, row_count as u32); row_count])
                    .split(area);

                for (row_index, row_area) in rows.iter().enumerate() {
                    let start = row_index * columns;
                    let in_row = &cards[start..(start + columns).min(cards.len())];
                    if span_last && in_row.len() == 1 {
                        self.draw_card(f, *row_area, &in_row[0], start);
                        continue;
                    }
                    let cells = Layout::default()
                        .direction(Direction::Horizontal)
                        .constraints(vec![Constraint::Ratio(1, columns as u32); columns])
                        .split(*row_area);
                    for (offset, card) in in_row.iter().enumerate() {
                        self.draw_card(f, cells[offset], card, start + offset);
                    }
                }
            }
        }
    }

    fn draw_card(&self, f: &mut Frame, area: Rect, card: &FileCard, index: usize) {
        let focused = index == self.card_index;
        let border = if card.highlight_until.is_some() {
            Color::Yellow
        } else if focused {
            Color::Cyan
        } else {
            Color::DarkGray
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(card.header())
            .title_bottom(Line::from(card.footer()).alignment(Alignment::Right));

        let term = card.search.as_ref().map(|s| s.term.clone());
        let lines: Vec<Line> = match &card.body {
            CardBody::Loading => vec![Line::from("Loading...")],
            CardBody::Failed { message } => vec![Line::from(Span::styled(
                message.clone(),
                Style::default().fg(Color::Red),
            ))],
            CardBody::Loaded { .. } => match card.no_results() {
                Some(placeholder) => vec![Line::from(Span::styled(
                    placeholder,
                    Style::default().fg(Color::Gray),
                ))],
                None => card
                    .visible_lines()
                    .into_iter()
                    .map(|(number, text)| {
                        let highlighted = card
                            .highlighted_line
                            .map(|(line, _)| line == number)
                            .unwrap_or(false);
                        log_line(number, text, term.as_deref(), highlighted)
                    })
                    .collect(),
            },
        };

        let scroll = if focused { self.card_scroll as u16 } else { 0 };
        let paragraph = Paragraph::new(lines).block(block).scroll((scroll, 0));
        f.render_widget(paragraph, area);
    }

    fn draw_analysis_panel(&self, f: &mut Frame, area: Rect) {
        let Some(panel) = self.session.analysis.panel() else {
            return;
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta))
            .title(format!(
                "{} - {} [m] {} [e] Download [z] Close",
                panel.title(),
                panel.folder,
                panel.switch_label()
            ));
        let inner = block.inner(area);
        f.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(inner);

        let mut summary = Vec::new();
        for (label, value) in panel.summary() {
            summary.push(Span::styled(
                format!("{}: ", label),
                Style::default().fg(Color::Gray),
            ));
            summary.push(Span::raw(format!("{}   ", value)));
        }
        f.render_widget(Paragraph::new(Line::from(summary)), chunks[0]);

        if let Some(message) = panel.empty_message() {
            let empty = Paragraph::new(message).style(Style::default().fg(Color::Green));
            f.render_widget(empty, chunks[1]);
            return;
        }

        let rows: Vec<Row> = panel
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let color = match row {
                    PanelRow::Accordion { risk, .. } => risk_color(risk.as_str()),
                    PanelRow::Anomaly(finding) => risk_color(finding.danger_level.as_str()),
                    PanelRow::Line { finding, .. } => risk_color(finding.risk_level.as_str()),
                    PanelRow::NoIssues => Color::Green,
                };
                let mut style = Style::default().fg(color);
                if i == self.panel_row {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                Row::new(row.cells()).style(style)
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(24),
                Constraint::Length(10),
                Constraint::Length(20),
                Constraint::Length(16),
                Constraint::Min(20),
            ],
        );
        f.render_widget(table, chunks[1]);
    }

    fn draw_system(&self, f: &mut Frame, area: Rect) {
        let attached = self.session.system_log.is_attached();
        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "System Log Collection",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from("Collects the host's system and security logs on the backend."),
            Line::from("Progress is shown in the overlay while the job runs."),
            Line::from(""),
            Line::from(vec![
                Span::raw("Backend: "),
                if attached {
                    Span::styled("connected", Style::default().fg(Color::Green))
                } else {
                    Span::styled("not connected", Style::default().fg(Color::Red))
                },
            ]),
            Line::from(""),
            Line::from("Press [f] to fetch system logs."),
        ];
        let paragraph = Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("System"))
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
    }

    fn draw_help(&self, f: &mut Frame, area: Rect) {
        let section = |title: &'static str| {
            Line::from(vec![Span::styled(title, Style::default().fg(Color::Cyan))])
        };
        let help_text = vec![
            Line::from(""),
            Line::from(vec![Span::styled(
                "NetSentry Terminal Dashboard - Help",
                Style::default().add_modifier(Modifier::BOLD),
            )]),
            Line::from(""),
            section("Navigation:"),
            Line::from("  Tab        - Next tab (Dashboard  Logs  System)"),
            Line::from("  Shift+Tab  - Previous tab"),
            Line::from("  q          - Quit"),
            Line::from("  ?          - Show this help"),
            Line::from(""),
            section("Dashboard:"),
            Line::from("  c          - Start/stop capture"),
            Line::from("  s          - Toggle alert sound"),
            Line::from("  a          - Toggle 5 s auto-update"),
            Line::from("  r          - Refresh now (retry when offline)"),
            Line::from("  t          - Add a local test alert"),
            Line::from(""),
            section("Logs:"),
            Line::from("  ↑/↓ Enter  - Choose folder / open file"),
            Line::from("  o          - Open all files in the folder"),
            Line::from("  u          - Upload files (space separated paths)"),
            Line::from("  ← →        - Focus previous/next card, x closes it"),
            Line::from("  /          - Search open files"),
            Line::from("  n / d      - Anomaly scan / deep analysis"),
            Line::from("  [ ] Enter  - Select result row, jump to its line"),
            Line::from("  m e z      - Switch mode, download, close results"),
            Line::from("  Esc        - Back"),
            Line::from(""),
            section("System:"),
            Line::from("  f          - Fetch system logs"),
            Line::from(""),
            Line::from("Press any key to close this help..."),
        ];

        let help = Paragraph::new(help_text)
            .block(
                Block::default()
                    .title("Help")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .alignment(Alignment::Left);
        f.render_widget(help, area);
    }

    fn draw_toast(&self, f: &mut Frame, area: Rect) {
        let Some(toast) = self.session.notifier.toast() else {
            return;
        };
        let color = match toast.risk {
            Some(RiskTint::Critical) | Some(RiskTint::High) => Color::Red,
            Some(RiskTint::Medium) => Color::Yellow,
            Some(RiskTint::Low) => Color::Green,
            None => match toast.kind {
                ToastKind::Success => Color::Green,
                ToastKind::Error => Color::Red,
                ToastKind::Warning => Color::Yellow,
                ToastKind::Info => Color::Blue,
            },
        };
        let text = match &toast.title {
            Some(title) => format!(" {}: {} ", title, toast.message),
            None => format!(" {} ", toast.message),
        };
        let paragraph = Paragraph::new(text)
            .alignment(Alignment::Right)
            .style(Style::default().fg(Color::White).bg(color));
        f.render_widget(paragraph, area);
    }

    fn draw_footer(&self, f: &mut Frame, area: Rect) {
        let text = match self.input_mode {
            InputMode::Search => format!(
                "Search: {}_   [ENTER] Keep | [ESC] Clear{}",
                self.search_input,
                if self.session.search.state().searching {
                    " | searching..."
                } else {
                    ""
                }
            ),
            InputMode::Upload => format!(
                "Upload: {}_   [ENTER] Upload | [ESC] Cancel",
                self.upload_input
            ),
            InputMode::Normal => {
                let hint = if self.show_help {
                    "Press any key to close help"
                } else {
                    match self.active_tab {
                        Tab::Dashboard => {
                            "[C] Capture | [S] Sound | [A] Auto | [R] Refresh | [T] Test Alert | [TAB] Switch Tab | [?] Help | [Q] Quit"
                        }
                        Tab::Logs => match self.session.navigator.state().view {
                            View::Detail { .. } => {
                                "[/] Search | [N] Scan | [D] Analyze | [X] Close | [O] Open All | [ESC] Back | [?] Help"
                            }
                            _ => "[ENTER] Open | [O] Open All | [U] Upload | [ESC] Back | [TAB] Switch Tab | [Q] Quit",
                        },
                        Tab::System => "[F] Fetch Logs | [TAB] Switch Tab | [?] Help | [Q] Quit",
                    }
                };
                hint.to_string()
            }
        };

        let footer = Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(footer, area);
    }

    fn draw_connection_modal(&self, f: &mut Frame) {
        let area = popup_area(f.area(), 50, 7);
        f.render_widget(Clear, area);
        let text = vec![
            Line::from(""),
            Line::from("The backend is not responding."),
            Line::from(""),
            Line::from("[R] Retry   [ESC] Dismiss"),
        ];
        let modal = Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .title("Connection Issue")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            );
        f.render_widget(modal, area);
    }

    fn draw_loading_overlay(&self, f: &mut Frame) {
        let Some(overlay) = self.session.notifier.overlay() else {
            return;
        };
        let area = popup_area(f.area(), 60, 5);
        f.render_widget(Clear, area);
        let label = match &overlay.detail {
            Some(detail) => format!("{}% - {}", overlay.percentage, detail),
            None => format!("{}%", overlay.percentage),
        };
        let gauge = Gauge::default()
            .block(
                Block::default()
                    .title(overlay.message.clone())
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
            .percent(overlay.percentage.min(100) as u16)
            .label(label);
        f.render_widget(gauge, area);
    }
}

/// Centered popup of at most `width` x `height`
fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4)).max(1);
    let height = height.min(area.height.saturating_sub(2)).max(1);
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

fn severity_color(severity: &str) -> Color {
    match severity {
        "critical" | "high" => Color::Red,
        "medium" => Color::Yellow,
        "low" => Color::Green,
        _ => Color::Gray,
    }
}

fn risk_color(level: &str) -> Color {
    severity_color(&level.to_ascii_lowercase())
}

/// One numbered log line, with search hits and the jump target highlighted
fn log_line<'a>(number: usize, text: &'a str, term: Option<&str>, highlighted: bool) -> Line<'a> {
    let base = if highlighted {
        Style::default().bg(Color::Yellow).fg(Color::Black)
    } else {
        Style::default()
    };
    let mut spans = vec![Span::styled(
        format!("{:>5} ", number),
        Style::default().fg(Color::DarkGray),
    )];

    let ranges = term.map(|t| highlight_ranges(text, t)).unwrap_or_default();
    let mut cursor = 0;
    for range in ranges {
        if range.start > cursor {
            spans.push(Span::styled(&text[cursor..range.start], base));
        }
        spans.push(Span::styled(
            &text[range.clone()],
            base.bg(Color::Magenta).fg(Color::White),
        ));
        cursor = range.end;
    }
    if cursor < text.len() {
        spans.push(Span::styled(&text[cursor..], base));
    }
    Line::from(spans)
}

// ============================================================================
// TUI Dashboard Unit Tests
// ============================================================================
