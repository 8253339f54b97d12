//! Log browser navigation
//!
//! Three views: folder list → file list → file detail. The detail view holds
//! one card per open file, keyed `folder/filename`; a key never gets a second
//! card. Every folder change bumps a generation counter so late responses
//! (file reads, analysis results) from a previous folder can be discarded.

use crate::bridge::BridgeAdapter;
use crate::config::NotificationConfig;
use crate::progress::{Notifier, ToastKind};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const CARD_MAX_WIDTH: u16 = 800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Folders,
    Files { folder: String },
    Detail { folder: String },
}

/// Listing state shared by the folder and file lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Idle,
    Loading,
    Loaded(Vec<String>),
    Empty(String),
    Failed(String),
}

impl Listing {
    pub fn items(&self) -> &[String] {
        match self {
            Listing::Loaded(items) => items,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardBody {
    Loading,
    Loaded { lines: Vec<String>, created_at: String },
    /// Error text only, rendered without line numbers
    Failed { message: String },
}

/// Search outcome for one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSearch {
    pub term: String,
    /// Zero-based indices of matching lines; every other line is hidden
    pub matches: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileCard {
    pub key: String,
    pub id: String,
    pub folder: String,
    pub file: String,
    pub body: CardBody,
    pub highlight_until: Option<Instant>,
    /// One-based line number and when its highlight ends
    pub highlighted_line: Option<(usize, Instant)>,
    pub search: Option<CardSearch>,
}

impl FileCard {
    pub fn lines(&self) -> &[String] {
        match &self.body {
            CardBody::Loaded { lines, .. } => lines,
            _ => &[],
        }
    }

    /// Header text, with a match count while a search has hits in this card
    pub fn header(&self) -> String {
        match &self.search {
            Some(search) if !search.matches.is_empty() => {
                format!("{} ({} matches)", self.file, search.matches.len())
            }
            _ => self.file.clone(),
        }
    }

    pub fn footer(&self) -> String {
        match &self.body {
            CardBody::Loading => "Loading file information...".to_string(),
            CardBody::Loaded { created_at, .. } => format!("File created: {}", created_at),
            CardBody::Failed { .. } => "Failed to load file".to_string(),
        }
    }

    /// Lines to display as `(one-based number, text)`, filtered by search
    pub fn visible_lines(&self) -> Vec<(usize, &str)> {
        let lines = self.lines();
        match &self.search {
            Some(search) => search
                .matches
                .iter()
                .filter_map(|&i| lines.get(i).map(|l| (i + 1, l.as_str())))
                .collect(),
            None => lines
                .iter()
                .enumerate()
                .map(|(i, l)| (i + 1, l.as_str()))
                .collect(),
        }
    }

    /// Placeholder shown when a search matched nothing in this card
    pub fn no_results(&self) -> Option<String> {
        self.search
            .as_ref()
            .filter(|s| s.matches.is_empty())
            .map(|s| format!("No results found for \"{}\"", s.term))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardLayout {
    /// Centered single column
    Single { max_width: u16 },
    /// Two columns; an odd trailing card spans the full width
    Grid { columns: u16, span_last: bool },
}

pub fn card_layout(open: usize) -> Option<CardLayout> {
    match open {
        0 => None,
        1 => Some(CardLayout::Single {
            max_width: CARD_MAX_WIDTH,
        }),
        n => Some(CardLayout::Grid {
            columns: 2,
            span_last: n % 2 == 1,
        }),
    }
}

/// `log-card-<key>` with path-hostile characters replaced by `-`
pub fn card_id(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' => '-',
            other => other,
        })
        .collect();
    format!("log-card-{}", sanitized)
}

pub fn file_key(folder: &str, file: &str) -> String {
    format!("{}/{}", folder, file)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// The card already existed and was highlighted instead
    AlreadyOpen,
}

/// One line match produced by the search worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub line_index: usize,
    pub text: String,
}

/// Search worker output for one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardMatches {
    pub card_id: String,
    pub matches: Vec<LineMatch>,
}

#[derive(Debug, Clone)]
pub struct NavigatorState {
    pub view: View,
    pub folders: Listing,
    pub selected_folder: Option<String>,
    pub files: Listing,
    pub cards: Vec<FileCard>,
    pub generation: u64,
    /// Names from the most recent upload
    pub uploaded: Vec<String>,
}

impl NavigatorState {
    pub fn card(&self, key: &str) -> Option<&FileCard> {
        self.cards.iter().find(|c| c.key == key)
    }

    pub fn is_open(&self, key: &str) -> bool {
        self.card(key).is_some()
    }

    pub fn layout(&self) -> Option<CardLayout> {
        card_layout(self.cards.len())
    }

    /// Search and analysis controls only show in the detail view
    pub fn controls_visible(&self) -> bool {
        matches!(self.view, View::Detail { .. })
    }
}

struct Inner {
    bridge: BridgeAdapter,
    notifier: Notifier,
    state: Mutex<NavigatorState>,
    line_highlight: Duration,
    card_highlight: Duration,
}

#[derive(Clone)]
pub struct LogNavigator {
    inner: Arc<Inner>,
}

impl LogNavigator {
    pub fn new(bridge: BridgeAdapter, notifier: Notifier, config: &NotificationConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                bridge,
                notifier,
                state: Mutex::new(NavigatorState {
                    view: View::Folders,
                    folders: Listing::Idle,
                    selected_folder: None,
                    files: Listing::Idle,
                    cards: Vec::new(),
                    generation: 0,
                    uploaded: Vec::new(),
                }),
                line_highlight: config.line_highlight(),
                card_highlight: config.card_highlight(),
            }),
        }
    }

    pub fn state(&self) -> NavigatorState {
        self.inner.state.lock().clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    /// Folder of the first open card
    pub fn current_folder(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .cards
            .first()
            .map(|c| c.folder.clone())
    }

    /// File names of the open cards, in display order
    pub fn open_files(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .cards
            .iter()
            .map(|c| c.file.clone())
            .collect()
    }

    // ====================================================================
    // Navigation
    // ====================================================================

    /// Load the folder list; the first (newest) folder is opened automatically
    pub async fn load_folders(&self) {
        {
            let mut state = self.inner.state.lock();
            state.view = View::Folders;
            state.folders = Listing::Loading;
            state.cards.clear();
            state.generation += 1;
        }

        let folders = match self.inner.bridge.list_folders().await {
            Ok(folders) if folders.is_empty() => {
                Listing::Empty("No log folders found".to_string())
            }
            Ok(folders) => Listing::Loaded(folders),
            Err(e) if e.is_parse() => Listing::Failed(e.to_string()),
            Err(e) => Listing::Failed(format!("Error loading folders: {}", e)),
        };

        let first = folders.items().first().cloned();
        self.inner.state.lock().folders = folders;

        if let Some(first) = first {
            self.load_files(&first).await;
        }
    }

    pub async fn load_files(&self, folder: &str) {
        {
            let mut state = self.inner.state.lock();
            state.view = View::Files {
                folder: folder.to_string(),
            };
            state.selected_folder = Some(folder.to_string());
            state.files = Listing::Loading;
            state.cards.clear();
            state.generation += 1;
        }

        let listing = match self.inner.bridge.list_files(folder).await {
            Ok(listing) if listing.success && listing.files.is_empty() => {
                Listing::Empty("No files found in this folder".to_string())
            }
            Ok(listing) if listing.success => Listing::Loaded(listing.files),
            Ok(listing) => Listing::Failed(format!(
                "Error: {}",
                listing.message.unwrap_or_else(|| "Unknown error".to_string())
            )),
            Err(e) if e.is_parse() => Listing::Failed(e.to_string()),
            Err(e) => Listing::Failed(format!("Error loading files: {}", e)),
        };

        let mut state = self.inner.state.lock();
        // A later navigation wins
        if state.selected_folder.as_deref() == Some(folder) {
            state.files = listing;
        }
    }

    /// Open one file. Re-opening an open file highlights its card instead.
    pub async fn open_file(&self, folder: &str, file: &str) -> OpenOutcome {
        let key = file_key(folder, file);
        let generation = {
            let mut state = self.inner.state.lock();
            if let Some(card) = state.cards.iter_mut().find(|c| c.key == key) {
                card.highlight_until = Some(Instant::now() + self.inner.card_highlight);
                return OpenOutcome::AlreadyOpen;
            }

            state.view = View::Detail {
                folder: folder.to_string(),
            };
            state.cards.push(FileCard {
                id: card_id(&key),
                key: key.clone(),
                folder: folder.to_string(),
                file: file.to_string(),
                body: CardBody::Loading,
                highlight_until: None,
                highlighted_line: None,
                search: None,
            });
            state.generation
        };

        let body = match self.inner.bridge.read_log_file(folder, file).await {
            Ok(content) if content.success => CardBody::Loaded {
                lines: content.content.split('\n').map(str::to_string).collect(),
                created_at: content
                    .created_at
                    .unwrap_or_else(|| "Unknown date".to_string()),
            },
            Ok(content) => CardBody::Failed {
                message: format!(
                    "Error: {}",
                    content.message.unwrap_or_else(|| "Unknown error".to_string())
                ),
            },
            Err(e) if e.is_parse() => CardBody::Failed {
                message: format!("Error parsing file content: {}", e),
            },
            Err(e) => CardBody::Failed {
                message: format!("Error reading file: {}", e),
            },
        };

        let mut state = self.inner.state.lock();
        if state.generation == generation {
            if let Some(card) = state.cards.iter_mut().find(|c| c.key == key) {
                card.body = body;
            }
        }
        OpenOutcome::Opened
    }

    /// Open every file of `folder`'s current listing. Returns how many cards
    /// were opened.
    pub async fn open_all(&self, folder: &str) -> usize {
        let files = {
            let state = self.inner.state.lock();
            let files = state.files.items().to_vec();
            if files
                .iter()
                .all(|f| state.is_open(&file_key(folder, f)))
            {
                drop(state);
                self.inner
                    .notifier
                    .notify("All files are already open", ToastKind::Info);
                return 0;
            }
            files
        };

        self.inner
            .notifier
            .notify(format!("Opening {} files...", files.len()), ToastKind::Info);
        {
            let mut state = self.inner.state.lock();
            state.cards.clear();
            state.view = View::Detail {
                folder: folder.to_string(),
            };
        }

        let opened = join_all(files.iter().map(|f| self.open_file(folder, f))).await;
        opened
            .into_iter()
            .filter(|o| *o == OpenOutcome::Opened)
            .count()
    }

    /// Close a card; closing the last one goes back to the file list
    pub async fn close_file(&self, key: &str) {
        let folder = {
            let mut state = self.inner.state.lock();
            let Some(index) = state.cards.iter().position(|c| c.key == key) else {
                return;
            };
            let card = state.cards.remove(index);
            if !state.cards.is_empty() {
                return;
            }
            card.folder
        };
        self.back_to_files(&folder).await;
    }

    pub async fn back_to_files(&self, folder: &str) {
        self.inner.state.lock().cards.clear();
        self.load_files(folder).await;
    }

    pub fn back_to_folders(&self) {
        let mut state = self.inner.state.lock();
        state.view = View::Folders;
        state.cards.clear();
        state.generation += 1;
    }

    // ====================================================================
    // Upload
    // ====================================================================

    /// Send every `(name, bytes)` pair through `save_log_file`
    pub async fn upload(&self, files: Vec<(String, Vec<u8>)>) -> usize {
        let total = files.len();
        if total == 0 {
            return 0;
        }
        self.inner
            .notifier
            .notify(format!("Processing {} files...", total), ToastKind::Info);
        self.inner.state.lock().uploaded = files.iter().map(|(n, _)| n.clone()).collect();

        let bridge = &self.inner.bridge;
        let results = join_all(
            files
                .iter()
                .map(|(name, bytes)| async move { (name, bridge.save_log_file(name, bytes).await) }),
        )
        .await;

        let mut saved = 0;
        for (name, result) in results {
            match result {
                Ok(response) if response.success => saved += 1,
                Ok(response) => self.inner.notifier.notify(
                    format!("Error uploading {}: {}", name, response.message),
                    ToastKind::Error,
                ),
                Err(e) => self.inner.notifier.notify(
                    format!("Error uploading {}: {}", name, e),
                    ToastKind::Error,
                ),
            }
        }

        if saved == total {
            self.inner.notifier.notify(
                format!("Successfully uploaded {} files!", total),
                ToastKind::Success,
            );
        }
        log::info!("uploaded {}/{} log files", saved, total);
        saved
    }

    // ====================================================================
    // Highlighting and search
    // ====================================================================

    /// Highlight `line_number` (one-based) in the card showing `file_name`
    pub fn highlight_line(&self, file_name: &str, line_number: usize, now: Instant) -> bool {
        let mut state = self.inner.state.lock();
        let index = state
            .cards
            .iter()
            .position(|c| c.file == file_name)
            .or_else(|| state.cards.iter().position(|c| c.file.contains(file_name)));
        let Some(card) = index.and_then(|i| state.cards.get_mut(i)) else {
            return false;
        };
        if line_number == 0 || line_number > card.lines().len() {
            return false;
        }
        card.highlighted_line = Some((line_number, now + self.inner.line_highlight));
        card.highlight_until = Some(now + self.inner.card_highlight);
        true
    }

    /// Snapshot of `(card id, lines)` for every loaded card
    pub fn searchable_cards(&self) -> Vec<(String, Vec<String>)> {
        self.inner
            .state
            .lock()
            .cards
            .iter()
            .filter(|c| matches!(c.body, CardBody::Loaded { .. }))
            .map(|c| (c.id.clone(), c.lines().to_vec()))
            .collect()
    }

    /// Apply worker results; loaded cards absent from `results` get zero matches
    pub fn apply_search(&self, term: &str, results: &[CardMatches]) -> usize {
        let mut state = self.inner.state.lock();
        let mut total = 0;
        for card in state
            .cards
            .iter_mut()
            .filter(|c| matches!(c.body, CardBody::Loaded { .. }))
        {
            let matches: Vec<usize> = results
                .iter()
                .find(|r| r.card_id == card.id)
                .map(|r| r.matches.iter().map(|m| m.line_index).collect())
                .unwrap_or_default();
            total += matches.len();
            card.search = Some(CardSearch {
                term: term.to_string(),
                matches,
            });
        }
        total
    }

    /// Restore every card to its unfiltered state
    pub fn reset_search(&self) {
        for card in self.inner.state.lock().cards.iter_mut() {
            card.search = None;
        }
    }

    pub fn tick(&self, now: Instant) {
        for card in self.inner.state.lock().cards.iter_mut() {
            if card.highlight_until.map(|t| now >= t).unwrap_or(false) {
                card.highlight_until = None;
            }
            if card
                .highlighted_line
                .map(|(_, t)| now >= t)
                .unwrap_or(false)
            {
                card.highlighted_line = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryBackend;

    fn navigator(backend: &Arc<MemoryBackend>) -> (LogNavigator, Notifier) {
        let config = NotificationConfig::default();
        let notifier = Notifier::new(&config);
        let nav = LogNavigator::new(
            BridgeAdapter::new(backend.clone()),
            notifier.clone(),
            &config,
        );
        (nav, notifier)
    }

    fn seeded() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file("2024-01-01", "a.log", "alpha\nbeta");
        backend.add_file("2024-01-01", "b.log", "gamma");
        backend.add_file("2024-01-01", "c.log", "delta\nepsilon\nzeta");
        backend
    }

    #[test]
    fn test_card_id_sanitizes() {
        assert_eq!(card_id("2024-01-01/a.log"), "log-card-2024-01-01-a.log");
        assert_eq!(card_id(r#"d/x?y%z*:|"<>\"#), "log-card-d-x-y-z-------");
    }

    #[test]
    fn test_card_layout() {
        assert_eq!(card_layout(0), None);
        assert_eq!(card_layout(1), Some(CardLayout::Single { max_width: 800 }));
        assert_eq!(
            card_layout(2),
            Some(CardLayout::Grid {
                columns: 2,
                span_last: false
            })
        );
        assert_eq!(
            card_layout(3),
            Some(CardLayout::Grid {
                columns: 2,
                span_last: true
            })
        );
    }

    #[tokio::test]
    async fn test_first_folder_auto_opened() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_payload("list_folders", r#"["2024-01-01","2024-01-02"]"#);
        backend.add_file("2024-01-01", "a.log", "x");
        let (nav, _) = navigator(&backend);

        nav.load_folders().await;
        let state = nav.state();
        assert_eq!(
            state.view,
            View::Files {
                folder: "2024-01-01".to_string()
            }
        );
        assert_eq!(state.files.items(), &["a.log".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_and_failed_listings() {
        let backend = Arc::new(MemoryBackend::new());
        let (nav, _) = navigator(&backend);
        nav.load_folders().await;
        assert_eq!(
            nav.state().folders,
            Listing::Empty("No log folders found".to_string())
        );

        nav.load_files("missing").await;
        match nav.state().files {
            Listing::Failed(message) => assert!(message.starts_with("Error: Folder not found")),
            other => panic!("unexpected listing {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_same_file_twice_yields_one_card() {
        let backend = seeded();
        let (nav, _) = navigator(&backend);
        nav.load_files("2024-01-01").await;

        assert_eq!(nav.open_file("2024-01-01", "a.log").await, OpenOutcome::Opened);
        assert_eq!(
            nav.open_file("2024-01-01", "a.log").await,
            OpenOutcome::AlreadyOpen
        );

        let state = nav.state();
        assert_eq!(state.cards.len(), 1);
        assert!(state.cards[0].highlight_until.is_some());
        assert_eq!(state.cards[0].lines(), &["alpha".to_string(), "beta".to_string()]);
        assert_eq!(state.cards[0].footer(), "File created: 2024-01-01 00:00:00");
        assert_eq!(backend.call_count("read_log_file"), 1);
    }

    #[tokio::test]
    async fn test_failed_read_shows_error_without_lines() {
        let backend = seeded();
        backend.set_payload("read_log_file", r#"{"success":false,"message":"not found"}"#);
        let (nav, _) = navigator(&backend);

        nav.open_file("2024-01-01", "a.log").await;
        let card = nav.state().cards[0].clone();
        assert_eq!(
            card.body,
            CardBody::Failed {
                message: "Error: not found".to_string()
            }
        );
        assert!(card.visible_lines().is_empty());
        assert_eq!(card.footer(), "Failed to load file");
    }

    #[tokio::test]
    async fn test_missing_created_at_shows_unknown_date() {
        let backend = seeded();
        backend.clear_created_at("2024-01-01", "b.log");
        let (nav, _) = navigator(&backend);
        nav.open_file("2024-01-01", "b.log").await;
        assert_eq!(nav.state().cards[0].footer(), "File created: Unknown date");
    }

    #[tokio::test]
    async fn test_closing_last_card_returns_to_file_list() {
        let backend = seeded();
        let (nav, _) = navigator(&backend);
        nav.load_files("2024-01-01").await;
        nav.open_file("2024-01-01", "a.log").await;
        nav.open_file("2024-01-01", "b.log").await;

        nav.close_file("2024-01-01/a.log").await;
        assert!(matches!(nav.state().view, View::Detail { .. }));
        assert_eq!(nav.current_folder().as_deref(), Some("2024-01-01"));

        nav.close_file("2024-01-01/b.log").await;
        let state = nav.state();
        assert_eq!(
            state.view,
            View::Files {
                folder: "2024-01-01".to_string()
            }
        );
        assert!(state.cards.is_empty());
        assert_eq!(nav.current_folder(), None);
    }

    #[tokio::test]
    async fn test_open_all_then_again() {
        let backend = seeded();
        let (nav, notifier) = navigator(&backend);
        nav.load_files("2024-01-01").await;

        assert_eq!(nav.open_all("2024-01-01").await, 3);
        assert_eq!(nav.state().layout(), Some(CardLayout::Grid { columns: 2, span_last: true }));
        assert!(notifier
            .history()
            .iter()
            .any(|t| t.message == "Opening 3 files..."));

        assert_eq!(nav.open_all("2024-01-01").await, 0);
        assert_eq!(notifier.toast().unwrap().message, "All files are already open");
    }

    #[tokio::test]
    async fn test_highlight_line_bounds() {
        let backend = seeded();
        let (nav, _) = navigator(&backend);
        nav.open_file("2024-01-01", "c.log").await;

        let now = Instant::now();
        assert!(nav.highlight_line("c.log", 3, now));
        assert!(!nav.highlight_line("c.log", 4, now));
        assert!(!nav.highlight_line("zzz.log", 1, now));

        let card = nav.state().cards[0].clone();
        assert_eq!(card.highlighted_line.map(|(l, _)| l), Some(3));

        nav.tick(now + Duration::from_secs(1));
        let card = nav.state().cards[0].clone();
        assert!(card.highlight_until.is_none());
        assert!(card.highlighted_line.is_some());

        nav.tick(now + Duration::from_secs(3));
        assert!(nav.state().cards[0].highlighted_line.is_none());
    }

    #[tokio::test]
    async fn test_upload_reports_per_file_failures() {
        let backend = Arc::new(MemoryBackend::new());
        let (nav, notifier) = navigator(&backend);

        let saved = nav
            .upload(vec![
                ("one.log".to_string(), b"1".to_vec()),
                ("two.log".to_string(), b"2".to_vec()),
            ])
            .await;
        assert_eq!(saved, 2);
        assert_eq!(
            notifier.toast().unwrap().message,
            "Successfully uploaded 2 files!"
        );

        backend.fail_method("save_log_file", "disk full");
        let saved = nav.upload(vec![("three.log".to_string(), b"3".to_vec())]).await;
        assert_eq!(saved, 0);
        assert!(notifier
            .toast()
            .unwrap()
            .message
            .starts_with("Error uploading three.log:"));
    }

    #[tokio::test]
    async fn test_search_application_and_reset() {
        let backend = seeded();
        let (nav, _) = navigator(&backend);
        nav.open_file("2024-01-01", "a.log").await;
        nav.open_file("2024-01-01", "b.log").await;

        let a_id = card_id("2024-01-01/a.log");
        let total = nav.apply_search(
            "beta",
            &[CardMatches {
                card_id: a_id,
                matches: vec![LineMatch {
                    line_index: 1,
                    text: "beta".to_string(),
                }],
            }],
        );
        assert_eq!(total, 1);

        let state = nav.state();
        assert_eq!(state.cards[0].header(), "a.log (1 matches)");
        assert_eq!(state.cards[0].visible_lines(), vec![(2, "beta")]);
        assert_eq!(
            state.cards[1].no_results().as_deref(),
            Some("No results found for \"beta\"")
        );

        nav.reset_search();
        let state = nav.state();
        assert_eq!(state.cards[0].header(), "a.log");
        assert_eq!(state.cards[0].visible_lines().len(), 2);
    }
}
