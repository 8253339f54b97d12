//! Search across open file cards
//!
//! Keystrokes are debounced; the match itself runs on a blocking worker, one
//! per request. Each request carries a monotonic id and a result is applied
//! only if no newer input has arrived since it was issued.

use crate::config::SearchConfig;
use crate::coordinator::Debouncer;
use crate::navigator::{CardMatches, LineMatch, LogNavigator};
use crate::progress::{Notifier, ToastKind};
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Case-insensitive substring match; `term` must already be lowercase
pub fn search_lines(term: &str, lines: &[String]) -> Vec<LineMatch> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.to_lowercase().contains(term))
        .map(|(line_index, line)| LineMatch {
            line_index,
            text: line.clone(),
        })
        .collect()
}

pub fn search_cards(term: &str, cards: &[(String, Vec<String>)]) -> Vec<CardMatches> {
    cards
        .iter()
        .map(|(card_id, lines)| CardMatches {
            card_id: card_id.clone(),
            matches: search_lines(term, lines),
        })
        .collect()
}

/// Byte ranges of `text` matching `term` case-insensitively, for highlighting
pub fn highlight_ranges(text: &str, term: &str) -> Vec<Range<usize>> {
    if term.is_empty() {
        return Vec::new();
    }
    let lower = text.to_lowercase();
    // Lowercasing can change byte lengths outside ASCII; only map back when
    // offsets line up
    if lower.len() != text.len() {
        return Vec::new();
    }
    lower
        .match_indices(term)
        .map(|(start, m)| start..start + m.len())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    /// Raw input as typed
    pub input: String,
    /// Term currently applied to the cards
    pub applied: Option<String>,
    /// A search is pending or running
    pub searching: bool,
    pub total_matches: Option<usize>,
}

struct Inner {
    navigator: LogNavigator,
    notifier: Notifier,
    debouncer: Debouncer,
    min_term_len: usize,
    latest: AtomicU64,
    workers_spawned: AtomicUsize,
    state: Mutex<SearchState>,
}

#[derive(Clone)]
pub struct SearchOverlay {
    inner: Arc<Inner>,
}

impl SearchOverlay {
    pub fn new(navigator: LogNavigator, notifier: Notifier, config: &SearchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                navigator,
                notifier,
                debouncer: Debouncer::new(config.debounce()),
                min_term_len: config.min_term_len,
                latest: AtomicU64::new(0),
                workers_spawned: AtomicUsize::new(0),
                state: Mutex::new(SearchState::default()),
            }),
        }
    }

    pub fn state(&self) -> SearchState {
        self.inner.state.lock().clone()
    }

    /// Workers started so far
    pub fn workers_spawned(&self) -> usize {
        self.inner.workers_spawned.load(Ordering::SeqCst)
    }

    /// Handle a change of the search input
    pub fn on_input(&self, raw: &str) {
        let term = raw.trim().to_lowercase();
        let request = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.debouncer.cancel();

        {
            let mut state = self.inner.state.lock();
            state.input = raw.to_string();
            state.searching = false;
        }

        if term.chars().count() < self.inner.min_term_len {
            self.inner.navigator.reset_search();
            let mut state = self.inner.state.lock();
            state.applied = None;
            state.total_matches = None;
            return;
        }

        self.inner.state.lock().searching = true;
        let this = self.clone();
        self.inner.debouncer.schedule(async move {
            this.run_search(request, term).await;
        });
    }

    pub fn clear(&self) {
        self.on_input("");
    }

    /// Run request `request`; returns whether its result was applied
    async fn run_search(&self, request: u64, term: String) -> bool {
        if request != self.inner.latest.load(Ordering::SeqCst) {
            return false;
        }

        let cards = self.inner.navigator.searchable_cards();
        self.inner.workers_spawned.fetch_add(1, Ordering::SeqCst);
        let worker_term = term.clone();
        let results =
            match tokio::task::spawn_blocking(move || search_cards(&worker_term, &cards)).await {
                Ok(results) => results,
                Err(e) => {
                    log::error!("search worker failed: {}", e);
                    self.inner.state.lock().searching = false;
                    return false;
                }
            };

        if request != self.inner.latest.load(Ordering::SeqCst) {
            log::debug!("discarding stale search result for '{}'", term);
            return false;
        }

        let total = self.inner.navigator.apply_search(&term, &results);
        {
            let mut state = self.inner.state.lock();
            state.applied = Some(term.clone());
            state.searching = false;
            state.total_matches = Some(total);
        }

        if total > 0 {
            self.inner.notifier.notify(
                format!("Found {} matches for \"{}\"", total, term),
                ToastKind::Success,
            );
        } else {
            self.inner
                .notifier
                .notify(format!("No matches found for \"{}\"", term), ToastKind::Info);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeAdapter, MemoryBackend};
    use crate::config::Config;
    use std::time::Duration;

    async fn overlay() -> (SearchOverlay, LogNavigator, Notifier) {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file("d", "a.log", "Connection OPEN\nidle\nconnection closed");
        backend.add_file("d", "b.log", "nothing here");

        let config = Config::default();
        let notifier = Notifier::new(&config.notifications);
        let navigator = LogNavigator::new(
            BridgeAdapter::new(backend),
            notifier.clone(),
            &config.notifications,
        );
        navigator.open_file("d", "a.log").await;
        navigator.open_file("d", "b.log").await;

        let search = SearchOverlay::new(navigator.clone(), notifier.clone(), &config.search);
        (search, navigator, notifier)
    }

    #[test]
    fn test_search_lines_case_insensitive() {
        let lines = vec!["Alpha".to_string(), "beta".to_string(), "ALPHABET".to_string()];
        let matches = search_lines("alpha", &lines);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line_index, 0);
        assert_eq!(matches[1].line_index, 2);
        assert_eq!(matches[1].text, "ALPHABET");
    }

    #[test]
    fn test_highlight_ranges() {
        assert_eq!(highlight_ranges("Foo foo FOO", "foo"), vec![0..3, 4..7, 8..11]);
        assert!(highlight_ranges("abc", "").is_empty());
    }

    #[tokio::test]
    async fn test_search_applies_after_debounce() {
        let (search, navigator, notifier) = overlay().await;

        search.on_input("  CONNECTION ");
        assert!(search.state().searching);
        assert_eq!(search.workers_spawned(), 0);

        tokio::time::sleep(Duration::from_millis(350)).await;
        // let the blocking worker finish
        for _ in 0..200 {
            if !search.state().searching {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let state = search.state();
        assert_eq!(state.applied.as_deref(), Some("connection"));
        assert_eq!(state.total_matches, Some(2));
        assert_eq!(search.workers_spawned(), 1);

        let cards = navigator.state().cards;
        assert_eq!(cards[0].header(), "a.log (2 matches)");
        assert_eq!(
            cards[1].no_results().as_deref(),
            Some("No results found for \"connection\"")
        );
        assert_eq!(
            notifier.toast().unwrap().message,
            "Found 2 matches for \"connection\""
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_term_resets_without_worker() {
        let (search, navigator, _) = overlay().await;
        navigator.apply_search("idle", &[]);

        search.on_input("c");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(search.workers_spawned(), 0);
        assert!(!search.state().searching);
        assert!(navigator.state().cards.iter().all(|c| c.search.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shortening_mid_debounce_cancels() {
        let (search, navigator, _) = overlay().await;
        search.on_input("idle");
        tokio::time::sleep(Duration::from_millis(100)).await;
        search.on_input("i");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(search.workers_spawned(), 0);
        assert!(navigator.state().cards.iter().all(|c| c.search.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystroke_burst_spawns_one_worker() {
        let (search, _, _) = overlay().await;
        for input in ["co", "con", "conn", "conne"] {
            search.on_input(input);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(search.workers_spawned(), 1);
    }

    #[tokio::test]
    async fn test_stale_request_is_discarded() {
        let (search, navigator, _) = overlay().await;
        search.on_input("idle");
        search.on_input("open");

        // request 1 was superseded by request 2
        assert!(!search.run_search(1, "idle".to_string()).await);
        assert!(navigator.state().cards.iter().all(|c| c.search.is_none()));

        assert!(search.run_search(2, "open".to_string()).await);
        assert_eq!(search.state().total_matches, Some(1));
    }
}
