use crate::record::QueryMode;
use crate::render::QueryView;
use parking_lot::RwLock;
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const MAX_SESSION_COUNT: usize = 4096;
const SESSION_ID_LEN: usize = 24;

/// Words the user chose to keep, in the order they were saved.
///
/// Append-only; saving the same word twice keeps both entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SavedWords(Vec<String>);

impl SavedWords {
    pub fn push(&mut self, word: impl Into<String>) {
        self.0.push(word.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for SavedWords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        for (position, word) in self.iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            f.write_str(word)?;
        }
        Ok(())
    }
}

/// State of one interactive session: saved words plus whatever is on screen.
#[derive(Debug, Clone, Default)]
pub struct Session {
    saved: SavedWords,
    view: QueryView,
    latest: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next request number and shows the loading state.
    pub fn begin(&mut self, mode: QueryMode, term: &str) -> u64 {
        self.latest += 1;
        self.view = QueryView::loading(mode, term);
        self.latest
    }

    /// Replaces the view if `seq` is the most recent request.
    ///
    /// Returns `false` and leaves the view untouched for stale responses.
    pub fn apply(&mut self, seq: u64, view: QueryView) -> bool {
        if seq != self.latest {
            debug!(seq, latest = self.latest, term = %view.term, "discarding stale response");
            return false;
        }
        self.view = view;
        true
    }

    /// Saves the word shown under display index `index`.
    pub fn save(&mut self, index: usize) -> Option<&str> {
        let word = self.view.output.item(index)?.to_string();
        self.saved.push(word);
        self.saved.0.last().map(String::as_str)
    }

    pub fn save_word(&mut self, word: impl Into<String>) {
        self.saved.push(word);
    }

    pub fn saved(&self) -> &SavedWords {
        &self.saved
    }

    pub fn view(&self) -> &QueryView {
        &self.view
    }

    pub fn latest(&self) -> u64 {
        self.latest
    }
}

/// Copy of a session handed to renderers so no lock is held while rendering.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub saved: SavedWords,
    pub view: QueryView,
}

/// Sessions keyed by id, shared across request handlers.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<RwLock<RegistryData>>,
}

struct RegistryData {
    sessions: HashMap<String, SessionEntry>,
    capacity: usize,
    tick: u64,
}

struct SessionEntry {
    session: Session,
    last_seen: u64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSION_COUNT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(RwLock::new(RegistryData {
                sessions: HashMap::new(),
                capacity: capacity.max(1),
                tick: 0,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.shared.read().sessions.contains_key(session_id)
    }

    pub fn begin(&self, session_id: &str, mode: QueryMode, term: &str) -> u64 {
        self.with_session(session_id, |session| session.begin(mode, term))
    }

    pub fn apply(&self, session_id: &str, seq: u64, view: QueryView) -> bool {
        self.with_session(session_id, |session| session.apply(seq, view))
    }

    /// Appends `word` and returns the new saved-word count.
    pub fn save_word(&self, session_id: &str, word: &str) -> usize {
        self.with_session(session_id, |session| {
            session.save_word(word);
            session.saved().len()
        })
    }

    /// Current state of the session, creating it when unknown.
    pub fn snapshot(&self, session_id: &str) -> SessionSnapshot {
        self.with_session(session_id, |session| SessionSnapshot {
            saved: session.saved().clone(),
            view: session.view().clone(),
        })
    }

    fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> T) -> T {
        let mut guard = self.shared.write();
        guard.tick = guard.tick.saturating_add(1);
        let now = guard.tick;
        if guard.sessions.len() >= guard.capacity && !guard.sessions.contains_key(session_id) {
            if let Some(oldest) = oldest_session_key(&guard.sessions) {
                debug!(session = %oldest, "evicting least recently seen session");
                guard.sessions.remove(&oldest);
            }
        }
        let entry = guard
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                session: Session::new(),
                last_seen: now,
            });
        entry.last_seen = now;
        f(&mut entry.session)
    }
}

fn oldest_session_key(sessions: &HashMap<String, SessionEntry>) -> Option<String> {
    sessions
        .iter()
        .min_by_key(|(_, entry)| entry.last_seen)
        .map(|(key, _)| key.clone())
}

pub fn generate_session_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WordRecord;
    use crate::render::{Output, render};

    fn rhyme_view(term: &str, words: &[(&str, u32)]) -> QueryView {
        let records: Vec<WordRecord> = words
            .iter()
            .map(|(word, syllables)| WordRecord::new(*word).with_syllables(*syllables))
            .collect();
        QueryView::loading(QueryMode::Rhyme, term).with_output(render(QueryMode::Rhyme, &records))
    }

    #[test]
    fn saved_words_display() {
        let mut saved = SavedWords::default();
        assert_eq!(saved.to_string(), "(none)");
        saved.push("cat");
        saved.push("hat");
        saved.push("cat");
        assert_eq!(saved.to_string(), "cat, hat, cat");
        assert_eq!(saved.len(), 3);
    }

    #[test]
    fn begin_shows_loading_with_description() {
        let mut session = Session::new();
        let seq = session.begin(QueryMode::Synonym, "happy");
        assert_eq!(seq, 1);
        assert!(session.view().output.is_loading());
        assert_eq!(
            session.view().description,
            "Words with a similar meaning to happy"
        );
    }

    #[test]
    fn stale_responses_are_discarded() {
        let mut session = Session::new();
        let first = session.begin(QueryMode::Rhyme, "cat");
        let second = session.begin(QueryMode::Rhyme, "dog");
        assert!(session.apply(second, rhyme_view("dog", &[("log", 1)])));
        assert!(!session.apply(first, rhyme_view("cat", &[("hat", 1)])));
        assert_eq!(session.view().term, "dog");
        assert_eq!(session.view().output.item(1), Some("log"));
    }

    #[test]
    fn stale_response_does_not_clear_pending_loading_state() {
        let mut session = Session::new();
        let first = session.begin(QueryMode::Rhyme, "cat");
        session.begin(QueryMode::Rhyme, "dog");
        assert!(!session.apply(first, rhyme_view("cat", &[("hat", 1)])));
        assert!(session.view().output.is_loading());
        assert_eq!(session.view().term, "dog");
    }

    #[test]
    fn save_by_index_appends_duplicates() {
        let mut session = Session::new();
        let seq = session.begin(QueryMode::Rhyme, "cat");
        session.apply(seq, rhyme_view("cat", &[("hat", 1), ("acrobat", 3)]));
        assert_eq!(session.save(2), Some("acrobat"));
        assert_eq!(session.save(2), Some("acrobat"));
        assert_eq!(session.save(9), None);
        assert_eq!(session.saved().as_slice(), ["acrobat", "acrobat"]);
    }

    #[test]
    fn save_is_unavailable_without_results() {
        let mut session = Session::new();
        let seq = session.begin(QueryMode::Rhyme, "zzz");
        session.apply(
            seq,
            QueryView::loading(QueryMode::Rhyme, "zzz").with_output(Output::NoResult),
        );
        assert_eq!(session.save(1), None);
        assert!(session.saved().is_empty());
    }

    #[test]
    fn registry_keeps_sessions_apart() {
        let registry = SessionRegistry::new();
        registry.save_word("a", "cat");
        registry.save_word("b", "dog");
        assert_eq!(registry.save_word("a", "hat"), 2);
        assert_eq!(registry.snapshot("a").saved.to_string(), "cat, hat");
        assert_eq!(registry.snapshot("b").saved.to_string(), "dog");
    }

    #[test]
    fn registry_applies_only_latest_sequence() {
        let registry = SessionRegistry::new();
        let first = registry.begin("s", QueryMode::Rhyme, "cat");
        let second = registry.begin("s", QueryMode::Rhyme, "dog");
        assert!(!registry.apply("s", first, rhyme_view("cat", &[("hat", 1)])));
        assert!(registry.apply("s", second, rhyme_view("dog", &[("fog", 1)])));
        assert_eq!(registry.snapshot("s").view.output.item(1), Some("fog"));
    }

    #[test]
    fn registry_evicts_least_recently_seen() {
        let registry = SessionRegistry::with_capacity(2);
        registry.save_word("old", "a");
        registry.save_word("mid", "b");
        registry.save_word("old", "c");
        registry.save_word("new", "d");
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("old"));
        assert!(registry.contains("new"));
        assert!(!registry.contains("mid"));
    }

    #[test]
    fn session_ids_are_alphanumeric() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_session_id());
    }
}
