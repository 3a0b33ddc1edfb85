//! Client-side state and the controller that owns it.
//!
//! [`ClientState`] is the only state container. It is loaded from the local
//! store when the controller starts and written back after every change to a
//! persisted field (theme, mode, saved words). Everything else lives in memory
//! until the next analysis replaces it.

use crate::proxy::{AnalyzeRequest, QuizRequest, SummaryRequest};
use crate::storage::{KeyValueStore, KeyValueStoreExt, MODE_KEY, SAVED_WORDS_KEY, THEME_KEY};
use crate::transport::ApiTransport;
use crate::vocab::{
    MAX_PASSAGE_CHARS, Mode, QuizQuestion, Stats, Theme, VocabularyItem, passage_length,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

pub const SPEECH_RATE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Vocabulary,
    Summary,
    Quiz,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Vocabulary, Tab::Summary, Tab::Quiz];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Vocabulary => "vocabulary",
            Tab::Summary => "summary",
            Tab::Quiz => "quiz",
        }
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Tab::ALL
            .into_iter()
            .find(|tab| tab.as_str() == value)
            .ok_or_else(|| format!("unknown tab {value:?}"))
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

impl ToastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToastKind::Success => "success",
            ToastKind::Error => "error",
            ToastKind::Info => "info",
        }
    }
}

/// A transient user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

/// Saved words, unique by lowercase word, in the order they were saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<VocabularyItem>", into = "Vec<VocabularyItem>")]
pub struct SavedWords {
    items: Vec<VocabularyItem>,
}

impl From<Vec<VocabularyItem>> for SavedWords {
    fn from(items: Vec<VocabularyItem>) -> Self {
        let mut seen = HashSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.key()))
            .collect();
        Self { items }
    }
}

impl From<SavedWords> for Vec<VocabularyItem> {
    fn from(saved: SavedWords) -> Self {
        saved.items
    }
}

impl SavedWords {
    pub fn contains(&self, word: &str) -> bool {
        let key = word.to_lowercase();
        self.items.iter().any(|item| item.key() == key)
    }

    pub fn get(&self, word: &str) -> Option<&VocabularyItem> {
        let key = word.to_lowercase();
        self.items.iter().find(|item| item.key() == key)
    }

    /// Adds the word, or removes it if already saved. Returns whether it is saved now.
    pub fn toggle(&mut self, item: &VocabularyItem) -> bool {
        let key = item.key();
        if let Some(position) = self.items.iter().position(|saved| saved.key() == key) {
            self.items.remove(position);
            false
        } else {
            self.items.push(item.clone());
            true
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &VocabularyItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// In-flight request markers. Clones share the same flags, so a handle taken
/// before a request starts observes it while the controller is borrowed.
#[derive(Debug, Clone, Default)]
pub struct BusyFlags {
    analyzing: Arc<AtomicBool>,
    summarizing: Arc<AtomicBool>,
    quizzing: Arc<AtomicBool>,
}

impl BusyFlags {
    pub fn analyzing(&self) -> bool {
        self.analyzing.load(Ordering::Acquire)
    }

    pub fn summarizing(&self) -> bool {
        self.summarizing.load(Ordering::Acquire)
    }

    pub fn quizzing(&self) -> bool {
        self.quizzing.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizState {
    pub questions: Vec<QuizQuestion>,
    pub chosen: Vec<Option<usize>>,
}

impl QuizState {
    pub fn new(questions: Vec<QuizQuestion>) -> Self {
        let chosen = vec![None; questions.len()];
        Self { questions, chosen }
    }

    /// Records the first choice for a question; later choices are ignored.
    pub fn choose(&mut self, question: usize, option: usize) -> Option<bool> {
        let entry = self.questions.get(question)?;
        if option >= entry.options.len() {
            return None;
        }
        let slot = self.chosen.get_mut(question)?;
        if slot.is_some() {
            return None;
        }
        *slot = Some(option);
        Some(entry.is_correct(option))
    }

    /// `(correct, answered)` so far.
    pub fn score(&self) -> (usize, usize) {
        self.questions
            .iter()
            .zip(&self.chosen)
            .filter_map(|(question, chosen)| chosen.map(|option| question.is_correct(option)))
            .fold((0, 0), |(correct, answered), ok| {
                (correct + usize::from(ok), answered + 1)
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientState {
    /// Current contents of the passage input.
    pub passage: String,
    /// Passage echoed by the last successful analysis.
    pub analyzed_passage: String,
    pub vocabulary: Vec<VocabularyItem>,
    pub stats: Option<Stats>,
    pub mode: Mode,
    pub theme: Theme,
    pub saved: SavedWords,
    pub summary: Option<String>,
    pub quiz: Option<QuizState>,
    pub active_tab: Tab,
    pub search: String,
    pub busy: BusyFlags,
    pub selected: Option<VocabularyItem>,
    pub(crate) toasts: Vec<Toast>,
}

impl ClientState {
    pub fn has_results(&self) -> bool {
        self.stats.is_some()
    }

    pub fn char_count(&self) -> usize {
        passage_length(&self.passage)
    }

    /// Cards that pass the current search filter.
    pub fn visible_vocabulary(&self) -> Vec<&VocabularyItem> {
        self.vocabulary
            .iter()
            .filter(|item| item.matches(&self.search))
            .collect()
    }

    /// Whether the generate control of `tab` is shown.
    pub fn generate_control_visible(&self, tab: Tab) -> bool {
        match tab {
            Tab::Vocabulary => false,
            Tab::Summary | Tab::Quiz => !self.vocabulary.is_empty(),
        }
    }

    pub fn toasts(&self) -> &[Toast] {
        &self.toasts
    }

    pub fn take_toasts(&mut self) -> Vec<Toast> {
        std::mem::take(&mut self.toasts)
    }

    fn toast(&mut self, kind: ToastKind, message: impl Into<String>) {
        self.toasts.push(Toast {
            kind,
            message: message.into(),
        });
    }
}

/// Device capabilities the card actions rely on.
pub trait Platform: Send + Sync {
    /// Speaks `text`; returns false when speech synthesis is unavailable.
    fn speak(&self, text: &str, rate: f32) -> bool;
    fn copy_text(&self, text: &str) -> Result<(), String>;
}

/// No speech; the clipboard is an in-memory buffer.
#[derive(Default)]
pub struct HeadlessPlatform {
    clipboard: Mutex<Option<String>>,
}

impl HeadlessPlatform {
    pub fn clipboard(&self) -> Option<String> {
        self.clipboard.lock().clone()
    }
}

impl Platform for HeadlessPlatform {
    fn speak(&self, _text: &str, _rate: f32) -> bool {
        false
    }

    fn copy_text(&self, text: &str) -> Result<(), String> {
        *self.clipboard.lock() = Some(text.to_string());
        Ok(())
    }
}

/// Sets a busy flag for as long as it lives, including when the owning
/// future is dropped mid-request.
struct Busy(Arc<AtomicBool>);

impl Busy {
    fn enter(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Busy(flag.clone())
    }
}

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ClientController<T, S> {
    state: ClientState,
    transport: T,
    store: S,
    platform: Arc<dyn Platform>,
}

impl<T: ApiTransport, S: KeyValueStore> ClientController<T, S> {
    /// Builds the controller with theme, mode and saved words read from `store`.
    pub fn load(transport: T, store: S, platform: Arc<dyn Platform>) -> Self {
        let state = ClientState {
            theme: store.load(THEME_KEY).unwrap_or_default(),
            mode: store.load(MODE_KEY).unwrap_or_default(),
            saved: store.load(SAVED_WORDS_KEY).unwrap_or_default(),
            ..ClientState::default()
        };
        Self {
            state,
            transport,
            store,
            platform,
        }
    }

    /// Installs and activates the transport's offline cache, if it has one.
    pub async fn prepare_offline(&self) {
        self.transport.prepare_offline().await;
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Shared handle on the busy flags, readable while a request is pending.
    pub fn busy(&self) -> BusyFlags {
        self.state.busy.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn take_toasts(&mut self) -> Vec<Toast> {
        self.state.take_toasts()
    }

    pub fn set_passage(&mut self, passage: impl Into<String>) {
        self.state.passage = passage.into();
    }

    /// Sends the passage for analysis. Returns true when new results were applied.
    pub async fn analyze(&mut self) -> bool {
        let passage = self.state.passage.trim().to_string();
        if passage.is_empty() {
            self.state
                .toast(ToastKind::Error, "Please paste a passage to analyze");
            return false;
        }
        if passage_length(&passage) > MAX_PASSAGE_CHARS {
            self.state.toast(
                ToastKind::Error,
                "Passage is too long. Maximum 15,000 characters.",
            );
            return false;
        }

        let request = AnalyzeRequest::new(passage, self.state.mode);
        let outcome = {
            let _busy = Busy::enter(&self.state.busy.analyzing);
            self.transport.analyze(&request).await
        };

        match outcome {
            Ok(response) => {
                self.state.vocabulary = response.vocabulary;
                self.state.stats = Some(response.stats);
                self.state.analyzed_passage = response.passage;
                self.state.search.clear();
                self.state.summary = None;
                self.state.quiz = None;
                self.state.selected = None;
                self.state.active_tab = Tab::Vocabulary;
                self.state
                    .toast(ToastKind::Success, "Passage analyzed successfully!");
                true
            }
            Err(err) => {
                error!(error = %err, "analysis failed");
                self.state.toast(ToastKind::Error, format!("Error: {err}"));
                false
            }
        }
    }

    pub async fn generate_summary(&mut self) -> bool {
        let request = SummaryRequest {
            passage: self.state.passage.clone(),
        };
        let outcome = {
            let _busy = Busy::enter(&self.state.busy.summarizing);
            self.transport.summary(&request).await
        };
        match outcome {
            Ok(response) => {
                self.state.summary = Some(response.summary);
                true
            }
            Err(err) => {
                error!(error = %err, "summary failed");
                self.state
                    .toast(ToastKind::Error, "Failed to generate summary");
                false
            }
        }
    }

    pub async fn generate_quiz(&mut self) -> bool {
        let request = QuizRequest {
            vocabulary: self.state.vocabulary.clone(),
            passage: self.state.passage.clone(),
        };
        let outcome = {
            let _busy = Busy::enter(&self.state.busy.quizzing);
            self.transport.quiz(&request).await
        };
        match outcome {
            Ok(response) => {
                self.state.quiz = Some(QuizState::new(response.quiz));
                self.state
                    .toast(ToastKind::Success, "Quiz generated successfully!");
                true
            }
            Err(err) => {
                error!(error = %err, "quiz failed");
                self.state.toast(ToastKind::Error, "Failed to generate quiz");
                false
            }
        }
    }

    /// Locks in an answer; `None` if the question is unknown or already answered.
    pub fn answer_question(&mut self, question: usize, option: usize) -> Option<bool> {
        self.state.quiz.as_mut()?.choose(question, option)
    }

    /// Toggles membership in the saved list. Returns whether the word is saved now.
    pub fn toggle_save(&mut self, item: &VocabularyItem) -> bool {
        let saved = self.state.saved.toggle(item);
        self.persist(SAVED_WORDS_KEY, &self.state.saved);
        let message = if saved {
            "Word saved!"
        } else {
            "Word removed from saved"
        };
        self.state.toast(ToastKind::Success, message);
        saved
    }

    /// Looks `word` up in the current vocabulary, then the saved list, and toggles it.
    pub fn toggle_save_word(&mut self, word: &str) -> Option<bool> {
        let item = self.lookup_word(word)?;
        Some(self.toggle_save(&item))
    }

    /// Saves `word` unless it is already saved. Returns `Some(true)` when it
    /// was added, `Some(false)` when it was already saved and `None` when the
    /// word is unknown.
    pub fn save_word(&mut self, word: &str) -> Option<bool> {
        let item = self.lookup_word(word)?;
        if self.state.saved.contains(&item.word) {
            return Some(false);
        }
        Some(self.toggle_save(&item))
    }

    fn lookup_word(&self, word: &str) -> Option<VocabularyItem> {
        let key = word.to_lowercase();
        self.state
            .vocabulary
            .iter()
            .find(|item| item.key() == key)
            .or_else(|| self.state.saved.get(word))
            .cloned()
    }

    pub fn clear_saved(&mut self) {
        self.state.saved.clear();
        self.persist(SAVED_WORDS_KEY, &self.state.saved);
        self.state.toast(ToastKind::Success, "Saved words cleared");
    }

    pub fn search(&mut self, term: impl Into<String>) {
        self.state.search = term.into();
    }

    pub fn switch_tab(&mut self, tab: Tab) {
        self.state.active_tab = tab;
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.state.theme = self.state.theme.toggled();
        self.persist(THEME_KEY, &self.state.theme);
        self.state.theme
    }

    pub fn toggle_mode(&mut self) -> Mode {
        self.state.mode = self.state.mode.toggled();
        self.persist(MODE_KEY, &self.state.mode);
        if !self.state.vocabulary.is_empty() {
            let message = format!(
                "Switched to {} mode. Re-analyze for new meanings.",
                self.state.mode.as_str()
            );
            self.state.toast(ToastKind::Info, message);
        }
        self.state.mode
    }

    pub fn pronounce(&mut self, word: &str) {
        if self.platform.speak(word, SPEECH_RATE) {
            self.state.toast(ToastKind::Info, "Pronouncing...");
        } else {
            self.state
                .toast(ToastKind::Error, "Speech synthesis not supported");
        }
    }

    pub fn copy(&mut self, item: &VocabularyItem) {
        self.copy_text(&item.pair_line());
    }

    pub fn copy_all(&mut self) {
        let text = self
            .state
            .vocabulary
            .iter()
            .map(VocabularyItem::pair_line)
            .collect::<Vec<_>>()
            .join("\n");
        self.copy_text(&text);
    }

    pub fn open_word(&mut self, item: &VocabularyItem) {
        self.state.selected = Some(item.clone());
    }

    /// Opens the detail panel for a highlighted occurrence, matched case-insensitively.
    pub fn open_highlighted(&mut self, word: &str) -> bool {
        let key = word.to_lowercase();
        let found = self
            .state
            .vocabulary
            .iter()
            .find(|item| item.key() == key)
            .cloned();
        let opened = found.is_some();
        if let Some(item) = found {
            self.state.selected = Some(item);
        }
        opened
    }

    pub fn close_word(&mut self) {
        self.state.selected = None;
    }

    fn copy_text(&mut self, text: &str) {
        match self.platform.copy_text(text) {
            Ok(()) => self.state.toast(ToastKind::Success, "Copied to clipboard!"),
            Err(err) => {
                warn!(error = %err, "clipboard write failed");
                self.state.toast(ToastKind::Error, "Could not copy to clipboard");
            }
        }
    }

    fn persist<V: Serialize + ?Sized>(&self, key: &str, value: &V) {
        if let Err(err) = self.store.store(key, value) {
            warn!(key, error = %err, "failed to persist client state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{AnalyzeResponse, QuizResponse, SummaryResponse};
    use crate::storage::MemoryStore;
    use crate::transport::fake::ScriptedTransport;
    use crate::vocab::Difficulty;

    type Controller = ClientController<ScriptedTransport, Arc<MemoryStore>>;

    fn fresh(store: &Arc<MemoryStore>) -> Controller {
        ClientController::load(
            ScriptedTransport::default(),
            store.clone(),
            Arc::new(HeadlessPlatform::default()),
        )
    }

    fn cat() -> VocabularyItem {
        VocabularyItem::new("cat", "a small animal", Difficulty::Easy)
    }

    fn analysis() -> AnalyzeResponse {
        let vocabulary = vec![
            cat(),
            VocabularyItem::new("Lucid", "clear and easy to understand", Difficulty::Hard),
        ];
        AnalyzeResponse {
            stats: Stats::compute(&vocabulary, "The cat sat. Lucid prose."),
            vocabulary,
            passage: "The cat sat. Lucid prose.".into(),
        }
    }

    #[tokio::test]
    async fn analyze_replaces_results_and_clears_busy() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        *controller.transport().analyze.lock() = Some(Ok(analysis()));
        controller.set_passage("  The cat sat. Lucid prose.  ");

        assert!(controller.analyze().await);
        let state = controller.state();
        assert_eq!(state.vocabulary.len(), 2);
        assert_eq!(state.stats.unwrap().total_words, 2);
        assert!(!state.busy.analyzing());
        assert_eq!(state.active_tab, Tab::Vocabulary);
        assert_eq!(
            controller.transport().sent.lock().as_slice(),
            ["analyze:The cat sat. Lucid prose.".to_string()]
        );
        let toasts = controller.take_toasts();
        assert_eq!(toasts[0].kind, ToastKind::Success);
    }

    #[tokio::test]
    async fn failed_analysis_restores_controls_and_toasts() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        *controller.transport().analyze.lock() = Some(Err("Failed to parse AI response".into()));
        controller.set_passage("Some passage");

        assert!(!controller.analyze().await);
        assert!(!controller.state().busy.analyzing());
        assert!(controller.state().vocabulary.is_empty());
        let toasts = controller.take_toasts();
        assert_eq!(
            toasts,
            vec![Toast {
                kind: ToastKind::Error,
                message: "Error: Failed to parse AI response".into(),
            }]
        );
    }

    #[tokio::test]
    async fn invalid_passages_are_caught_locally() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        controller.set_passage("   ");
        assert!(!controller.analyze().await);
        controller.set_passage("x".repeat(MAX_PASSAGE_CHARS + 1));
        assert!(!controller.analyze().await);
        assert!(controller.transport().sent.lock().is_empty());
        assert_eq!(controller.take_toasts().len(), 2);
    }

    #[tokio::test]
    async fn saving_twice_toggles_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        assert!(controller.toggle_save(&cat()));
        let shouting = VocabularyItem::new("CAT", "a small animal", Difficulty::Easy);
        assert!(!controller.toggle_save(&shouting));
        assert!(controller.state().saved.is_empty());

        controller.toggle_save(&cat());
        let reloaded = fresh(&store);
        assert!(reloaded.state().saved.contains("Cat"));
        assert_eq!(reloaded.state().saved.len(), 1);
    }

    #[test]
    fn stored_duplicates_collapse_on_load() {
        let store = Arc::new(MemoryStore::new());
        store
            .store(
                SAVED_WORDS_KEY,
                &vec![cat(), VocabularyItem::new("Cat", "feline", Difficulty::Medium)],
            )
            .unwrap();
        let controller = fresh(&store);
        assert_eq!(controller.state().saved.len(), 1);
        assert_eq!(controller.state().saved.get("CAT").unwrap().meaning, "a small animal");
    }

    #[tokio::test]
    async fn search_filters_without_requests() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        *controller.transport().analyze.lock() = Some(Ok(analysis()));
        controller.set_passage("The cat sat.");
        controller.analyze().await;

        controller.search("CLEAR");
        let visible = controller.state().visible_vocabulary();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].word, "Lucid");
        assert_eq!(controller.transport().sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn generate_controls_follow_vocabulary() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        controller.switch_tab(Tab::Quiz);
        assert!(!controller.state().generate_control_visible(Tab::Quiz));

        *controller.transport().analyze.lock() = Some(Ok(analysis()));
        controller.set_passage("The cat sat.");
        controller.analyze().await;
        assert!(controller.state().generate_control_visible(Tab::Summary));
        assert!(controller.state().generate_control_visible(Tab::Quiz));
    }

    #[tokio::test]
    async fn quiz_answers_lock_after_first_choice() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        *controller.transport().quiz.lock() = Some(Ok(QuizResponse {
            quiz: vec![QuizQuestion {
                question: "What does 'cat' mean?".into(),
                options: vec!["a dog".into(), "a small animal".into(), "a car".into(), "a hat".into()],
                answer: 1,
            }],
        }));
        assert!(controller.generate_quiz().await);
        assert!(!controller.state().busy.quizzing());
        assert_eq!(controller.answer_question(0, 2), Some(false));
        assert_eq!(controller.answer_question(0, 1), None);
        assert_eq!(controller.answer_question(3, 0), None);
        assert_eq!(controller.state().quiz.as_ref().unwrap().score(), (0, 1));
    }

    #[tokio::test]
    async fn summary_failure_toasts() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        controller.set_passage("Text.");
        *controller.transport().summary.lock() = Some(Err("boom".into()));
        assert!(!controller.generate_summary().await);
        assert!(!controller.state().busy.summarizing());
        assert_eq!(controller.take_toasts()[0].message, "Failed to generate summary");

        *controller.transport().summary.lock() = Some(Ok(SummaryResponse {
            summary: "Short.".into(),
        }));
        assert!(controller.generate_summary().await);
        assert_eq!(controller.state().summary.as_deref(), Some("Short."));
    }

    #[test]
    fn theme_and_mode_persist() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        assert_eq!(controller.toggle_theme(), Theme::Dark);
        assert_eq!(controller.toggle_mode(), Mode::Advanced);
        // no vocabulary yet, so no re-analyze hint
        assert!(controller.take_toasts().is_empty());

        let reloaded = fresh(&store);
        assert_eq!(reloaded.state().theme, Theme::Dark);
        assert_eq!(reloaded.state().mode, Mode::Advanced);
    }

    #[test]
    fn copy_actions_use_platform_clipboard() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(HeadlessPlatform::default());
        let mut controller = ClientController::load(
            ScriptedTransport::default(),
            store.clone(),
            platform.clone(),
        );
        controller.copy(&cat());
        assert_eq!(platform.clipboard().as_deref(), Some("cat: a small animal"));
        controller.pronounce("cat");
        let toasts = controller.take_toasts();
        assert_eq!(toasts[1].message, "Speech synthesis not supported");
    }

    #[tokio::test]
    async fn highlighted_words_open_details() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        *controller.transport().analyze.lock() = Some(Ok(analysis()));
        controller.set_passage("The cat sat.");
        controller.analyze().await;
        assert!(controller.open_highlighted("LUCID"));
        assert_eq!(controller.state().selected.as_ref().unwrap().word, "Lucid");
        assert!(!controller.open_highlighted("dog"));
        controller.close_word();
        assert!(controller.state().selected.is_none());
    }

    #[tokio::test]
    async fn busy_flag_is_visible_while_analysis_is_pending() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        controller.transport().stall.store(true, Ordering::Release);
        controller.set_passage("The cat sat.");
        let busy = controller.busy();
        assert!(!busy.analyzing());

        let mut pending = Box::pin(controller.analyze());
        assert!(futures::poll!(pending.as_mut()).is_pending());
        assert!(busy.analyzing());
        let page = crate::render::render_page(&ClientState {
            busy: busy.clone(),
            ..ClientState::default()
        })
        .unwrap();
        assert!(page.contains("Analyzing..."));

        drop(pending);
        assert!(!busy.analyzing());
    }

    #[tokio::test]
    async fn astral_passages_hit_the_length_limit() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        controller.set_passage("\u{1F600}".repeat(MAX_PASSAGE_CHARS / 2 + 1));
        assert!(!controller.analyze().await);
        assert!(controller.transport().sent.lock().is_empty());
        assert_eq!(
            controller.take_toasts()[0].message,
            "Passage is too long. Maximum 15,000 characters."
        );
    }

    #[test]
    fn clear_saved_persists_empty_list() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        controller.toggle_save(&cat());
        controller.take_toasts();

        controller.clear_saved();
        assert!(controller.state().saved.is_empty());
        let stored: Vec<VocabularyItem> = store.load(SAVED_WORDS_KEY).unwrap();
        assert!(stored.is_empty());
        assert_eq!(
            controller.take_toasts(),
            vec![Toast {
                kind: ToastKind::Success,
                message: "Saved words cleared".into(),
            }]
        );
    }

    #[tokio::test]
    async fn copy_all_joins_pairs_by_line() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(HeadlessPlatform::default());
        let mut controller = ClientController::load(
            ScriptedTransport::default(),
            store.clone(),
            platform.clone(),
        );
        *controller.transport().analyze.lock() = Some(Ok(analysis()));
        controller.set_passage("The cat sat.");
        controller.analyze().await;
        controller.take_toasts();

        controller.copy_all();
        assert_eq!(
            platform.clipboard().as_deref(),
            Some("cat: a small animal\nLucid: clear and easy to understand")
        );
        assert_eq!(controller.take_toasts()[0].message, "Copied to clipboard!");
    }

    #[tokio::test]
    async fn toggle_save_word_looks_in_vocabulary_then_saved() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        assert_eq!(controller.toggle_save_word("cat"), None);

        *controller.transport().analyze.lock() = Some(Ok(analysis()));
        controller.set_passage("The cat sat.");
        controller.analyze().await;
        assert_eq!(controller.toggle_save_word("LUCID"), Some(true));
        assert_eq!(controller.state().saved.get("lucid").unwrap().word, "Lucid");

        let mut reloaded = fresh(&store);
        assert!(reloaded.state().vocabulary.is_empty());
        assert_eq!(reloaded.toggle_save_word("lucid"), Some(false));
        assert!(reloaded.state().saved.is_empty());
        assert_eq!(reloaded.toggle_save_word("dog"), None);
    }

    #[tokio::test]
    async fn save_word_never_unsaves() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        controller.toggle_save(&cat());
        *controller.transport().analyze.lock() = Some(Ok(analysis()));
        controller.set_passage("The cat sat.");
        controller.analyze().await;
        controller.take_toasts();

        assert_eq!(controller.save_word("CAT"), Some(false));
        assert!(controller.state().saved.contains("cat"));
        assert!(controller.take_toasts().is_empty());
        assert_eq!(controller.save_word("lucid"), Some(true));
        assert_eq!(controller.save_word("dog"), None);
        assert_eq!(fresh(&store).state().saved.len(), 2);
    }

    #[tokio::test]
    async fn mode_switch_with_results_hints_reanalysis() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = fresh(&store);
        *controller.transport().analyze.lock() = Some(Ok(analysis()));
        controller.set_passage("The cat sat.");
        controller.analyze().await;
        controller.take_toasts();

        assert_eq!(controller.toggle_mode(), Mode::Advanced);
        assert_eq!(
            controller.take_toasts(),
            vec![Toast {
                kind: ToastKind::Info,
                message: "Switched to advanced mode. Re-analyze for new meanings.".into(),
            }]
        );
    }
}
