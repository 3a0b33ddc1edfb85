//! HTML rendering of the client view.
//!
//! Each region of the page is its own template so the server-rendered shell
//! and the `--html` CLI output share one code path. All model text is escaped
//! by askama; only fragments produced here are inserted with `|safe`.

use crate::client::{ClientState, QuizState, Tab};
use crate::vocab::{Stats, Theme, VocabularyItem};
use askama::Template;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use tracing::warn;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

/// One alternation over every word, longest first, so a word that is a
/// prefix of another never claims the longer occurrence.
fn highlight_pattern(vocabulary: &[VocabularyItem]) -> Option<Regex> {
    let mut seen = HashSet::new();
    let mut words: Vec<&str> = vocabulary
        .iter()
        .map(|item| item.word.trim())
        .filter(|word| !word.is_empty() && seen.insert(word.to_lowercase()))
        .collect();
    if words.is_empty() {
        return None;
    }
    words.sort_by_key(|word| std::cmp::Reverse(word.chars().count()));
    let alternation = words
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join("|");
    match RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
        .case_insensitive(true)
        .build()
    {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            warn!(error = %err, "highlight pattern rejected");
            None
        }
    }
}

/// Escapes `passage` and wraps every whole-word vocabulary occurrence in a
/// highlight span. Matching runs once over the raw text, so spans never nest.
pub fn highlight_passage(passage: &str, vocabulary: &[VocabularyItem]) -> String {
    let Some(pattern) = highlight_pattern(vocabulary) else {
        return escape_html(passage);
    };
    let mut out = String::with_capacity(passage.len() + passage.len() / 4);
    let mut last = 0;
    for found in pattern.find_iter(passage) {
        out.push_str(&escape_html(&passage[last..found.start()]));
        let word = escape_html(found.as_str());
        out.push_str(&format!(
            r#"<span class="highlighted-word" data-word="{word}">{word}</span>"#
        ));
        last = found.end();
    }
    out.push_str(&escape_html(&passage[last..]));
    out
}

struct CardView<'a> {
    item: &'a VocabularyItem,
    badge: String,
    data: String,
    saved: bool,
    hidden: bool,
}

#[derive(Template)]
#[template(
    source = r#"{% if cards.is_empty() %}<p class="text-center">No vocabulary words found.</p>{% else %}{% for card in cards %}
<div class="vocab-card"{% if card.hidden %} hidden{% endif %} data-word="{{ card.data }}">
  <div class="vocab-card-header">
    <div class="vocab-word">{{ card.item.word }}</div>
    <span class="difficulty-badge {{ card.badge }}">{{ card.item.difficulty }}</span>
  </div>
  <p class="vocab-meaning">{{ card.item.meaning }}</p>
  <div class="vocab-actions-card">
    <button class="icon-btn" data-action="pronounce" title="Pronounce">🔊</button>
    <button class="icon-btn{% if card.saved %} saved{% endif %}" data-action="save" title="Save word">{% if card.saved %}❤️{% else %}🤍{% endif %}</button>
    <button class="icon-btn" data-action="copy" title="Copy">📋</button>
  </div>
</div>{% endfor %}{% endif %}"#,
    ext = "html"
)]
struct CardsTemplate<'a> {
    cards: Vec<CardView<'a>>,
}

/// Vocabulary cards; cards filtered out by the search term stay in the markup but hidden.
pub fn render_cards(state: &ClientState) -> Result<String, askama::Error> {
    let cards = state
        .vocabulary
        .iter()
        .map(|item| CardView {
            item,
            badge: item.difficulty.css_class(),
            data: serde_json::to_string(item).unwrap_or_default(),
            saved: state.saved.contains(&item.word),
            hidden: !item.matches(&state.search),
        })
        .collect();
    CardsTemplate { cards }.render()
}

#[derive(Template)]
#[template(
    source = r#"<div class="stats-grid">
  <div class="stat-card"><span id="totalWordsCard">{{ stats.total_words }}</span><p>Vocabulary Words</p></div>
  <div class="stat-card"><span id="wordCountCard">{{ stats.word_count }}</span><p>Total Words</p></div>
  <div class="stat-card"><span id="difficultyScoreCard">{{ stats.difficulty_score }}</span><p>Difficulty Score</p></div>
</div>
<div class="difficulty-breakdown" id="difficultyBreakdown">
  <span><span class="diff-easy">●</span> {{ stats.easy_count }}</span>
  <span><span class="diff-medium">●</span> {{ stats.medium_count }}</span>
  <span><span class="diff-hard">●</span> {{ stats.hard_count }}</span>
</div>"#,
    ext = "html"
)]
struct StatsTemplate<'a> {
    stats: &'a Stats,
}

pub fn render_stats(stats: &Stats) -> Result<String, askama::Error> {
    StatsTemplate { stats }.render()
}

struct OptionView<'a> {
    index: usize,
    text: &'a str,
    class: &'static str,
}

struct QuestionView<'a> {
    number: usize,
    question: &'a str,
    answered: bool,
    options: Vec<OptionView<'a>>,
}

#[derive(Template)]
#[template(
    source = r#"{% for q in questions %}
<div class="quiz-question">
  <div class="question-text">Question {{ q.number }}: {{ q.question }}</div>
  <div class="question-options">
    {% for option in q.options %}<button class="option {{ option.class }}" data-answer="{{ option.index }}"{% if q.answered %} disabled{% endif %}>{{ option.text }}</button>
    {% endfor %}
  </div>
</div>{% endfor %}"#,
    ext = "html"
)]
struct QuizTemplate<'a> {
    questions: Vec<QuestionView<'a>>,
}

/// Quiz questions. Once a question is answered the chosen option is marked
/// correct or incorrect and every option of that question is disabled.
pub fn render_quiz(quiz: &QuizState) -> Result<String, askama::Error> {
    let questions = quiz
        .questions
        .iter()
        .zip(&quiz.chosen)
        .enumerate()
        .map(|(index, (question, chosen))| QuestionView {
            number: index + 1,
            question: &question.question,
            answered: chosen.is_some(),
            options: question
                .options
                .iter()
                .enumerate()
                .map(|(option, text)| OptionView {
                    index: option,
                    text,
                    class: match chosen {
                        Some(picked) if *picked == option && question.is_correct(option) => {
                            "correct"
                        }
                        Some(picked) if *picked == option => "incorrect",
                        _ => "",
                    },
                })
                .collect(),
        })
        .collect();
    QuizTemplate { questions }.render()
}

#[derive(Template)]
#[template(
    source = r#"<section class="saved-section" id="savedSection"{% if words.is_empty() %} hidden{% endif %}>
  <div class="saved-header"><h3>Saved Words</h3><button class="btn-secondary" data-action="clear-saved">Clear All</button></div>
  <div class="saved-words" id="savedWords">{% for word in words %}
    <div class="saved-word-card">
      <div class="saved-word-info">
        <div class="saved-word-name">{{ word.word }}</div>
        <div class="saved-word-meaning">{{ word.meaning }}</div>
      </div>
      <button class="icon-btn" data-action="unsave">❤️</button>
    </div>{% endfor %}
  </div>
</section>"#,
    ext = "html"
)]
struct SavedTemplate<'a> {
    words: Vec<&'a VocabularyItem>,
}

pub fn render_saved(state: &ClientState) -> Result<String, askama::Error> {
    SavedTemplate {
        words: state.saved.iter().collect(),
    }
    .render()
}

struct TabView {
    name: &'static str,
    label: &'static str,
    active: bool,
    generate: bool,
}

struct ToastView<'a> {
    kind: &'static str,
    message: &'a str,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en"{% if dark %} data-theme="dark"{% endif %}>
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>RC Vocabulary AI</title>
    <link rel="manifest" href="/manifest.webmanifest">
    <link rel="stylesheet" href="/styles.css">
  </head>
  <body>
    <header class="header">
      <h1>RC Vocabulary AI</h1>
      <div class="header-actions">
        <button id="modeToggle" class="mode-toggle"><span class="mode-text">{{ mode_label }}</span></button>
        <button id="themeToggle" class="theme-toggle">{% if dark %}☀️{% else %}🌙{% endif %}</button>
      </div>
    </header>
    <main class="container">
      <section class="input-section">
        <textarea id="passageInput" placeholder="Paste your RC passage here...">{{ passage }}</textarea>
        <div class="input-footer">
          <span><span id="charCount">{{ char_count }}</span> / 15000</span>
          <button id="analyzeBtn" class="btn-primary"{% if analyzing %} disabled{% endif %}>{% if analyzing %}Analyzing...{% else %}Analyze Passage{% endif %}</button>
        </div>
      </section>
      {% if has_results %}
      <section id="statsSection">{{ stats_html|safe }}</section>
      <section id="tabsSection">
        <nav class="tabs">{% for tab in tabs %}
          <button class="tab-btn{% if tab.active %} active{% endif %}" data-tab="{{ tab.name }}">{{ tab.label }}</button>{% endfor %}
        </nav>
        {% for tab in tabs %}
        <div class="tab-content{% if tab.active %} active{% endif %}" id="{{ tab.name }}Tab">
          {% if tab.name == "vocabulary" %}
          <div class="passage-display" id="highlightedPassage">{{ highlighted|safe }}</div>
          <input id="searchInput" type="search" placeholder="Search words..." value="{{ search }}">
          <div class="vocab-grid" id="vocabularyCards">{{ cards_html|safe }}</div>
          {% else if tab.name == "summary" %}
          {% if tab.generate %}<button id="generateSummaryBtn" class="btn-secondary"{% if summarizing %} disabled{% endif %}>Generate Summary</button>{% endif %}
          <div class="summary-box" id="summaryBox">{% if has_summary %}<p>{{ summary }}</p>{% endif %}</div>
          {% else %}
          {% if tab.generate %}<button id="generateQuizBtn" class="btn-secondary"{% if quizzing %} disabled{% endif %}>Generate Quiz</button>{% endif %}
          <div id="quizContainer">{{ quiz_html|safe }}</div>
          {% endif %}
        </div>
        {% endfor %}
      </section>
      {% endif %}
      {{ saved_html|safe }}
    </main>
    {% if has_modal %}
    <div class="modal show" id="wordModal">
      <div class="modal-content">
        <h2 id="modalWord">{{ modal_word }}</h2>
        <p id="modalMeaning">{{ modal_meaning }}</p>
        <button class="btn-secondary" data-action="save">{% if modal_saved %}❤️ Saved{% else %}🤍 Save{% endif %}</button>
        <button class="modal-close" data-action="close">×</button>
      </div>
    </div>
    {% endif %}
    {% for toast in toasts %}<div class="toast show {{ toast.kind }}">{{ toast.message }}</div>{% endfor %}
  </body>
</html>"#,
    ext = "html"
)]
struct PageTemplate<'a> {
    dark: bool,
    mode_label: String,
    passage: &'a str,
    char_count: usize,
    analyzing: bool,
    summarizing: bool,
    quizzing: bool,
    has_results: bool,
    stats_html: String,
    tabs: Vec<TabView>,
    highlighted: String,
    search: &'a str,
    cards_html: String,
    has_summary: bool,
    summary: &'a str,
    quiz_html: String,
    saved_html: String,
    has_modal: bool,
    modal_word: &'a str,
    modal_meaning: &'a str,
    modal_saved: bool,
    toasts: Vec<ToastView<'a>>,
}

/// Renders the full single-page view for `state`.
pub fn render_page(state: &ClientState) -> Result<String, askama::Error> {
    let stats_html = match &state.stats {
        Some(stats) => render_stats(stats)?,
        None => String::new(),
    };
    let quiz_html = match &state.quiz {
        Some(quiz) => render_quiz(quiz)?,
        None => String::new(),
    };
    let tabs = Tab::ALL
        .into_iter()
        .map(|tab| TabView {
            name: tab.as_str(),
            label: match tab {
                Tab::Vocabulary => "Vocabulary",
                Tab::Summary => "Summary",
                Tab::Quiz => "Quiz",
            },
            active: tab == state.active_tab,
            generate: state.generate_control_visible(tab),
        })
        .collect();
    let selected = state.selected.as_ref();

    PageTemplate {
        dark: state.theme == Theme::Dark,
        mode_label: state.mode.to_string(),
        passage: &state.passage,
        char_count: state.char_count(),
        analyzing: state.busy.analyzing(),
        summarizing: state.busy.summarizing(),
        quizzing: state.busy.quizzing(),
        has_results: state.has_results(),
        stats_html,
        tabs,
        highlighted: highlight_passage(&state.analyzed_passage, &state.vocabulary),
        search: &state.search,
        cards_html: render_cards(state)?,
        has_summary: state.summary.is_some(),
        summary: state.summary.as_deref().unwrap_or_default(),
        quiz_html,
        saved_html: render_saved(state)?,
        has_modal: selected.is_some(),
        modal_word: selected.map(|item| item.word.as_str()).unwrap_or_default(),
        modal_meaning: selected.map(|item| item.meaning.as_str()).unwrap_or_default(),
        modal_saved: selected.is_some_and(|item| state.saved.contains(&item.word)),
        toasts: state
            .toasts()
            .iter()
            .map(|toast| ToastView {
                kind: toast.kind.as_str(),
                message: &toast.message,
            })
            .collect(),
    }
    .render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{Difficulty, QuizQuestion};

    fn item(word: &str, meaning: &str) -> VocabularyItem {
        VocabularyItem::new(word, meaning, Difficulty::Medium)
    }

    #[test]
    fn escapes_all_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#039;s&lt;/a&gt;"
        );
    }

    #[test]
    fn longer_word_wins_over_its_prefix() {
        let vocabulary = [item("ephemera", "short-lived things"), item("ephemeral", "fleeting")];
        let html = highlight_passage("An ephemeral glow.", &vocabulary);
        assert_eq!(html.matches("<span").count(), 1);
        assert!(html.contains(r#"data-word="ephemeral">ephemeral</span>"#));
    }

    #[test]
    fn words_inside_markup_are_not_rewritten() {
        let vocabulary = [item("word", "a unit"), item("highlighted", "marked")];
        let html = highlight_passage("One word here.", &vocabulary);
        assert_eq!(html.matches("<span").count(), 1);
        assert_eq!(
            html,
            r#"One <span class="highlighted-word" data-word="word">word</span> here."#
        );
    }

    #[test]
    fn highlight_is_case_insensitive_and_whole_word() {
        let vocabulary = [item("Cat", "feline")];
        let html = highlight_passage("cat catalog CAT", &vocabulary);
        assert_eq!(html.matches("highlighted-word").count(), 2);
        assert!(html.contains("catalog"));
        assert!(html.contains(r#"data-word="CAT""#));
    }

    #[test]
    fn passage_text_is_escaped_around_matches() {
        let vocabulary = [item("lucid", "clear")];
        let html = highlight_passage("<b>lucid</b> & plain", &vocabulary);
        assert!(html.starts_with("&lt;b&gt;<span"));
        assert!(html.ends_with("&lt;/b&gt; &amp; plain"));
    }

    #[test]
    fn special_characters_in_words_are_literal() {
        let vocabulary = [item("a.b", "dotted")];
        assert_eq!(highlight_passage("axb", &vocabulary), "axb");
    }

    #[test]
    fn empty_vocabulary_shows_placeholder() {
        let html = render_cards(&ClientState::default()).unwrap();
        assert!(html.contains("No vocabulary words found."));
    }

    #[test]
    fn filtered_cards_are_hidden_and_escaped() {
        let state = ClientState {
            vocabulary: vec![item("lucid", "clear"), item("<x>", "odd & rare")],
            search: "clear".into(),
            ..ClientState::default()
        };
        let html = render_cards(&state).unwrap();
        assert_eq!(html.matches("class=\"vocab-card\" hidden").count(), 1);
        assert!(html.contains("&lt;x&gt;"));
        assert!(!html.contains("<x>"));
    }

    #[test]
    fn answered_question_marks_choice_and_disables_options() {
        let mut quiz = QuizState::new(vec![QuizQuestion {
            question: "Pick".into(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            answer: 2,
        }]);
        quiz.choose(0, 1);
        let html = render_quiz(&quiz).unwrap();
        assert!(html.contains("Question 1: Pick"));
        assert!(html.contains("option incorrect"));
        assert_eq!(html.matches(" disabled").count(), 4);
    }

    #[test]
    fn page_reflects_theme_and_results() {
        let vocabulary = vec![item("lucid", "clear")];
        let state = ClientState {
            theme: Theme::Dark,
            stats: Some(Stats::compute(&vocabulary, "A lucid text")),
            analyzed_passage: "A lucid text".into(),
            vocabulary,
            ..ClientState::default()
        };
        let html = render_page(&state).unwrap();
        assert!(html.contains(r#"data-theme="dark""#));
        assert!(html.contains("highlighted-word"));
        assert!(html.contains("generateQuizBtn"));
        assert!(html.contains(r#"id="savedSection" hidden"#));
    }

    #[test]
    fn empty_page_hides_results() {
        let html = render_page(&ClientState::default()).unwrap();
        assert!(!html.contains("statsSection"));
        assert!(html.contains("Beginner"));
    }
}
