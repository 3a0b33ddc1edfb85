use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Passages longer than this many characters are rejected before any model call.
/// Length is measured with [`passage_length`].
pub const MAX_PASSAGE_CHARS: usize = 15_000;

/// Passage length in UTF-16 code units, the unit browsers report for text
/// fields. Characters outside the Basic Multilingual Plane count twice.
pub fn passage_length(passage: &str) -> usize {
    passage.encode_utf16().count()
}

/// Three-tier difficulty label assigned per word.
///
/// Labels the model invents outside the three tiers are kept verbatim so they
/// still reach the client and still weigh into the difficulty score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Other(String),
}

impl Difficulty {
    pub fn label(&self) -> &str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
            Difficulty::Other(label) => label,
        }
    }

    /// Weight used by the difficulty score; unknown labels weigh like Medium.
    pub fn weight(&self) -> u32 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
            Difficulty::Other(_) => 2,
        }
    }

    /// CSS-friendly badge class.
    pub fn css_class(&self) -> String {
        self.label().to_lowercase()
    }
}

impl From<String> for Difficulty {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Easy" => Difficulty::Easy,
            "Medium" => Difficulty::Medium,
            "Hard" => Difficulty::Hard,
            _ => Difficulty::Other(value),
        }
    }
}

impl From<Difficulty> for String {
    fn from(value: Difficulty) -> Self {
        match value {
            Difficulty::Other(label) => label,
            other => other.label().to_string(),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub word: String,
    pub meaning: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl VocabularyItem {
    pub fn new(word: impl Into<String>, meaning: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            word: word.into(),
            meaning: meaning.into(),
            difficulty,
        }
    }

    /// Identity key used by the saved-word set.
    pub fn key(&self) -> String {
        self.word.to_lowercase()
    }

    /// `word: meaning` line used by the clipboard actions and the quiz prompt.
    pub fn pair_line(&self) -> String {
        format!("{}: {}", self.word, self.meaning)
    }

    /// Case-insensitive substring match on word or meaning.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.word.to_lowercase().contains(&term) || self.meaning.to_lowercase().contains(&term)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_words: usize,
    pub word_count: usize,
    pub difficulty_score: u32,
    pub easy_count: usize,
    pub medium_count: usize,
    pub hard_count: usize,
}

impl Stats {
    pub fn compute(vocabulary: &[VocabularyItem], passage: &str) -> Self {
        let count = |tier: Difficulty| {
            vocabulary
                .iter()
                .filter(|item| item.difficulty == tier)
                .count()
        };
        Self {
            total_words: vocabulary.len(),
            word_count: word_count(passage),
            difficulty_score: difficulty_score(vocabulary),
            easy_count: count(Difficulty::Easy),
            medium_count: count(Difficulty::Medium),
            hard_count: count(Difficulty::Hard),
        }
    }
}

/// Weighted 0-100 difficulty aggregate; `0` for an empty list.
pub fn difficulty_score(vocabulary: &[VocabularyItem]) -> u32 {
    if vocabulary.is_empty() {
        return 0;
    }
    let total: u32 = vocabulary.iter().map(|item| item.difficulty.weight()).sum();
    let max = (vocabulary.len() * 3) as f64;
    ((f64::from(total) / max) * 100.0).round() as u32
}

/// Number of whitespace-separated tokens. Leading or trailing whitespace
/// never yields empty tokens, so `" a b "` counts 2 rather than the 4 a
/// plain split on single spaces would give.
pub fn word_count(passage: &str) -> usize {
    passage.split_whitespace().count()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: usize,
}

impl QuizQuestion {
    pub const OPTION_COUNT: usize = 4;

    pub fn is_correct(&self, option: usize) -> bool {
        self.answer == option
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Beginner,
    Advanced,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Beginner => "beginner",
            Mode::Advanced => "advanced",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Mode::Beginner => Mode::Advanced,
            Mode::Advanced => Mode::Beginner,
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "beginner" => Ok(Mode::Beginner),
            "advanced" => Ok(Mode::Advanced),
            other => Err(format!("unknown mode {other:?}")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Beginner => write!(f, "Beginner"),
            Mode::Advanced => write!(f, "Advanced"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}
