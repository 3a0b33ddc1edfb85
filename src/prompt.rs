use crate::llm::{ChatMessage, ChatRequest};
use crate::vocab::{Mode, VocabularyItem};

/// Number of questions requested per quiz.
pub const QUIZ_QUESTION_COUNT: usize = 5;

const VOCABULARY_SYSTEM_PROMPT: &str = r#"You are an expert English teacher specializing in vocabulary for competitive exams (CAT, GMAT, GRE, UPSC).

Your task:
1. Analyze the entire passage carefully
2. Understand the theme and context
3. Identify IMPORTANT vocabulary words (ignore: the, is, at, was, and, or, for, in, on, etc. and common words)
4. Provide contextual meanings that match the passage context, NOT generic dictionary meanings
5. For each word, assign difficulty level: Easy (basic but important), Medium, or Hard (advanced/rare)

Return ONLY valid JSON array, nothing else:
[
  {"word": "word1", "meaning": "simple meaning matching passage context", "difficulty": "Easy|Medium|Hard"},
  {"word": "word2", "meaning": "simple meaning matching passage context", "difficulty": "Easy|Medium|Hard"}
]

Rules:
- Meanings must be extremely simple and student-friendly (8th grade level vocabulary)
- Ignore common/basic words
- Extract 8-15 words maximum per passage
- Difficulty based on how advanced/rare the word is
- Preserve original word form as it appears in passage
- Meanings must be 1 sentence maximum"#;

const QUIZ_SYSTEM_PROMPT: &str = r#"You are creating a quiz for students learning vocabulary. Create multiple choice questions.
Return ONLY valid JSON array:
[
  {"question": "What does 'word' mean?", "options": ["option1", "option2", "option3", "correct"], "answer": 3}
]
- Each question should have 4 options
- Answer index is 0-3
- Keep questions simple and based on the vocabulary meanings provided"#;

const SUMMARY_SYSTEM_PROMPT: &str =
    "Summarize the passage in 2-3 sentences using simple language suitable for students.";

/// Extra instruction appended to the vocabulary prompt for the selected mode.
pub fn mode_instruction(mode: Option<Mode>) -> &'static str {
    match mode {
        Some(Mode::Beginner) => {
            "\nMode: BEGINNER - Use only very simple words in meanings (suitable for 7-8th grade)"
        }
        Some(Mode::Advanced) => {
            "\nMode: ADVANCED - Can include slightly technical terms but still keep meanings simple"
        }
        None => "",
    }
}

pub fn vocabulary_request(passage: &str, mode: Option<Mode>) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage::system(format!(
                "{VOCABULARY_SYSTEM_PROMPT}{}",
                mode_instruction(mode)
            )),
            ChatMessage::user(format!("Analyze this RC passage:\n\n{passage}")),
        ],
        temperature: 0.3,
        max_tokens: 2000,
    }
}

pub fn quiz_request(vocabulary: &[VocabularyItem]) -> ChatRequest {
    let pairs = vocabulary
        .iter()
        .map(VocabularyItem::pair_line)
        .collect::<Vec<_>>()
        .join("\n");
    ChatRequest {
        messages: vec![
            ChatMessage::system(QUIZ_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Create {QUIZ_QUESTION_COUNT} quiz questions from these vocabulary words:\n{pairs}"
            )),
        ],
        temperature: 0.7,
        max_tokens: 1500,
    }
}

pub fn summary_request(passage: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(format!("Summarize this passage:\n\n{passage}")),
        ],
        temperature: 0.5,
        max_tokens: 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::vocab::Difficulty;

    #[test]
    fn vocabulary_prompt_appends_mode() {
        let request = vocabulary_request("Some text.", Some(Mode::Advanced));
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.ends_with(mode_instruction(Some(Mode::Advanced))));
        assert!(request.messages[1].content.ends_with("Some text."));
        assert!(request.temperature < 0.5);

        let plain = vocabulary_request("Some text.", None);
        assert_eq!(plain.messages[0].content, VOCABULARY_SYSTEM_PROMPT);
    }

    #[test]
    fn quiz_prompt_lists_pairs() {
        let vocabulary = vec![
            VocabularyItem::new("lucid", "clear", Difficulty::Hard),
            VocabularyItem::new("terse", "brief", Difficulty::Medium),
        ];
        let request = quiz_request(&vocabulary);
        let user = &request.messages[1].content;
        assert!(user.starts_with("Create 5 quiz questions"));
        assert!(user.contains("lucid: clear\nterse: brief"));
    }
}
