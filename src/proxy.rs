//! Endpoint semantics of the proxy, independent of the HTTP layer.
//!
//! Each operation validates its input, makes exactly one model call and either
//! returns the full structured result or an error. Nothing is retried and no
//! state survives between calls.

use crate::extract::{self, ExtractError};
use crate::llm::{ChatModel, ModelError};
use crate::prompt;
use crate::vocab::{
    MAX_PASSAGE_CHARS, Mode, QuizQuestion, Stats, VocabularyItem, passage_length,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub passage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl AnalyzeRequest {
    pub fn new(passage: impl Into<String>, mode: Mode) -> Self {
        Self {
            passage: passage.into(),
            mode: Some(mode.as_str().to_string()),
        }
    }

    /// Unknown mode strings fall back to the plain prompt.
    pub fn mode(&self) -> Option<Mode> {
        self.mode.as_deref().and_then(|mode| mode.parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub vocabulary: Vec<VocabularyItem>,
    pub stats: Stats,
    pub passage: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizRequest {
    #[serde(default)]
    pub vocabulary: Vec<VocabularyItem>,
    #[serde(default)]
    pub passage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResponse {
    pub quiz: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub passage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

/// Wire shape of every error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    Validation(String),
    #[error("{context}: {source}")]
    Parse {
        context: &'static str,
        source: ExtractError,
    },
    #[error("{context}: {source}")]
    Upstream {
        context: &'static str,
        source: ModelError,
        expose_details: bool,
    },
}

impl ProxyError {
    fn validation(message: impl Into<String>) -> Self {
        ProxyError::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ProxyError::Validation(_))
    }

    /// Body sent to the caller.
    pub fn to_body(&self) -> ErrorBody {
        match self {
            ProxyError::Validation(message) => ErrorBody {
                error: message.clone(),
                details: None,
            },
            ProxyError::Parse { context, source } => ErrorBody {
                error: context.to_string(),
                details: Some(source.to_string()),
            },
            ProxyError::Upstream {
                context,
                source,
                expose_details,
            } => ErrorBody {
                error: context.to_string(),
                details: expose_details.then(|| source.to_string()),
            },
        }
    }
}

#[derive(Clone)]
pub struct Proxy {
    model: Arc<dyn ChatModel>,
}

impl Proxy {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, ProxyError> {
        validate_passage(&request.passage, true)?;
        let mode = request.mode();
        let reply = self
            .model
            .complete(prompt::vocabulary_request(&request.passage, mode))
            .await
            .map_err(|source| {
                error!(error = %source, "vocabulary request failed");
                ProxyError::Upstream {
                    context: "Failed to analyze passage",
                    source,
                    expose_details: true,
                }
            })?;
        let vocabulary = extract::parse_vocabulary(&reply).map_err(|source| {
            warn!(error = %source, content = %reply, "failed to parse vocabulary reply");
            ProxyError::Parse {
                context: "Failed to parse AI response",
                source,
            }
        })?;
        let stats = Stats::compute(&vocabulary, &request.passage);
        info!(
            words = stats.total_words,
            score = stats.difficulty_score,
            mode = mode.map(|m| m.as_str()).unwrap_or("none"),
            "passage analyzed"
        );
        Ok(AnalyzeResponse {
            vocabulary,
            stats,
            passage: request.passage,
        })
    }

    pub async fn quiz(&self, request: QuizRequest) -> Result<QuizResponse, ProxyError> {
        if request.vocabulary.is_empty() {
            return Err(ProxyError::validation("No vocabulary to create quiz"));
        }
        let reply = self
            .model
            .complete(prompt::quiz_request(&request.vocabulary))
            .await
            .map_err(|source| {
                error!(error = %source, "quiz request failed");
                ProxyError::Upstream {
                    context: "Failed to generate quiz",
                    source,
                    expose_details: false,
                }
            })?;
        let quiz = extract::parse_quiz(&reply).map_err(|source| {
            warn!(error = %source, content = %reply, "failed to parse quiz reply");
            ProxyError::Parse {
                context: "Failed to generate quiz",
                source,
            }
        })?;
        info!(
            questions = quiz.len(),
            words = request.vocabulary.len(),
            passage_chars = passage_length(&request.passage),
            "quiz generated"
        );
        Ok(QuizResponse { quiz })
    }

    pub async fn summary(&self, request: SummaryRequest) -> Result<SummaryResponse, ProxyError> {
        validate_passage(&request.passage, false)?;
        let summary = self
            .model
            .complete(prompt::summary_request(&request.passage))
            .await
            .map_err(|source| {
                error!(error = %source, "summary request failed");
                ProxyError::Upstream {
                    context: "Failed to generate summary",
                    source,
                    expose_details: false,
                }
            })?;
        Ok(SummaryResponse {
            summary: summary.trim().to_string(),
        })
    }
}

fn validate_passage(passage: &str, enforce_limit: bool) -> Result<(), ProxyError> {
    if passage.trim().is_empty() {
        return Err(ProxyError::validation("Passage cannot be empty"));
    }
    if enforce_limit && passage_length(passage) > MAX_PASSAGE_CHARS {
        return Err(ProxyError::validation(format!(
            "Passage too long (max {MAX_PASSAGE_CHARS} characters)"
        )));
    }
    Ok(())
}
