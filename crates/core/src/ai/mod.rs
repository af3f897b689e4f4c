//! AI Capability Facade
//!
//! This module defines the capability set every AI backend is measured against,
//! the structured payloads returned by the non-conversational capabilities, and
//! the backends themselves:
//!
//! - `hybrid`: a router that statically splits capabilities between two providers.
//! - `openai_compat`: a full-featured provider for any OpenAI-compatible API.
//! - `conversation`: a conversation-only provider with a strong tutor persona.

pub mod conversation;
pub mod hybrid;
pub mod openai_compat;

pub use conversation::ConversationOnlyService;
pub use hybrid::HybridAiService;
pub use openai_compat::{ChatBackend, OpenAiCompatibleService};

use crate::error::{Capability, TutorError};
use crate::user::{ProficiencyTier, Role, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A single message sent to a chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// A generated lesson.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LessonContent {
    #[serde(deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(deserialize_with = "lenient_text")]
    pub introduction: String,
    #[serde(deserialize_with = "lenient_text")]
    pub main_content: String,
    #[serde(deserialize_with = "lenient_text")]
    pub examples: String,
    #[serde(deserialize_with = "lenient_text")]
    pub practice: String,
    #[serde(deserialize_with = "lenient_text")]
    pub conclusion: String,
}

/// One exercise derived from lesson text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exercise {
    #[serde(deserialize_with = "lenient_text")]
    pub question: String,
    #[serde(deserialize_with = "lenient_list")]
    pub options: Vec<String>,
    #[serde(alias = "correct_answer", deserialize_with = "lenient_text")]
    pub answer: String,
    #[serde(deserialize_with = "lenient_text")]
    pub explanation: String,
}

/// Feedback on a free-text answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Evaluation {
    #[serde(deserialize_with = "lenient_text")]
    pub feedback: String,
    #[serde(deserialize_with = "lenient_list")]
    pub grammar_corrections: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub vocabulary_suggestions: Vec<String>,
    /// Grammar quality in `[0, 1]`, when the model reported one.
    #[serde(deserialize_with = "lenient_score")]
    pub grammar_score: Option<f64>,
    #[serde(deserialize_with = "lenient_score")]
    pub adequacy_score: Option<f64>,
}

/// Model-written pronunciation feedback comparing expected text to a transcription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PronunciationAssessment {
    #[serde(deserialize_with = "lenient_text")]
    pub pronunciation_feedback: String,
    #[serde(deserialize_with = "lenient_list")]
    pub identified_errors: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub improvement_suggestions: Vec<String>,
    #[serde(deserialize_with = "lenient_score")]
    pub pronunciation_score: Option<f64>,
}

/// A word or expression worth studying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyItem {
    #[serde(alias = "word", alias = "expression", deserialize_with = "lenient_text")]
    pub term: String,
    #[serde(deserialize_with = "lenient_text")]
    pub definition: String,
    #[serde(deserialize_with = "lenient_text")]
    pub translation: String,
    #[serde(deserialize_with = "lenient_text")]
    pub example: String,
}

/// Models often answer with a list where a string was asked for, or the reverse.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(Value::deserialize(deserializer)?))
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(value_to_text).collect(),
        Value::Null => Vec::new(),
        other => vec![value_to_text(other)],
    })
}

/// Numbers and numeric strings are scores; anything else means none was given.
fn lenient_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Array(items) => items
            .into_iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// The capability set of an AI backend.
///
/// Only conversational replies are mandatory. Every other capability defaults
/// to failing with [`TutorError::NotSupported`], so a conversation-only backend
/// implements just [`AiService::generate_response`].
#[async_trait]
pub trait AiService: Send + Sync {
    /// Short backend name used in logs and `NotSupported` errors.
    fn provider_name(&self) -> &str;

    /// Generates the tutor's next reply from a message sequence.
    async fn generate_response(
        &self,
        messages: &[ChatMessage],
        tier: ProficiencyTier,
    ) -> Result<String, TutorError>;

    async fn generate_lesson_content(
        &self,
        _topic: &str,
        _difficulty: &str,
        _category: &str,
    ) -> Result<LessonContent, TutorError> {
        Err(TutorError::not_supported(
            self.provider_name(),
            Capability::GenerateLessonContent,
        ))
    }

    async fn generate_exercises(
        &self,
        _lesson_content: &str,
        _count: usize,
        _difficulty: &str,
    ) -> Result<Vec<Exercise>, TutorError> {
        Err(TutorError::not_supported(
            self.provider_name(),
            Capability::GenerateExercises,
        ))
    }

    /// Grades `response` against an expected pattern or the question it answers.
    async fn evaluate_response(
        &self,
        _expected_pattern: &str,
        _response: &str,
        _tier: ProficiencyTier,
    ) -> Result<Evaluation, TutorError> {
        Err(TutorError::not_supported(
            self.provider_name(),
            Capability::EvaluateResponse,
        ))
    }

    async fn evaluate_pronunciation(
        &self,
        _expected_text: &str,
        _transcription: &str,
    ) -> Result<PronunciationAssessment, TutorError> {
        Err(TutorError::not_supported(
            self.provider_name(),
            Capability::EvaluatePronunciation,
        ))
    }

    async fn generate_vocabulary_list(
        &self,
        _text: &str,
        _tier: ProficiencyTier,
        _max_items: usize,
    ) -> Result<Vec<VocabularyItem>, TutorError> {
        Err(TutorError::not_supported(
            self.provider_name(),
            Capability::GenerateVocabularyList,
        ))
    }

    async fn translate_text(
        &self,
        _text: &str,
        _target_language: &str,
    ) -> Result<String, TutorError> {
        Err(TutorError::not_supported(
            self.provider_name(),
            Capability::TranslateText,
        ))
    }
}
