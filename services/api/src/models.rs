//! API Models
//!
//! Request and response bodies of the REST API, documented with `utoipa`.
//! Domain types live in `verba-core`; the conversions below keep the wire
//! format independent of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use verba_core::ai::{Evaluation, Exercise, LessonContent, VocabularyItem};
use verba_core::{PronunciationReport, ProgressDelta, ProgressReport, Turn, User, UserStatistics};

#[derive(Deserialize, ToSchema)]
pub struct MessagePayload {
    #[schema(example = "How do I use the present perfect?")]
    pub text: String,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct StartSessionPayload {
    #[schema(example = "travel")]
    pub topic: Option<String>,
}

/// Text to show the learner in the chat channel.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ReplyResponse {
    pub reply: String,
}

#[derive(Deserialize, ToSchema)]
pub struct EvaluationPayload {
    #[schema(example = "I have went to the beach yesterday")]
    pub response: String,
    /// Grading context. Defaults to the tutor's last message.
    #[schema(example = "simple past")]
    pub expected_pattern: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct EvaluationResponse {
    pub feedback: String,
    pub grammar_corrections: Vec<String>,
    pub vocabulary_suggestions: Vec<String>,
    pub grammar_score: Option<f64>,
    pub adequacy_score: Option<f64>,
}

impl From<Evaluation> for EvaluationResponse {
    fn from(e: Evaluation) -> Self {
        Self {
            feedback: e.feedback,
            grammar_corrections: e.grammar_corrections,
            vocabulary_suggestions: e.vocabulary_suggestions,
            grammar_score: e.grammar_score,
            adequacy_score: e.adequacy_score,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PronunciationPayload {
    #[schema(example = "https://cdn.discordapp.com/attachments/1/2/voice-message.ogg")]
    pub audio_url: String,
    #[schema(example = "The weather is nice today")]
    pub expected_text: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct PronunciationResponse {
    pub transcription: String,
    /// Lexical score as a percentage, present when an expected text was given.
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub ai_feedback: Option<String>,
    pub identified_errors: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    #[schema(example = "beginner")]
    pub tier: String,
}

impl From<PronunciationReport> for PronunciationResponse {
    fn from(report: PronunciationReport) -> Self {
        let (score, feedback) = match report.score {
            Some(s) => (Some((s.score * 1000.0).round() / 10.0), Some(s.feedback)),
            None => (None, None),
        };
        let (ai_feedback, identified_errors, improvement_suggestions) = match report.assessment {
            Some(a) => (
                Some(a.pronunciation_feedback),
                a.identified_errors,
                a.improvement_suggestions,
            ),
            None => (None, Vec::new(), Vec::new()),
        };
        Self {
            transcription: report.transcription,
            score,
            feedback,
            ai_feedback,
            identified_errors,
            improvement_suggestions,
            tier: report.tier.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ProgressResponse {
    pub display_name: String,
    #[schema(example = "intermediate")]
    pub tier: String,
    pub vocabulary_mastered: u32,
    pub lessons_completed: u32,
    pub practice_sessions: u32,
    /// Percentage, rounded to one decimal.
    pub pronunciation_score: f64,
    /// Percentage, rounded to one decimal.
    pub grammar_accuracy: f64,
    pub completed_topics: Vec<String>,
    pub last_active_at: DateTime<Utc>,
}

impl From<ProgressReport> for ProgressResponse {
    fn from(r: ProgressReport) -> Self {
        Self {
            display_name: r.display_name,
            tier: r.tier.to_string(),
            vocabulary_mastered: r.vocabulary_mastered,
            lessons_completed: r.lessons_completed,
            practice_sessions: r.practice_sessions,
            pronunciation_score: r.pronunciation_score,
            grammar_accuracy: r.grammar_accuracy,
            completed_topics: r.completed_topics,
            last_active_at: r.last_active_at,
        }
    }
}

/// Progress to add for the calling learner. Scores are samples in `[0, 1]`.
#[derive(Deserialize, ToSchema, Default)]
#[serde(default)]
pub struct ProgressPayload {
    pub vocabulary_mastered: Option<u32>,
    pub lessons_completed: Option<u32>,
    pub practice_sessions: Option<u32>,
    pub pronunciation_score: Option<f64>,
    pub grammar_accuracy: Option<f64>,
    #[schema(example = "past simple")]
    pub completed_topic: Option<String>,
}

impl From<ProgressPayload> for ProgressDelta {
    fn from(p: ProgressPayload) -> Self {
        Self {
            vocabulary_mastered: p.vocabulary_mastered,
            lessons_completed: p.lessons_completed,
            practice_sessions: p.practice_sessions,
            pronunciation_score: p.pronunciation_score,
            grammar_accuracy: p.grammar_accuracy,
            completed_topic: p.completed_topic,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TurnResponse {
    #[schema(example = "assistant")]
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<Turn> for TurnResponse {
    fn from(t: Turn) -> Self {
        Self {
            role: t.role.to_string(),
            content: t.content,
            timestamp: t.timestamp,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct UserResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub external_id: String,
    pub display_name: String,
    #[schema(example = "beginner")]
    pub tier: String,
    pub lessons_completed: u32,
    pub practice_sessions: u32,
    pub pronunciation_score: f64,
    pub grammar_accuracy: f64,
    pub created_at: DateTime<Utc>,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            external_id: u.external_id,
            display_name: u.display_name,
            tier: u.tier.to_string(),
            lessons_completed: u.progress.lessons_completed,
            practice_sessions: u.progress.practice_sessions,
            pronunciation_score: u.progress.pronunciation_score,
            grammar_accuracy: u.progress.grammar_accuracy,
            created_at: u.created_at,
            last_interaction_at: u.last_interaction_at,
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct ListUsersQuery {
    /// Only list learners of this tier.
    pub tier: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateTierPayload {
    #[schema(example = "advanced")]
    pub tier: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TierDistributionResponse {
    pub beginner: u64,
    pub intermediate: u64,
    pub advanced: u64,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct StatisticsResponse {
    pub total_users: u64,
    pub active_users_last_week: u64,
    pub tier_distribution: TierDistributionResponse,
    pub average_lessons_completed: f64,
    pub average_practice_sessions: f64,
    pub average_pronunciation_score: f64,
    pub average_grammar_accuracy: f64,
}

impl From<UserStatistics> for StatisticsResponse {
    fn from(s: UserStatistics) -> Self {
        Self {
            total_users: s.total_users,
            active_users_last_week: s.active_users_last_week,
            tier_distribution: TierDistributionResponse {
                beginner: s.tier_distribution.beginner,
                intermediate: s.tier_distribution.intermediate,
                advanced: s.tier_distribution.advanced,
            },
            average_lessons_completed: s.average_lessons_completed,
            average_practice_sessions: s.average_practice_sessions,
            average_pronunciation_score: s.average_pronunciation_score,
            average_grammar_accuracy: s.average_grammar_accuracy,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LessonPayload {
    #[schema(example = "present perfect")]
    pub topic: String,
    #[schema(example = "medium")]
    pub difficulty: Option<String>,
    #[schema(example = "grammar")]
    pub category: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct LessonResponse {
    pub title: String,
    pub description: String,
    pub introduction: String,
    pub main_content: String,
    pub examples: String,
    pub practice: String,
    pub conclusion: String,
}

impl From<LessonContent> for LessonResponse {
    fn from(l: LessonContent) -> Self {
        Self {
            title: l.title,
            description: l.description,
            introduction: l.introduction,
            main_content: l.main_content,
            examples: l.examples,
            practice: l.practice,
            conclusion: l.conclusion,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ExercisesPayload {
    pub lesson_content: String,
    #[schema(example = 5)]
    pub count: Option<usize>,
    #[schema(example = "medium")]
    pub difficulty: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ExerciseResponse {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub explanation: String,
}

impl From<Exercise> for ExerciseResponse {
    fn from(e: Exercise) -> Self {
        Self {
            question: e.question,
            options: e.options,
            answer: e.answer,
            explanation: e.explanation,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct VocabularyPayload {
    pub text: String,
    #[schema(example = 10)]
    pub max_items: Option<usize>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct VocabularyItemResponse {
    pub term: String,
    pub definition: String,
    pub translation: String,
    pub example: String,
}

impl From<VocabularyItem> for VocabularyItemResponse {
    fn from(v: VocabularyItem) -> Self {
        Self {
            term: v.term,
            definition: v.definition,
            translation: v.translation,
            example: v.example,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct TranslationPayload {
    pub text: String,
    #[schema(example = "pt-br")]
    pub target_language: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TranslationResponse {
    pub translation: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
