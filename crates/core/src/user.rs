//! Learner Model
//!
//! This module defines the durable learner entity: identity, proficiency tier,
//! cumulative progress and a bounded conversational transcript. Every operation
//! here is pure and in-memory; persistence is delegated to a
//! [`UserStore`](crate::store::UserStore).

use crate::error::TutorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum number of turns kept in a learner's conversation history.
pub const HISTORY_LIMIT: usize = 20;

/// Weight kept from the stored score when a new sample is folded in.
const SCORE_CARRY: f64 = 0.7;
/// Weight given to a new score sample.
const SCORE_SAMPLE: f64 = 0.3;

/// Proficiency tier of a learner. Controls prompt content and level-up thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyTier {
    Beginner,
    Intermediate,
    Advanced,
}

impl ProficiencyTier {
    pub const ALL: [ProficiencyTier; 3] = [
        ProficiencyTier::Beginner,
        ProficiencyTier::Intermediate,
        ProficiencyTier::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyTier::Beginner => "beginner",
            ProficiencyTier::Intermediate => "intermediate",
            ProficiencyTier::Advanced => "advanced",
        }
    }

    /// The tier directly above this one, if any.
    pub fn next(&self) -> Option<ProficiencyTier> {
        match self {
            ProficiencyTier::Beginner => Some(ProficiencyTier::Intermediate),
            ProficiencyTier::Intermediate => Some(ProficiencyTier::Advanced),
            ProficiencyTier::Advanced => None,
        }
    }
}

impl fmt::Display for ProficiencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProficiencyTier {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(ProficiencyTier::Beginner),
            "intermediate" => Ok(ProficiencyTier::Intermediate),
            "advanced" => Ok(ProficiencyTier::Advanced),
            _ => Err(TutorError::InvalidTier(s.to_string())),
        }
    }
}

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message exchanged in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, insertion-ordered transcript used directly as LLM context.
///
/// Backed by a ring buffer: appending past [`HISTORY_LIMIT`] evicts the oldest
/// turn. The bound also holds for transcripts loaded from storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Turn>", into = "Vec<Turn>")]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self {
            turns: VecDeque::with_capacity(HISTORY_LIMIT + 1),
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > HISTORY_LIMIT {
            self.turns.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// The most recent turn authored by `role`.
    pub fn last_by(&self, role: Role) -> Option<&Turn> {
        self.turns.iter().rev().find(|turn| turn.role == role)
    }
}

impl From<Vec<Turn>> for ConversationHistory {
    fn from(turns: Vec<Turn>) -> Self {
        let skip = turns.len().saturating_sub(HISTORY_LIMIT);
        Self {
            turns: turns.into_iter().skip(skip).collect(),
        }
    }
}

impl From<ConversationHistory> for Vec<Turn> {
    fn from(history: ConversationHistory) -> Self {
        history.turns.into()
    }
}

/// Cumulative learning metrics. Owned by exactly one [`User`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub vocabulary_mastered: u32,
    pub lessons_completed: u32,
    pub practice_sessions: u32,
    /// Smoothed pronunciation score in `[0, 1]`.
    pub pronunciation_score: f64,
    /// Smoothed grammar accuracy in `[0, 1]`.
    pub grammar_accuracy: f64,
    pub completed_topics: BTreeSet<String>,
    pub last_active_at: DateTime<Utc>,
}

impl Progress {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            vocabulary_mastered: 0,
            lessons_completed: 0,
            practice_sessions: 0,
            pronunciation_score: 0.0,
            grammar_accuracy: 0.0,
            completed_topics: BTreeSet::new(),
            last_active_at: now,
        }
    }
}

/// A batch of progress changes. Absent fields leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressDelta {
    pub vocabulary_mastered: Option<u32>,
    pub lessons_completed: Option<u32>,
    pub practice_sessions: Option<u32>,
    pub pronunciation_score: Option<f64>,
    pub grammar_accuracy: Option<f64>,
    pub completed_topic: Option<String>,
}

impl ProgressDelta {
    pub fn practice_session() -> Self {
        Self {
            practice_sessions: Some(1),
            ..Default::default()
        }
    }

    pub fn grammar(score: f64) -> Self {
        Self {
            grammar_accuracy: Some(score),
            ..Default::default()
        }
    }

    pub fn pronunciation(score: f64) -> Self {
        Self {
            pronunciation_score: Some(score),
            ..Default::default()
        }
    }
}

/// Folds a score sample into a stored score. Zero, negative and NaN samples
/// mean "no measurement" and leave the stored value unchanged.
fn smooth(stored: f64, sample: Option<f64>) -> f64 {
    match sample {
        Some(sample) if sample > 0.0 => stored * SCORE_CARRY + sample.min(1.0) * SCORE_SAMPLE,
        _ => stored,
    }
}

/// A registered learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Internal identifier, generated at registration.
    pub id: Uuid,
    /// Identifier from the chat platform; unique across users.
    pub external_id: String,
    pub display_name: String,
    pub tier: ProficiencyTier,
    pub progress: Progress,
    pub history: ConversationHistory,
    pub created_at: DateTime<Utc>,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

impl User {
    /// A fresh Beginner learner with zeroed progress and empty history.
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            display_name: display_name.into(),
            tier: ProficiencyTier::Beginner,
            progress: Progress::new(now),
            history: ConversationHistory::new(),
            created_at: now,
            last_interaction_at: None,
        }
    }

    /// Appends a turn to the bounded history. Does not touch timestamps.
    pub fn record_turn(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(Turn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Marks the learner as active now.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_interaction_at = Some(now);
        self.progress.last_active_at = now;
    }

    /// Drops the whole transcript, used when a new practice session starts.
    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    pub fn accumulate_progress(&mut self, delta: &ProgressDelta) {
        let progress = &mut self.progress;
        progress.vocabulary_mastered = progress
            .vocabulary_mastered
            .saturating_add(delta.vocabulary_mastered.unwrap_or(0));
        progress.lessons_completed = progress
            .lessons_completed
            .saturating_add(delta.lessons_completed.unwrap_or(0));
        progress.practice_sessions = progress
            .practice_sessions
            .saturating_add(delta.practice_sessions.unwrap_or(0));

        progress.pronunciation_score =
            smooth(progress.pronunciation_score, delta.pronunciation_score);
        progress.grammar_accuracy = smooth(progress.grammar_accuracy, delta.grammar_accuracy);

        if let Some(topic) = delta.completed_topic.as_deref().map(str::trim) {
            if !topic.is_empty() {
                progress.completed_topics.insert(topic.to_string());
            }
        }
        progress.last_active_at = Utc::now();
    }

    /// Whether the progress thresholds for the next tier are met.
    pub fn should_level_up(&self) -> bool {
        let p = &self.progress;
        match self.tier {
            ProficiencyTier::Beginner => {
                p.lessons_completed >= 10
                    && p.pronunciation_score >= 0.7
                    && p.grammar_accuracy >= 0.7
            }
            ProficiencyTier::Intermediate => {
                p.lessons_completed >= 25
                    && p.pronunciation_score >= 0.8
                    && p.grammar_accuracy >= 0.8
            }
            ProficiencyTier::Advanced => false,
        }
    }

    /// Moves up exactly one tier if [`User::should_level_up`] holds.
    pub fn level_up(&mut self) -> bool {
        if !self.should_level_up() {
            return false;
        }
        match self.tier.next() {
            Some(next) => {
                self.tier = next;
                true
            }
            None => false,
        }
    }

    /// Administrative tier override. Leaves the user untouched on an unknown tier.
    pub fn set_tier(&mut self, tier: &str) -> Result<(), TutorError> {
        self.tier = tier.parse()?;
        Ok(())
    }
}
