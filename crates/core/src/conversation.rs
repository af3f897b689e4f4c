//! Conversation Orchestrator
//!
//! Drives one tutoring turn end to end: load the learner, update the
//! transcript, ask the conversation provider for a reply and persist the result.
//! Each call is an independent unit of work; there is no per-process map of
//! active conversations, the stored transcript is the only session state.
//!
//! The `try_*` operations return typed errors. Their plain counterparts are
//! meant for chat transports and always produce text that can be sent back to
//! the learner.

use crate::ai::{AiService, ChatMessage, Evaluation};
use crate::error::TutorError;
use crate::prompts;
use crate::store::UserStore;
use crate::user::{ProgressDelta, Role, User};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub struct ConversationHandler {
    ai: Arc<dyn AiService>,
    store: Arc<dyn UserStore>,
}

/// The context sent for a free-conversation turn: the tier system prompt
/// followed by the whole stored transcript.
pub fn build_context(user: &User) -> Vec<ChatMessage> {
    std::iter::once(ChatMessage::system(prompts::system_prompt(user.tier)))
        .chain(user.history.iter().map(ChatMessage::from))
        .collect()
}

/// Converts a failed turn into learner-facing text, logging anything unexpected.
fn reply_or_apology(result: Result<String, TutorError>, user_id: Uuid) -> String {
    match result {
        Ok(reply) => reply,
        Err(err @ TutorError::NotRegistered(_)) => {
            info!(%user_id, "Message from unregistered learner");
            err.user_message()
        }
        Err(err) => {
            error!(%user_id, error = %err, "Tutoring turn failed");
            err.user_message()
        }
    }
}

impl ConversationHandler {
    pub fn new(ai: Arc<dyn AiService>, store: Arc<dyn UserStore>) -> Self {
        Self { ai, store }
    }

    async fn load(&self, user_id: Uuid) -> Result<User, TutorError> {
        self.store
            .get_by_id(user_id)
            .await
            .map_err(TutorError::Store)?
            .ok_or_else(|| TutorError::NotRegistered(user_id.to_string()))
    }

    async fn persist(&self, user: &User) -> Result<(), TutorError> {
        self.store.save(user).await.map_err(TutorError::Store)?;
        Ok(())
    }

    /// Answers a free-text message and returns text safe to show the learner.
    pub async fn process_message(&self, user_id: Uuid, text: &str) -> String {
        reply_or_apology(self.try_process_message(user_id, text).await, user_id)
    }

    /// Nothing is persisted when the provider fails.
    #[instrument(skip_all, fields(%user_id))]
    pub async fn try_process_message(&self, user_id: Uuid, text: &str) -> Result<String, TutorError> {
        let mut user = self.load(user_id).await?;

        user.record_turn(Role::User, text);
        user.touch();

        let context = build_context(&user);
        let reply = self.ai.generate_response(&context, user.tier).await?;

        user.record_turn(Role::Assistant, reply.as_str());
        self.persist(&user).await?;
        Ok(reply)
    }

    /// Resets the transcript and opens a practice session, returning the welcome text.
    pub async fn start_practice_session(&self, user_id: Uuid, topic: Option<&str>) -> String {
        reply_or_apology(
            self.try_start_practice_session(user_id, topic).await,
            user_id,
        )
    }

    #[instrument(skip_all, fields(%user_id, ?topic))]
    pub async fn try_start_practice_session(
        &self,
        user_id: Uuid,
        topic: Option<&str>,
    ) -> Result<String, TutorError> {
        let mut user = self.load(user_id).await?;

        let system = prompts::practice_prompt(user.tier, topic);
        let opener = prompts::session_opener(topic);
        user.reset_history();
        user.record_turn(Role::System, system.as_str());
        user.record_turn(Role::User, opener.as_str());
        user.touch();

        let messages = [ChatMessage::system(system), ChatMessage::user(opener)];
        let welcome = self.ai.generate_response(&messages, user.tier).await?;

        user.record_turn(Role::Assistant, welcome.as_str());
        user.accumulate_progress(&ProgressDelta::practice_session());
        if user.level_up() {
            info!(tier = %user.tier, "Learner levelled up");
        }
        self.persist(&user).await?;
        info!(practice_sessions = user.progress.practice_sessions, "Practice session started");
        Ok(welcome)
    }

    /// Grades a learner's answer.
    ///
    /// An explicit `expected_pattern` always wins over the transcript. Without
    /// one, the last tutor message is the grading context; with neither, no
    /// provider call is made.
    #[instrument(skip_all, fields(%user_id))]
    pub async fn evaluate_user_response(
        &self,
        user_id: Uuid,
        response: &str,
        expected_pattern: Option<&str>,
    ) -> Result<Evaluation, TutorError> {
        let mut user = self.load(user_id).await?;

        let context = match expected_pattern.map(str::trim).filter(|p| !p.is_empty()) {
            Some(pattern) => pattern.to_string(),
            None => user
                .history
                .last_by(Role::Assistant)
                .map(|turn| turn.content.clone())
                .ok_or(TutorError::InsufficientContext)?,
        };

        let evaluation = self
            .ai
            .evaluate_response(&context, response, user.tier)
            .await
            .inspect_err(|e| warn!(error = %e, "Evaluation failed"))?;

        if let Some(score) = evaluation.grammar_score {
            user.accumulate_progress(&ProgressDelta::grammar(score));
            user.touch();
            if user.level_up() {
                info!(tier = %user.tier, "Learner levelled up");
            }
            self.persist(&user).await?;
        }
        Ok(evaluation)
    }
}
