//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the use cases and
//! collaborators shared by every request handler.

use std::sync::Arc;
use verba_core::ai::AiService;
use verba_core::speech::SpeechService;
use verba_core::{ConversationHandler, PronunciationCoach, UserService, UserStore};

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub ai: Arc<dyn AiService>,
    pub users: UserService,
    pub conversation: ConversationHandler,
    /// Absent when no transcription provider is configured.
    pub pronunciation: Option<PronunciationCoach>,
}

impl AppState {
    /// Wires the use cases around one store and one AI facade.
    pub fn new(
        store: Arc<dyn UserStore>,
        ai: Arc<dyn AiService>,
        speech: Option<Arc<dyn SpeechService>>,
    ) -> Self {
        Self {
            users: UserService::new(store.clone()),
            conversation: ConversationHandler::new(ai.clone(), store.clone()),
            pronunciation: speech.map(|speech| PronunciationCoach::new(store, speech, ai.clone())),
            ai,
        }
    }
}
