//! Shared helpers for the HTTP integration tests.
//!
//! The app is built over the in-memory learner store with scripted AI and
//! speech backends, so no network or database is needed.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use verba_api::router::create_router;
use verba_api::state::AppState;
use verba_core::ai::{
    AiService, ChatMessage, Evaluation, Exercise, LessonContent, PronunciationAssessment,
    VocabularyItem,
};
use verba_core::speech::SpeechService;
use verba_core::{InMemoryUserStore, ProficiencyTier, TutorError, UserStore};

pub const CALLER: &str = "discord-42";

/// AI backend with canned answers that records the conversations it was sent.
#[derive(Default)]
pub struct FakeAi {
    pub reply: String,
    pub fail: bool,
    pub conversations: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeAi {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn check(&self) -> Result<(), TutorError> {
        if self.fail {
            return Err(TutorError::ProviderFailure(anyhow::anyhow!("provider down")));
        }
        Ok(())
    }
}

#[async_trait]
impl AiService for FakeAi {
    fn provider_name(&self) -> &str {
        "fake"
    }

    async fn generate_response(
        &self,
        messages: &[ChatMessage],
        _tier: ProficiencyTier,
    ) -> Result<String, TutorError> {
        self.check()?;
        self.conversations.lock().unwrap().push(messages.to_vec());
        Ok(self.reply.clone())
    }

    async fn generate_lesson_content(
        &self,
        topic: &str,
        difficulty: &str,
        category: &str,
    ) -> Result<LessonContent, TutorError> {
        self.check()?;
        Ok(LessonContent {
            title: topic.to_string(),
            description: format!("{} {}", difficulty, category),
            ..Default::default()
        })
    }

    async fn generate_exercises(
        &self,
        _lesson_content: &str,
        count: usize,
        _difficulty: &str,
    ) -> Result<Vec<Exercise>, TutorError> {
        self.check()?;
        Ok((0..count)
            .map(|i| Exercise {
                question: format!("Question {}", i + 1),
                answer: "a".to_string(),
                ..Default::default()
            })
            .collect())
    }

    async fn evaluate_response(
        &self,
        expected_pattern: &str,
        _response: &str,
        _tier: ProficiencyTier,
    ) -> Result<Evaluation, TutorError> {
        self.check()?;
        Ok(Evaluation {
            feedback: format!("Checked against: {}", expected_pattern),
            grammar_score: Some(0.8),
            ..Default::default()
        })
    }

    async fn evaluate_pronunciation(
        &self,
        _expected_text: &str,
        _transcription: &str,
    ) -> Result<PronunciationAssessment, TutorError> {
        self.check()?;
        Ok(PronunciationAssessment {
            pronunciation_feedback: "Clear speech".to_string(),
            ..Default::default()
        })
    }

    async fn generate_vocabulary_list(
        &self,
        _text: &str,
        tier: ProficiencyTier,
        max_items: usize,
    ) -> Result<Vec<VocabularyItem>, TutorError> {
        self.check()?;
        Ok((0..max_items.min(2))
            .map(|i| VocabularyItem {
                term: format!("{}-{}", tier, i),
                ..Default::default()
            })
            .collect())
    }

    async fn translate_text(&self, text: &str, target_language: &str) -> Result<String, TutorError> {
        self.check()?;
        Ok(format!("[{}] {}", target_language, text))
    }
}

/// Speech backend that "transcribes" every recording to the same text.
pub struct FixedSpeech(pub String);

#[async_trait]
impl SpeechService for FixedSpeech {
    async fn transcribe_audio(&self, _path: &Path) -> Result<String, TutorError> {
        Ok(self.0.clone())
    }

    async fn process_voice_recording(&self, _url: &str, _user_id: Uuid) -> Result<String, TutorError> {
        Ok(self.0.clone())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryUserStore>,
    pub ai: Arc<FakeAi>,
}

pub fn build_test_app(ai: FakeAi, speech: Option<FixedSpeech>) -> TestApp {
    let store = Arc::new(InMemoryUserStore::new());
    let ai = Arc::new(ai);
    let state = AppState::new(
        store.clone() as Arc<dyn UserStore>,
        ai.clone() as Arc<dyn AiService>,
        speech.map(|s| Arc::new(s) as Arc<dyn SpeechService>),
    );
    TestApp {
        router: create_router(Arc::new(state)),
        store,
        ai,
    }
}

/// Sends a request as [`CALLER`], with an optional JSON body.
pub async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", CALLER)
        .header("x-display-name", "Ana");
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
