//! Pronunciation practice: transcribe a recording, score it and record progress.

use crate::ai::{AiService, PronunciationAssessment};
use crate::error::TutorError;
use crate::speech::{PronunciationScore, SpeechService, is_supported_audio, score_pronunciation};
use crate::store::UserStore;
use crate::user::{ProficiencyTier, ProgressDelta};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationReport {
    pub transcription: String,
    /// Present only when an expected text was given.
    pub score: Option<PronunciationScore>,
    /// Model-written feedback, when the feature provider could produce it.
    pub assessment: Option<PronunciationAssessment>,
    pub tier: ProficiencyTier,
}

pub struct PronunciationCoach {
    store: Arc<dyn UserStore>,
    speech: Arc<dyn SpeechService>,
    ai: Arc<dyn AiService>,
}

impl PronunciationCoach {
    pub fn new(
        store: Arc<dyn UserStore>,
        speech: Arc<dyn SpeechService>,
        ai: Arc<dyn AiService>,
    ) -> Self {
        Self { store, speech, ai }
    }

    /// Transcribes the recording at `audio_url`. With an expected text the
    /// transcription is scored and the score folded into the learner's progress;
    /// without one only the transcription is returned and nothing is saved.
    #[instrument(skip_all, fields(%user_id))]
    pub async fn evaluate(
        &self,
        user_id: Uuid,
        audio_url: &str,
        expected_text: Option<&str>,
    ) -> Result<PronunciationReport, TutorError> {
        let mut user = self
            .store
            .get_by_id(user_id)
            .await
            .map_err(TutorError::Store)?
            .ok_or_else(|| TutorError::NotRegistered(user_id.to_string()))?;

        if !is_supported_audio(audio_url) {
            return Err(TutorError::UnsupportedAudio(audio_url.to_string()));
        }

        let transcription = self.speech.process_voice_recording(audio_url, user.id).await?;

        let Some(expected) = expected_text.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(PronunciationReport {
                transcription,
                score: None,
                assessment: None,
                tier: user.tier,
            });
        };

        let score = score_pronunciation(expected, &transcription);
        let assessment = match self.ai.evaluate_pronunciation(expected, &transcription).await {
            Ok(assessment) => Some(assessment),
            Err(e) => {
                warn!(error = %e, "Pronunciation feedback unavailable, using lexical score only");
                None
            }
        };

        user.accumulate_progress(&ProgressDelta::pronunciation(score.score));
        user.touch();
        if user.level_up() {
            info!(tier = %user.tier, "Learner levelled up");
        }
        self.store.save(&user).await.map_err(TutorError::Store)?;
        info!(score = score.score, "Pronunciation scored");

        Ok(PronunciationReport {
            transcription,
            score: Some(score),
            assessment,
            tier: user.tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::MockSpeechService;
    use crate::store::InMemoryUserStore;
    use crate::testing::ScriptedAi;
    use crate::user::User;
    use approx::assert_relative_eq;
    use mockall::predicate::eq;

    const URL: &str = "https://cdn.example.com/attachments/voice.ogg?ex=1";

    fn transcribing(text: &'static str, user_id: Uuid) -> MockSpeechService {
        let mut speech = MockSpeechService::new();
        speech
            .expect_process_voice_recording()
            .with(eq(URL), eq(user_id))
            .times(1)
            .returning(move |_, _| Ok(text.to_string()));
        speech
    }

    async fn registered(store: &InMemoryUserStore) -> User {
        let mut user = User::new("discord-1", "Ana");
        user.progress.pronunciation_score = 0.5;
        store.save(&user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn scored_attempt_updates_progress() {
        let store = Arc::new(InMemoryUserStore::new());
        let user = registered(&store).await;
        let ai = Arc::new(ScriptedAi {
            assessment: Some(PronunciationAssessment {
                pronunciation_feedback: "Watch the 'th' sound".into(),
                ..Default::default()
            }),
            ..Default::default()
        });
        let coach = PronunciationCoach::new(
            store.clone(),
            Arc::new(transcribing("the weather is nice", user.id)),
            ai,
        );

        let report = coach
            .evaluate(user.id, URL, Some("The weather is nice"))
            .await
            .unwrap();

        let score = report.score.unwrap();
        assert_relative_eq!(score.score, 1.0);
        assert_eq!(
            report.assessment.unwrap().pronunciation_feedback,
            "Watch the 'th' sound"
        );
        let stored = store.get_by_id(user.id).await.unwrap().unwrap();
        assert_relative_eq!(stored.progress.pronunciation_score, 0.65, epsilon = 1e-12);
        assert!(stored.last_interaction_at.is_some());
    }

    #[tokio::test]
    async fn transcription_only_without_expected_text() {
        let store = Arc::new(InMemoryUserStore::new());
        let user = registered(&store).await;
        let coach = PronunciationCoach::new(
            store.clone(),
            Arc::new(transcribing("hello there", user.id)),
            Arc::new(ScriptedAi::default()),
        );

        let report = coach.evaluate(user.id, URL, None).await.unwrap();

        assert_eq!(report.transcription, "hello there");
        assert!(report.score.is_none());
        let stored = store.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn feedback_failure_still_records_the_lexical_score() {
        let store = Arc::new(InMemoryUserStore::new());
        let user = registered(&store).await;
        let coach = PronunciationCoach::new(
            store.clone(),
            Arc::new(transcribing("hello", user.id)),
            Arc::new(ScriptedAi::failing()),
        );

        let report = coach.evaluate(user.id, URL, Some("hello world")).await.unwrap();

        assert!(report.assessment.is_none());
        assert_relative_eq!(report.score.unwrap().score, 0.5);
        let stored = store.get_by_id(user.id).await.unwrap().unwrap();
        assert_relative_eq!(stored.progress.pronunciation_score, 0.5, epsilon = 1e-12);
    }

    #[tokio::test]
    async fn unsupported_attachment_is_rejected_before_download() {
        let store = Arc::new(InMemoryUserStore::new());
        let user = registered(&store).await;
        let mut speech = MockSpeechService::new();
        speech.expect_process_voice_recording().never();
        let coach = PronunciationCoach::new(store, Arc::new(speech), Arc::new(ScriptedAi::default()));

        let err = coach
            .evaluate(user.id, "https://cdn.example.com/notes.pdf", Some("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::UnsupportedAudio(_)));
    }

    #[tokio::test]
    async fn transcription_failure_propagates() {
        let store = Arc::new(InMemoryUserStore::new());
        let user = registered(&store).await;
        let mut speech = MockSpeechService::new();
        speech
            .expect_process_voice_recording()
            .returning(|_, _| Err(TutorError::ProviderFailure(anyhow::anyhow!("404"))));
        let coach = PronunciationCoach::new(store, Arc::new(speech), Arc::new(ScriptedAi::default()));

        let err = coach.evaluate(user.id, URL, Some("hi")).await.unwrap_err();
        assert!(matches!(err, TutorError::ProviderFailure(_)));
    }
}
