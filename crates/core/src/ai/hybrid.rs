use super::{
    AiService, ChatMessage, Evaluation, Exercise, LessonContent, PronunciationAssessment,
    VocabularyItem,
};
use crate::error::TutorError;
use crate::user::ProficiencyTier;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Routes conversational replies to one provider and every other capability
/// to another.
///
/// Routing is static: a failure from the selected provider is returned as-is
/// and never retried on the other one.
pub struct HybridAiService {
    conversation: Arc<dyn AiService>,
    features: Arc<dyn AiService>,
}

impl HybridAiService {
    pub fn new(conversation: Arc<dyn AiService>, features: Arc<dyn AiService>) -> Self {
        Self {
            conversation,
            features,
        }
    }
}

#[async_trait]
impl AiService for HybridAiService {
    fn provider_name(&self) -> &str {
        "hybrid"
    }

    async fn generate_response(
        &self,
        messages: &[ChatMessage],
        tier: ProficiencyTier,
    ) -> Result<String, TutorError> {
        debug!(provider = self.conversation.provider_name(), "Routing conversational reply");
        self.conversation.generate_response(messages, tier).await
    }

    async fn generate_lesson_content(
        &self,
        topic: &str,
        difficulty: &str,
        category: &str,
    ) -> Result<LessonContent, TutorError> {
        debug!(provider = self.features.provider_name(), "Routing lesson generation");
        self.features
            .generate_lesson_content(topic, difficulty, category)
            .await
    }

    async fn generate_exercises(
        &self,
        lesson_content: &str,
        count: usize,
        difficulty: &str,
    ) -> Result<Vec<Exercise>, TutorError> {
        debug!(provider = self.features.provider_name(), "Routing exercise generation");
        self.features
            .generate_exercises(lesson_content, count, difficulty)
            .await
    }

    async fn evaluate_response(
        &self,
        expected_pattern: &str,
        response: &str,
        tier: ProficiencyTier,
    ) -> Result<Evaluation, TutorError> {
        debug!(provider = self.features.provider_name(), "Routing response evaluation");
        self.features
            .evaluate_response(expected_pattern, response, tier)
            .await
    }

    async fn evaluate_pronunciation(
        &self,
        expected_text: &str,
        transcription: &str,
    ) -> Result<PronunciationAssessment, TutorError> {
        debug!(provider = self.features.provider_name(), "Routing pronunciation evaluation");
        self.features
            .evaluate_pronunciation(expected_text, transcription)
            .await
    }

    async fn generate_vocabulary_list(
        &self,
        text: &str,
        tier: ProficiencyTier,
        max_items: usize,
    ) -> Result<Vec<VocabularyItem>, TutorError> {
        debug!(provider = self.features.provider_name(), "Routing vocabulary extraction");
        self.features
            .generate_vocabulary_list(text, tier, max_items)
            .await
    }

    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TutorError> {
        debug!(provider = self.features.provider_name(), "Routing translation");
        self.features.translate_text(text, target_language).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Capability;
    use std::sync::Mutex;

    /// Records which capabilities were called and optionally fails them all.
    struct Recording {
        name: &'static str,
        calls: Mutex<Vec<&'static str>>,
        fail: bool,
    }

    impl Recording {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn record(&self, call: &'static str) -> Result<(), TutorError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(TutorError::ProviderFailure(anyhow::anyhow!("{} is down", self.name)))
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AiService for Recording {
        fn provider_name(&self) -> &str {
            self.name
        }

        async fn generate_response(
            &self,
            _messages: &[ChatMessage],
            _tier: ProficiencyTier,
        ) -> Result<String, TutorError> {
            self.record("generate_response")?;
            Ok(format!("reply from {}", self.name))
        }

        async fn evaluate_response(
            &self,
            _expected_pattern: &str,
            _response: &str,
            _tier: ProficiencyTier,
        ) -> Result<Evaluation, TutorError> {
            self.record("evaluate_response")?;
            Ok(Evaluation {
                feedback: self.name.to_string(),
                ..Default::default()
            })
        }

        async fn translate_text(
            &self,
            text: &str,
            _target_language: &str,
        ) -> Result<String, TutorError> {
            self.record("translate_text")?;
            Ok(text.to_uppercase())
        }
    }

    #[tokio::test]
    async fn conversation_goes_to_conversation_provider_only() {
        let conversation = Recording::new("gemini", false);
        let features = Recording::new("groq", false);
        let hybrid = HybridAiService::new(conversation.clone(), features.clone());

        let reply = hybrid
            .generate_response(&[ChatMessage::user("hi")], ProficiencyTier::Beginner)
            .await
            .unwrap();

        assert_eq!(reply, "reply from gemini");
        assert_eq!(conversation.calls(), vec!["generate_response"]);
        assert!(features.calls().is_empty());
    }

    #[tokio::test]
    async fn features_go_to_feature_provider_only() {
        let conversation = Recording::new("gemini", false);
        let features = Recording::new("groq", false);
        let hybrid = HybridAiService::new(conversation.clone(), features.clone());

        let evaluation = hybrid
            .evaluate_response("past tense", "I goed", ProficiencyTier::Beginner)
            .await
            .unwrap();
        let translated = hybrid.translate_text("olá", "en").await.unwrap();

        assert_eq!(evaluation.feedback, "groq");
        assert_eq!(translated, "OLÁ");
        assert_eq!(features.calls(), vec!["evaluate_response", "translate_text"]);
        assert!(conversation.calls().is_empty());
    }

    #[tokio::test]
    async fn feature_failure_is_not_retried_on_conversation_provider() {
        let conversation = Recording::new("gemini", false);
        let features = Recording::new("groq", true);
        let hybrid = HybridAiService::new(conversation.clone(), features.clone());

        let err = hybrid.translate_text("olá", "en").await.unwrap_err();

        assert!(matches!(err, TutorError::ProviderFailure(_)));
        assert!(err.to_string().contains("groq is down"));
        assert!(conversation.calls().is_empty());
    }

    #[tokio::test]
    async fn not_supported_from_feature_provider_propagates() {
        let conversation = Recording::new("gemini", false);
        let features = Recording::new("groq", false);
        let hybrid = HybridAiService::new(conversation.clone(), features);

        let err = hybrid
            .generate_exercises("lesson", 3, "easy")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TutorError::NotSupported { ref provider, capability: Capability::GenerateExercises }
                if provider == "groq"
        ));
        assert!(conversation.calls().is_empty());
    }
}
