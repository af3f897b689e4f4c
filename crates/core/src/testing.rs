//! Scripted collaborators shared by the use-case tests.

use crate::ai::{AiService, ChatMessage, Evaluation, PronunciationAssessment};
use crate::error::TutorError;
use crate::user::ProficiencyTier;
use async_trait::async_trait;
use std::sync::Mutex;

/// An AI provider that answers from a script and records what it was asked.
#[derive(Default)]
pub struct ScriptedAi {
    pub reply: String,
    pub evaluation: Evaluation,
    pub assessment: Option<PronunciationAssessment>,
    pub fail: bool,
    pub conversations: Mutex<Vec<Vec<ChatMessage>>>,
    pub evaluations: Mutex<Vec<(String, String)>>,
}

impl ScriptedAi {
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

    pub fn evaluating(evaluation: Evaluation) -> Self {
        Self {
            evaluation,
            ..Default::default()
        }
    }

    fn outage(&self) -> Result<(), TutorError> {
        if self.fail {
            Err(TutorError::ProviderFailure(anyhow::anyhow!("scripted outage")))
        } else {
            Ok(())
        }
    }

    pub fn conversation_calls(&self) -> Vec<Vec<ChatMessage>> {
        self.conversations.lock().unwrap().clone()
    }

    pub fn evaluation_calls(&self) -> Vec<(String, String)> {
        self.evaluations.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiService for ScriptedAi {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn generate_response(
        &self,
        messages: &[ChatMessage],
        _tier: ProficiencyTier,
    ) -> Result<String, TutorError> {
        self.conversations.lock().unwrap().push(messages.to_vec());
        self.outage()?;
        Ok(self.reply.clone())
    }

    async fn evaluate_response(
        &self,
        expected_pattern: &str,
        response: &str,
        _tier: ProficiencyTier,
    ) -> Result<Evaluation, TutorError> {
        self.evaluations
            .lock()
            .unwrap()
            .push((expected_pattern.to_string(), response.to_string()));
        self.outage()?;
        Ok(self.evaluation.clone())
    }

    async fn evaluate_pronunciation(
        &self,
        _expected_text: &str,
        _transcription: &str,
    ) -> Result<PronunciationAssessment, TutorError> {
        self.outage()?;
        self.assessment.clone().ok_or_else(|| {
            TutorError::not_supported("scripted", crate::error::Capability::EvaluatePronunciation)
        })
    }
}
