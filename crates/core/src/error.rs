//! Error taxonomy shared by every tutoring use case.

use std::fmt;

/// A named operation in the AI capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    GenerateResponse,
    GenerateLessonContent,
    GenerateExercises,
    EvaluateResponse,
    EvaluatePronunciation,
    GenerateVocabularyList,
    TranslateText,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::GenerateResponse => "generate_response",
            Capability::GenerateLessonContent => "generate_lesson_content",
            Capability::GenerateExercises => "generate_exercises",
            Capability::EvaluateResponse => "evaluate_response",
            Capability::EvaluatePronunciation => "evaluate_pronunciation",
            Capability::GenerateVocabularyList => "generate_vocabulary_list",
            Capability::TranslateText => "translate_text",
        };
        f.write_str(name)
    }
}

/// Failures surfaced by the tutoring core.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// No user record exists for the given internal or external id.
    #[error("no registered user for '{0}'")]
    NotRegistered(String),
    /// A proficiency tier string did not match any known tier.
    #[error("'{0}' is not a valid proficiency tier")]
    InvalidTier(String),
    /// The provider asked to serve a capability does not implement it.
    #[error("provider '{provider}' does not support {capability}")]
    NotSupported {
        provider: String,
        capability: Capability,
    },
    /// Network, payload or rate-limit failure from an AI or speech provider.
    #[error("provider request failed: {0:#}")]
    ProviderFailure(anyhow::Error),
    /// An evaluation was requested with nothing to grade the response against.
    #[error("no expected pattern given and no previous tutor message to grade against")]
    InsufficientContext,
    /// A pronunciation attachment is not in an accepted audio format.
    #[error("'{0}' is not a supported audio attachment")]
    UnsupportedAudio(String),
    /// The user store failed to read or write.
    #[error("user store failure: {0:#}")]
    Store(anyhow::Error),
}

pub const REGISTER_FIRST_MESSAGE: &str =
    "Sorry, I couldn't find your registration. Please register first.";
pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't generate a response right now. Please try again later.";
pub const UNSUPPORTED_AUDIO_MESSAGE: &str =
    "Please send an audio file in one of the supported formats: .mp3, .wav, .ogg or .m4a.";
pub const INSUFFICIENT_CONTEXT_MESSAGE: &str =
    "I couldn't evaluate your answer without a question or an expected answer to compare it with.";

impl TutorError {
    pub fn not_supported(provider: impl Into<String>, capability: Capability) -> Self {
        Self::NotSupported {
            provider: provider.into(),
            capability,
        }
    }

    /// Text that is safe to show to the learner in the chat channel.
    pub fn user_message(&self) -> String {
        match self {
            TutorError::NotRegistered(_) => REGISTER_FIRST_MESSAGE.to_string(),
            TutorError::InvalidTier(tier) => format!(
                "'{}' is not a valid level. Use beginner, intermediate or advanced.",
                tier
            ),
            TutorError::InsufficientContext => INSUFFICIENT_CONTEXT_MESSAGE.to_string(),
            TutorError::UnsupportedAudio(_) => UNSUPPORTED_AUDIO_MESSAGE.to_string(),
            TutorError::NotSupported { .. }
            | TutorError::ProviderFailure(_)
            | TutorError::Store(_) => FALLBACK_REPLY.to_string(),
        }
    }
}
