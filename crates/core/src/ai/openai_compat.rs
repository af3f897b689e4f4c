use super::{
    AiService, ChatMessage, Evaluation, Exercise, LessonContent, PronunciationAssessment,
    VocabularyItem,
};
use crate::error::TutorError;
use crate::user::{ProficiencyTier, Role};
use anyhow::anyhow;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
    },
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{instrument, warn};

/// Sampling settings for a single chat completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the model for a single JSON object instead of free text.
    pub json: bool,
}

impl Sampling {
    pub const REPLY: Sampling = Sampling::text(0.7, 500);
    pub const LESSON: Sampling = Sampling::structured(0.7, 1500);
    pub const EXERCISES: Sampling = Sampling::structured(0.7, 1500);
    pub const EVALUATION: Sampling = Sampling::structured(0.3, 1000);
    pub const PRONUNCIATION: Sampling = Sampling::structured(0.3, 800);
    pub const VOCABULARY: Sampling = Sampling::structured(0.5, 1000);
    pub const TRANSLATION: Sampling = Sampling::text(0.3, 1000);

    const fn text(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
            json: false,
        }
    }

    const fn structured(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
            json: true,
        }
    }
}

/// A chat-completions client bound to one model of an OpenAI-compatible API.
pub struct ChatBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ChatBackend {
    /// Creates a backend for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the service (Groq, Gemini, OpenAI).
    /// * `model` - The model identifier used for every completion.
    pub fn new(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one completion request and returns the text of the first choice.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        sampling: Sampling,
    ) -> Result<String, TutorError> {
        let request_messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(provider_failure)?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(request_messages)
            .temperature(sampling.temperature);
        #[allow(deprecated)]
        builder.max_tokens(sampling.max_tokens);
        if sampling.json {
            builder.response_format(ResponseFormat::JsonObject);
        }
        let request = builder.build().map_err(provider_failure)?;

        let response: CreateChatCompletionResponse = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(provider_failure)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                TutorError::ProviderFailure(anyhow!(
                    "model '{}' returned no text content",
                    self.model
                ))
            })
    }
}

fn provider_failure(err: OpenAIError) -> TutorError {
    TutorError::ProviderFailure(anyhow::Error::new(err))
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.clone();
    Ok(match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

fn role_guardrail(tier: ProficiencyTier) -> String {
    format!(
        "You are VerbaMentor, an English tutor helping Brazilian students learn English. \
The student's level is {}. NEVER answer as if you were the student or as if you needed help with English. \
Your role is to teach English to the student, not the other way around. \
If the student asks whether you need help with English, politely explain that you are the tutor \
and that you are here to help them learn.",
        tier
    )
}

/// Puts the role guardrail in front of the first system message, or adds one.
fn with_guardrail(messages: &[ChatMessage], tier: ProficiencyTier) -> Vec<ChatMessage> {
    let guardrail = role_guardrail(tier);
    let mut guarded = messages.to_vec();
    match guarded.iter().position(|m| m.role == Role::System) {
        Some(i) => guarded[i].content = format!("{}\n\n{}", guardrail, guarded[i].content),
        None => guarded.insert(0, ChatMessage::system(guardrail)),
    }
    guarded
}

fn parse_object<T: DeserializeOwned>(raw: &str) -> Result<T, TutorError> {
    serde_json::from_str(raw.trim()).map_err(|e| {
        TutorError::ProviderFailure(anyhow!(e).context("model returned malformed JSON"))
    })
}

/// Accepts a bare array, an object wrapping the array under `key`, or an
/// object whose first array-valued field holds the items.
fn parse_list<T: DeserializeOwned>(raw: &str, key: &str) -> Result<Vec<T>, TutorError> {
    let value: Value = parse_object(raw)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut fields) => match fields.remove(key) {
            Some(Value::Array(items)) => items,
            _ => match fields.into_iter().find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            }) {
                Some(items) => items,
                None => {
                    warn!(key, "Structured payload held no list; returning none");
                    return Ok(Vec::new());
                }
            },
        },
        _ => {
            warn!(key, "Structured payload was neither a list nor an object");
            return Ok(Vec::new());
        }
    };
    serde_json::from_value(Value::Array(items)).map_err(|e| {
        TutorError::ProviderFailure(anyhow!(e).context(format!("malformed '{}' items", key)))
    })
}

/// Full capability set over a single OpenAI-compatible chat model.
pub struct OpenAiCompatibleService {
    name: String,
    backend: ChatBackend,
}

impl OpenAiCompatibleService {
    pub fn new(name: impl Into<String>, backend: ChatBackend) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    async fn ask(
        &self,
        persona: &str,
        prompt: String,
        sampling: Sampling,
    ) -> Result<String, TutorError> {
        self.backend
            .complete(
                &[ChatMessage::system(persona), ChatMessage::user(prompt)],
                sampling,
            )
            .await
    }
}

#[async_trait]
impl AiService for OpenAiCompatibleService {
    fn provider_name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, messages), fields(provider = %self.name, model = self.backend.model()))]
    async fn generate_response(
        &self,
        messages: &[ChatMessage],
        tier: ProficiencyTier,
    ) -> Result<String, TutorError> {
        let guarded = with_guardrail(messages, tier);
        self.backend.complete(&guarded, Sampling::REPLY).await
    }

    #[instrument(skip(self), fields(provider = %self.name))]
    async fn generate_lesson_content(
        &self,
        topic: &str,
        difficulty: &str,
        category: &str,
    ) -> Result<LessonContent, TutorError> {
        let prompt = format!(
            "Create a complete English lesson about '{topic}'. Level: {difficulty}. Category: {category}. \
The lesson must include an introduction, main content, examples, practice and a conclusion. \
Also provide a suitable title and a short description. Answer in JSON with the keys: \
title, description, introduction, main_content, examples, practice, conclusion."
        );
        let raw = self
            .ask(
                "You are an expert in creating English teaching materials.",
                prompt,
                Sampling::LESSON,
            )
            .await?;
        parse_object(&raw)
    }

    #[instrument(skip(self, lesson_content), fields(provider = %self.name))]
    async fn generate_exercises(
        &self,
        lesson_content: &str,
        count: usize,
        difficulty: &str,
    ) -> Result<Vec<Exercise>, TutorError> {
        let prompt = format!(
            "Based on the following English lesson content:\n\n{lesson_content}\n\n\
Create {count} exercises of {difficulty} level. Mix multiple-choice and open questions. \
For each exercise give: question, options (when applicable), answer and explanation. \
Answer in JSON as an object with an \"exercises\" array."
        );
        let raw = self
            .ask(
                "You are an expert in creating English exercises.",
                prompt,
                Sampling::EXERCISES,
            )
            .await?;
        parse_list(&raw, "exercises")
    }

    #[instrument(skip(self, expected_pattern, response), fields(provider = %self.name))]
    async fn evaluate_response(
        &self,
        expected_pattern: &str,
        response: &str,
        tier: ProficiencyTier,
    ) -> Result<Evaluation, TutorError> {
        let prompt = format!(
            "Evaluate the answer of a {tier} English student.\n\n\
Context or question: {expected_pattern}\n\n\
Student answer: {response}\n\n\
Give a detailed evaluation with grammar corrections, vocabulary assessment, improvement \
suggestions and a score from 0 to 1 for grammar and for adequacy. Write the feedback in \
Brazilian Portuguese. Answer in JSON with the keys: feedback, grammar_corrections, \
vocabulary_suggestions, grammar_score, adequacy_score."
        );
        let raw = self
            .ask(
                "You are an English teacher grading student answers.",
                prompt,
                Sampling::EVALUATION,
            )
            .await?;
        parse_object(&raw)
    }

    #[instrument(skip(self), fields(provider = %self.name))]
    async fn evaluate_pronunciation(
        &self,
        expected_text: &str,
        transcription: &str,
    ) -> Result<PronunciationAssessment, TutorError> {
        let prompt = format!(
            "Evaluate the pronunciation of an English student.\n\n\
Expected text: {expected_text}\n\n\
Text transcribed from the audio: {transcription}\n\n\
Compare both texts and identify pronunciation errors and omitted or added words. \
Give detailed feedback, improvement suggestions and a score from 0 to 1. \
Answer in JSON with the keys: pronunciation_feedback, identified_errors, \
improvement_suggestions, pronunciation_score."
        );
        let raw = self
            .ask(
                "You are an English pronunciation expert.",
                prompt,
                Sampling::PRONUNCIATION,
            )
            .await?;
        parse_object(&raw)
    }

    #[instrument(skip(self, text), fields(provider = %self.name))]
    async fn generate_vocabulary_list(
        &self,
        text: &str,
        tier: ProficiencyTier,
        max_items: usize,
    ) -> Result<Vec<VocabularyItem>, TutorError> {
        let prompt = format!(
            "From the following English text:\n\n{text}\n\n\
Extract up to {max_items} important words or expressions for a {tier} student. \
For each one give: term, definition, translation (Brazilian Portuguese) and an example sentence. \
Answer in JSON as an object with a \"vocabulary\" array."
        );
        let raw = self
            .ask(
                "You are an expert in teaching English vocabulary.",
                prompt,
                Sampling::VOCABULARY,
            )
            .await?;
        let mut items: Vec<VocabularyItem> = parse_list(&raw, "vocabulary")?;
        items.truncate(max_items);
        Ok(items)
    }

    #[instrument(skip(self, text), fields(provider = %self.name))]
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TutorError> {
        let prompt = format!(
            "Translate the following text into {target_language}. Answer with the translation only.\n\n{text}"
        );
        self.ask("You are a professional translator.", prompt, Sampling::TRANSLATION)
            .await
            .map(|t| t.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guardrail_is_prepended_to_existing_system_message() {
        let messages = vec![
            ChatMessage::system("Practice persona"),
            ChatMessage::user("Hello"),
        ];
        let guarded = with_guardrail(&messages, ProficiencyTier::Intermediate);

        assert_eq!(guarded.len(), 2);
        assert!(guarded[0].content.starts_with("You are VerbaMentor"));
        assert!(guarded[0].content.contains("intermediate"));
        assert!(guarded[0].content.ends_with("Practice persona"));
        assert_eq!(guarded[1], ChatMessage::user("Hello"));
    }

    #[test]
    fn guardrail_is_inserted_when_no_system_message() {
        let messages = vec![ChatMessage::user("Hello")];
        let guarded = with_guardrail(&messages, ProficiencyTier::Beginner);

        assert_eq!(guarded.len(), 2);
        assert_eq!(guarded[0].role, Role::System);
        assert_eq!(guarded[1].role, Role::User);
    }

    #[test]
    fn list_payloads_accept_bare_and_wrapped_arrays() {
        let bare: Vec<Exercise> =
            parse_list(r#"[{"question": "Q1", "correct_answer": "A"}]"#, "exercises").unwrap();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].answer, "A");

        let wrapped: Vec<Exercise> =
            parse_list(r#"{"exercises": [{"question": "Q1"}, {"question": "Q2"}]}"#, "exercises")
                .unwrap();
        assert_eq!(wrapped.len(), 2);

        let other_key: Vec<VocabularyItem> =
            parse_list(r#"{"words": [{"term": "journey"}]}"#, "vocabulary").unwrap();
        assert_eq!(other_key[0].term, "journey");
    }

    #[test]
    fn list_payload_without_array_is_empty() {
        let none: Vec<Exercise> = parse_list(r#"{"message": "sorry"}"#, "exercises").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn malformed_json_is_a_provider_failure() {
        let err = parse_object::<Evaluation>("not json").unwrap_err();
        assert!(matches!(err, TutorError::ProviderFailure(_)));
    }

    #[test]
    fn sampling_follows_capability_defaults() {
        assert_eq!(Sampling::REPLY.max_tokens, 500);
        assert!(!Sampling::REPLY.json);
        assert_eq!(Sampling::PRONUNCIATION.max_tokens, 800);
        assert!(Sampling::EVALUATION.json);
        assert_eq!(Sampling::VOCABULARY.temperature, 0.5);
    }
}
