use super::openai_compat::{ChatBackend, Sampling};
use super::{AiService, ChatMessage};
use crate::error::TutorError;
use crate::user::{ProficiencyTier, Role};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Reply used when there is no student message to answer.
pub const DEFAULT_WELCOME: &str = "Hello! I'm your English tutor. How can I help you with your learning today? \
We can practice grammar, vocabulary, pronunciation or talk about a specific topic.";

const STUDENT_PREFIX: &str = "[STUDENT]: ";

const REPLY_REMINDER: &str = "Answer as the ENGLISH TUTOR in Brazilian Portuguese, remembering that you are \
the teacher helping the student. NEVER answer as if you were the one who needs to learn English.";

const SAMPLING: Sampling = Sampling {
    temperature: 0.7,
    max_tokens: 1024,
    json: false,
};

fn persona(tier: ProficiencyTier) -> String {
    format!(
        "IMPORTANT INSTRUCTIONS: You are VerbaMentor, an English tutor helping Brazilian students. \
The student's level is {}. ALWAYS answer in Brazilian Portuguese except when showing examples in English. \
You must NEVER answer as if you were the student learning English. \
You must NEVER say things like 'I don't need help with my English'. \
You are the TEACHER here to teach, and every user message comes from a STUDENT who needs to learn English. \
If a message seems to offer you help, treat it as a question about an English topic and answer as the TUTOR.",
        tier
    )
}

/// Rewrites a context for a model that tends to slip out of the tutor role.
///
/// Returns `None` when the last non-system message is not from the student.
fn compose(messages: &[ChatMessage], tier: ProficiencyTier) -> Option<Vec<ChatMessage>> {
    let dialogue: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();
    if dialogue.last().map(|m| m.role) != Some(Role::User) {
        return None;
    }

    let mut system = persona(tier);
    if let Some(context) = messages.iter().find(|m| m.role == Role::System) {
        system.push_str("\n\nAdditional context: ");
        system.push_str(&context.content);
    }

    let last = dialogue.len() - 1;
    let mut composed = Vec::with_capacity(dialogue.len() + 1);
    composed.push(ChatMessage::system(system));
    for (i, message) in dialogue.into_iter().enumerate() {
        composed.push(match message.role {
            Role::User if i == last => ChatMessage::user(format!(
                "{}{}\n\n{}",
                STUDENT_PREFIX, message.content, REPLY_REMINDER
            )),
            Role::User => ChatMessage::user(format!("{}{}", STUDENT_PREFIX, message.content)),
            _ => message.clone(),
        });
    }
    Some(composed)
}

/// Conversational replies only; every other capability is `NotSupported`.
pub struct ConversationOnlyService {
    name: String,
    backend: ChatBackend,
}

impl ConversationOnlyService {
    pub fn new(name: impl Into<String>, backend: ChatBackend) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }
}

#[async_trait]
impl AiService for ConversationOnlyService {
    fn provider_name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, messages), fields(provider = %self.name, model = self.backend.model()))]
    async fn generate_response(
        &self,
        messages: &[ChatMessage],
        tier: ProficiencyTier,
    ) -> Result<String, TutorError> {
        match compose(messages, tier) {
            Some(composed) => self.backend.complete(&composed, SAMPLING).await,
            None => {
                debug!("No student message to answer, sending the default welcome");
                Ok(DEFAULT_WELCOME.to_string())
            }
        }
    }
}
