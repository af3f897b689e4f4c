//! Tutor Prompt Library
//!
//! Fixed system prompts for free conversation and practice sessions. The tutor
//! teaches Brazilian learners, so explanations are requested in Brazilian
//! Portuguese while English examples stay in English.

use crate::user::ProficiencyTier;

/// Topic announced when a practice session starts without one.
pub const DEFAULT_TOPIC: &str = "English grammar";

const BASE_PERSONA: &str = "You are VerbaMentor, a friendly and patient English tutor. \
Your goal is to help the student learn English naturally and effectively. \
ALWAYS answer in Brazilian Portuguese, except when showing examples in English. \
IMPORTANT: You are the TUTOR, not the student. Never say things like \
'As a tutor, I don't need help with my English', because that confuses the roles. \
The person sending messages is always the student who needs your help to learn English. ";

const PRACTICE_PERSONA: &str = "You are an English tutor leading a conversational practice session. \
Ask questions, encourage answers and give gentle feedback. \
ALWAYS answer in Brazilian Portuguese, except when showing examples in English. \
Never answer as if you were the student or as if you needed help with English. \
Assume that the user is the student who needs your help. ";

const SESSION_GUARDRAIL: &str = "IMPORTANT: This is a brand new conversation. \
You are the English tutor VerbaMentor and you are here to teach a student. \
In your first reply, introduce yourself as the tutor, explain today's topic and ask the student an introductory question. \
NEVER start the conversation as if the student had offered to help you. \
Do not refer to previous conversations.";

fn conversation_guidance(tier: ProficiencyTier) -> &'static str {
    match tier {
        ProficiencyTier::Beginner => {
            "This student is a BEGINNER. Use simple vocabulary and short sentences, and explain basic concepts. \
Use Portuguese for explanations. Encourage simple English and offer plenty of basic examples."
        }
        ProficiencyTier::Intermediate => {
            "This student is INTERMEDIATE. Use more varied vocabulary and grammar of medium complexity, \
and use Portuguese for the harder explanations. Correct mistakes gently and explain why."
        }
        ProficiencyTier::Advanced => {
            "This student is ADVANCED. Use rich vocabulary, idioms and complex grammar. \
Focus on nuance, refined pronunciation and fluency. Correct only significant mistakes and challenge the student."
        }
    }
}

fn practice_guidance(tier: ProficiencyTier) -> &'static str {
    match tier {
        ProficiencyTier::Beginner => {
            "The student is a BEGINNER. Use simple vocabulary, ask basic questions and give plenty of support. \
Correct fundamental mistakes."
        }
        ProficiencyTier::Intermediate => {
            "The student is INTERMEDIATE. Use more varied vocabulary, ask open questions and discuss topics of medium complexity."
        }
        ProficiencyTier::Advanced => {
            "The student is ADVANCED. Use rich vocabulary, discuss complex topics, use idioms and encourage critical thinking."
        }
    }
}

/// System prompt heading every free-conversation context.
pub fn system_prompt(tier: ProficiencyTier) -> String {
    format!("{}{}", BASE_PERSONA, conversation_guidance(tier))
}

/// System prompt for a freshly reset practice session.
pub fn practice_prompt(tier: ProficiencyTier, topic: Option<&str>) -> String {
    let topic_clause = topic
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("The topic of this session is: {}. ", t))
        .unwrap_or_default();

    format!(
        "{}\n\n{}{}{}",
        SESSION_GUARDRAIL,
        PRACTICE_PERSONA,
        topic_clause,
        practice_guidance(tier)
    )
}

/// Synthetic student message that opens a practice session.
pub fn session_opener(topic: Option<&str>) -> String {
    let topic = topic.map(str::trim).filter(|t| !t.is_empty());
    format!(
        "Hello! A new tutoring session is starting on the topic: {}",
        topic.unwrap_or(DEFAULT_TOPIC)
    )
}
