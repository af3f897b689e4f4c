pub mod ai;
pub mod conversation;
pub mod error;
pub mod prompts;
pub mod pronunciation;
pub mod speech;
pub mod store;
pub mod user;
pub mod users;

#[cfg(test)]
mod testing;

pub use conversation::ConversationHandler;
pub use error::TutorError;
pub use pronunciation::{PronunciationCoach, PronunciationReport};
pub use store::{InMemoryUserStore, UserStatistics, UserStore};
pub use user::{ProficiencyTier, ProgressDelta, Role, Turn, User};
pub use users::{ProgressReport, UserService};
