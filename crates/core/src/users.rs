//! User management use case: registration, tier overrides, progress and history.

use crate::error::TutorError;
use crate::store::{UserStatistics, UserStore};
use crate::user::{ProficiencyTier, ProgressDelta, Role, Turn, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A learner's progress formatted for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub display_name: String,
    pub tier: ProficiencyTier,
    pub vocabulary_mastered: u32,
    pub lessons_completed: u32,
    pub practice_sessions: u32,
    /// Percentage, rounded to one decimal.
    pub pronunciation_score: f64,
    /// Percentage, rounded to one decimal.
    pub grammar_accuracy: f64,
    pub completed_topics: Vec<String>,
    pub last_active_at: DateTime<Utc>,
}

fn as_percentage(score: f64) -> f64 {
    (score * 1000.0).round() / 10.0
}

impl From<&User> for ProgressReport {
    fn from(user: &User) -> Self {
        let p = &user.progress;
        Self {
            display_name: user.display_name.clone(),
            tier: user.tier,
            vocabulary_mastered: p.vocabulary_mastered,
            lessons_completed: p.lessons_completed,
            practice_sessions: p.practice_sessions,
            pronunciation_score: as_percentage(p.pronunciation_score),
            grammar_accuracy: as_percentage(p.grammar_accuracy),
            completed_topics: p.completed_topics.iter().cloned().collect(),
            last_active_at: p.last_active_at,
        }
    }
}

pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    async fn load(&self, user_id: Uuid) -> Result<User, TutorError> {
        self.store
            .get_by_id(user_id)
            .await
            .map_err(TutorError::Store)?
            .ok_or_else(|| TutorError::NotRegistered(user_id.to_string()))
    }

    async fn save(&self, user: &User) -> Result<User, TutorError> {
        self.store.save(user).await.map_err(TutorError::Store)
    }

    /// Returns the existing learner for `external_id`, or registers a new Beginner.
    #[instrument(skip(self))]
    pub async fn register_user(
        &self,
        external_id: &str,
        display_name: &str,
    ) -> Result<User, TutorError> {
        if let Some(existing) = self.find_by_external_id(external_id).await? {
            return Ok(existing);
        }

        let user = User::new(external_id, display_name);
        match self.store.save(&user).await {
            Ok(saved) => {
                info!(user_id = %saved.id, "Registered new learner");
                Ok(saved)
            }
            // A concurrent registration may have won the race.
            Err(e) => match self.find_by_external_id(external_id).await? {
                Some(existing) => {
                    warn!(error = %e, "Registration raced with another request; using existing record");
                    Ok(existing)
                }
                None => Err(TutorError::Store(e)),
            },
        }
    }

    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>, TutorError> {
        self.store
            .get_by_external_id(external_id)
            .await
            .map_err(TutorError::Store)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, TutorError> {
        self.load(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn update_user_tier(&self, user_id: Uuid, tier: &str) -> Result<User, TutorError> {
        let mut user = self.load(user_id).await?;
        user.set_tier(tier)?;
        info!(user_id = %user.id, tier = %user.tier, "Tier changed by administrator");
        self.save(&user).await
    }

    #[instrument(skip(self, delta))]
    pub async fn update_user_progress(
        &self,
        user_id: Uuid,
        delta: &ProgressDelta,
    ) -> Result<User, TutorError> {
        let mut user = self.load(user_id).await?;
        user.accumulate_progress(delta);
        if user.level_up() {
            info!(user_id = %user.id, tier = %user.tier, "Learner levelled up");
        }
        self.save(&user).await
    }

    pub async fn get_user_progress(&self, user_id: Uuid) -> Result<ProgressReport, TutorError> {
        let user = self.load(user_id).await?;
        Ok(ProgressReport::from(&user))
    }

    pub async fn add_to_conversation_history(
        &self,
        user_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<(), TutorError> {
        let mut user = self.load(user_id).await?;
        user.record_turn(role, content);
        user.touch();
        self.save(&user).await?;
        Ok(())
    }

    /// The stored transcript, or nothing for an unknown learner.
    pub async fn get_conversation_history(&self, user_id: Uuid) -> Result<Vec<Turn>, TutorError> {
        match self.store.get_by_id(user_id).await.map_err(TutorError::Store)? {
            Some(user) => Ok(user.history.into()),
            None => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: Uuid) -> Result<bool, TutorError> {
        let removed = self.store.delete(user_id).await.map_err(TutorError::Store)?;
        if removed {
            info!(%user_id, "Learner deleted");
        }
        Ok(removed)
    }

    pub async fn list_users(&self, tier: Option<ProficiencyTier>) -> Result<Vec<User>, TutorError> {
        let users = match tier {
            Some(tier) => self.store.list_by_tier(tier).await,
            None => self.store.list_all().await,
        };
        users.map_err(TutorError::Store)
    }

    pub async fn statistics(&self) -> Result<UserStatistics, TutorError> {
        self.store.statistics().await.map_err(TutorError::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryUserStore, MockUserStore};
    use approx::assert_relative_eq;

    fn service() -> (UserService, Arc<InMemoryUserStore>) {
        let store = Arc::new(InMemoryUserStore::new());
        (UserService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let (users, store) = service();
        let first = users.register_user("discord-1", "Ana").await.unwrap();
        let second = users.register_user("discord-1", "Another name").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "Ana");
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_recovers_when_a_concurrent_save_won() {
        let winner = User::new("discord-1", "Ana");
        let returned = winner.clone();
        let mut store = MockUserStore::new();
        let mut lookups = 0;
        store.expect_get_by_external_id().times(2).returning(move |_| {
            lookups += 1;
            Ok(if lookups == 1 { None } else { Some(returned.clone()) })
        });
        store
            .expect_save()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("duplicate key")));

        let users = UserService::new(Arc::new(store));
        let user = users.register_user("discord-1", "Ana").await.unwrap();
        assert_eq!(user.id, winner.id);
    }

    #[tokio::test]
    async fn invalid_tier_is_rejected_and_nothing_is_saved() {
        let (users, store) = service();
        let user = users.register_user("discord-1", "Ana").await.unwrap();

        let err = users.update_user_tier(user.id, "expert").await.unwrap_err();
        assert!(matches!(err, TutorError::InvalidTier(ref t) if t == "expert"));
        let stored = store.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.tier, ProficiencyTier::Beginner);

        let updated = users.update_user_tier(user.id, "Advanced").await.unwrap();
        assert_eq!(updated.tier, ProficiencyTier::Advanced);
    }

    #[tokio::test]
    async fn progress_update_levels_up_when_thresholds_are_met() {
        let (users, store) = service();
        let mut user = users.register_user("discord-1", "Ana").await.unwrap();
        user.progress.lessons_completed = 9;
        user.progress.pronunciation_score = 0.8;
        user.progress.grammar_accuracy = 0.8;
        store.save(&user).await.unwrap();

        let delta = ProgressDelta {
            lessons_completed: Some(1),
            ..Default::default()
        };
        let updated = users.update_user_progress(user.id, &delta).await.unwrap();

        assert_eq!(updated.tier, ProficiencyTier::Intermediate);
        assert_eq!(updated.progress.lessons_completed, 10);
    }

    #[tokio::test]
    async fn progress_report_uses_rounded_percentages() {
        let (users, store) = service();
        let mut user = users.register_user("discord-1", "Ana").await.unwrap();
        user.progress.pronunciation_score = 0.65432;
        user.progress.grammar_accuracy = 0.5;
        user.progress.completed_topics.insert("travel".into());
        store.save(&user).await.unwrap();

        let report = users.get_user_progress(user.id).await.unwrap();
        assert_relative_eq!(report.pronunciation_score, 65.4);
        assert_relative_eq!(report.grammar_accuracy, 50.0);
        assert_eq!(report.completed_topics, vec!["travel".to_string()]);
        assert_eq!(report.display_name, "Ana");
    }

    #[tokio::test]
    async fn unknown_user_is_not_registered() {
        let (users, _) = service();
        let id = Uuid::new_v4();
        assert!(matches!(
            users.get_user_progress(id).await,
            Err(TutorError::NotRegistered(_))
        ));
        assert!(users.get_conversation_history(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn adding_history_touches_the_learner() {
        let (users, _) = service();
        let user = users.register_user("discord-1", "Ana").await.unwrap();
        users
            .add_to_conversation_history(user.id, Role::User, "Hello")
            .await
            .unwrap();

        let history = users.get_conversation_history(user.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "Hello");
        let stored = users.get_user(user.id).await.unwrap();
        assert!(stored.last_interaction_at.is_some());
    }

    #[tokio::test]
    async fn list_and_delete() {
        let (users, _) = service();
        let ana = users.register_user("1", "Ana").await.unwrap();
        let bia = users.register_user("2", "Bia").await.unwrap();
        users.update_user_tier(bia.id, "advanced").await.unwrap();

        assert_eq!(users.list_users(None).await.unwrap().len(), 2);
        let advanced = users
            .list_users(Some(ProficiencyTier::Advanced))
            .await
            .unwrap();
        assert_eq!(advanced.len(), 1);

        assert!(users.delete_user(ana.id).await.unwrap());
        assert_eq!(users.statistics().await.unwrap().total_users, 1);
    }
}
