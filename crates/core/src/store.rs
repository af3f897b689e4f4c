//! User persistence boundary and an in-process implementation.

use crate::user::{ProficiencyTier, User};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Keyed storage of [`User`] records.
///
/// Implementations must keep `external_id` unique and return full records,
/// including progress and the bounded history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<User>>;

    /// Inserts or updates by internal id and returns the stored record.
    async fn save(&self, user: &User) -> Result<User>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn list_all(&self) -> Result<Vec<User>>;

    async fn list_by_tier(&self, tier: ProficiencyTier) -> Result<Vec<User>>;

    async fn statistics(&self) -> Result<UserStatistics>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierDistribution {
    pub beginner: u64,
    pub intermediate: u64,
    pub advanced: u64,
}

impl TierDistribution {
    fn count(&mut self, tier: ProficiencyTier) {
        match tier {
            ProficiencyTier::Beginner => self.beginner += 1,
            ProficiencyTier::Intermediate => self.intermediate += 1,
            ProficiencyTier::Advanced => self.advanced += 1,
        }
    }
}

/// Aggregate figures over every stored user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStatistics {
    pub total_users: u64,
    /// Users whose last interaction falls within the past seven days.
    pub active_users_last_week: u64,
    pub tier_distribution: TierDistribution,
    pub average_lessons_completed: f64,
    pub average_practice_sessions: f64,
    pub average_pronunciation_score: f64,
    pub average_grammar_accuracy: f64,
}

impl UserStatistics {
    pub fn active_window() -> Duration {
        Duration::days(7)
    }

    pub fn from_users(users: &[User], now: DateTime<Utc>) -> Self {
        let mut stats = UserStatistics::default();
        if users.is_empty() {
            return stats;
        }

        let cutoff = now - Self::active_window();
        let (mut lessons, mut practice, mut pronunciation, mut grammar) = (0u64, 0u64, 0.0, 0.0);
        for user in users {
            stats.tier_distribution.count(user.tier);
            if user.last_interaction_at.is_some_and(|at| at > cutoff) {
                stats.active_users_last_week += 1;
            }
            lessons += u64::from(user.progress.lessons_completed);
            practice += u64::from(user.progress.practice_sessions);
            pronunciation += user.progress.pronunciation_score;
            grammar += user.progress.grammar_accuracy;
        }

        let total = users.len() as f64;
        stats.total_users = users.len() as u64;
        stats.average_lessons_completed = lessons as f64 / total;
        stats.average_practice_sessions = practice as f64 / total;
        stats.average_pronunciation_score = pronunciation / total;
        stats.average_grammar_accuracy = grammar / total;
        stats
    }
}

/// A process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn save(&self, user: &User) -> Result<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.external_id == user.external_id && u.id != user.id)
        {
            bail!(
                "external id '{}' is already registered to another user",
                user.external_id
            );
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn list_by_tier(&self, tier: ProficiencyTier) -> Result<Vec<User>> {
        let mut users = self.list_all().await?;
        users.retain(|u| u.tier == tier);
        Ok(users)
    }

    async fn statistics(&self) -> Result<UserStatistics> {
        let users = self.list_all().await?;
        Ok(UserStatistics::from_users(&users, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn save_then_lookup_by_both_ids() {
        let store = InMemoryUserStore::new();
        let user = User::new("discord-1", "Ana");
        store.save(&user).await.unwrap();

        assert_eq!(store.get_by_id(user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(
            store.get_by_external_id("discord-1").await.unwrap(),
            Some(user)
        );
        assert_eq!(store.get_by_external_id("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn external_id_must_stay_unique() {
        let store = InMemoryUserStore::new();
        store.save(&User::new("discord-1", "Ana")).await.unwrap();

        let duplicate = User::new("discord-1", "Impostor");
        assert!(store.save(&duplicate).await.is_err());
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_updates_existing_record() {
        let store = InMemoryUserStore::new();
        let mut user = User::new("discord-1", "Ana");
        store.save(&user).await.unwrap();

        user.set_tier("intermediate").unwrap();
        store.save(&user).await.unwrap();

        let stored = store.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.tier, ProficiencyTier::Intermediate);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_record_was_removed() {
        let store = InMemoryUserStore::new();
        let user = User::new("discord-1", "Ana");
        store.save(&user).await.unwrap();

        assert!(store.delete(user.id).await.unwrap());
        assert!(!store.delete(user.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_by_tier_filters() {
        let store = InMemoryUserStore::new();
        let beginner = User::new("a", "A");
        let mut advanced = User::new("b", "B");
        advanced.set_tier("advanced").unwrap();
        store.save(&beginner).await.unwrap();
        store.save(&advanced).await.unwrap();

        let found = store.list_by_tier(ProficiencyTier::Advanced).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].external_id, "b");
    }

    #[test]
    fn statistics_of_no_users_are_zero() {
        let stats = UserStatistics::from_users(&[], Utc::now());
        assert_eq!(stats, UserStatistics::default());
    }

    #[test]
    fn statistics_average_and_count_recent_activity() {
        let now = Utc::now();
        let mut recent = User::new("a", "A");
        recent.progress.lessons_completed = 4;
        recent.progress.grammar_accuracy = 0.8;
        recent.last_interaction_at = Some(now - Duration::days(1));

        let mut stale = User::new("b", "B");
        stale.set_tier("intermediate").unwrap();
        stale.progress.practice_sessions = 3;
        stale.progress.grammar_accuracy = 0.4;
        stale.last_interaction_at = Some(now - Duration::days(30));

        let never = User::new("c", "C");

        let stats = UserStatistics::from_users(&[recent, stale, never], now);
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.active_users_last_week, 1);
        assert_eq!(stats.tier_distribution.beginner, 2);
        assert_eq!(stats.tier_distribution.intermediate, 1);
        assert_relative_eq!(stats.average_lessons_completed, 4.0 / 3.0);
        assert_relative_eq!(stats.average_practice_sessions, 1.0);
        assert_relative_eq!(stats.average_grammar_accuracy, 0.4, epsilon = 1e-12);
    }
}
