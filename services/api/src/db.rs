//! Data Access Layer
//!
//! PostgreSQL implementation of the learner store. Queries are built at
//! runtime with `sqlx::query_as` so the crate compiles without a live database.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use std::collections::BTreeSet;
use uuid::Uuid;
use verba_core::store::{TierDistribution, UserStatistics, UserStore};
use verba_core::user::{ConversationHistory, ProficiencyTier, Progress, User};

const USER_COLUMNS: &str = "id, external_id, display_name, tier, vocabulary_mastered, \
lessons_completed, practice_sessions, pronunciation_score, grammar_accuracy, completed_topics, \
conversation_history, last_active_at, created_at, last_interaction_at";

/// A `users` row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub external_id: String,
    pub display_name: String,
    pub tier: String,
    pub vocabulary_mastered: i64,
    pub lessons_completed: i64,
    pub practice_sessions: i64,
    pub pronunciation_score: f64,
    pub grammar_accuracy: f64,
    pub completed_topics: Json<BTreeSet<String>>,
    pub conversation_history: Json<ConversationHistory>,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

fn counter(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        let tier: ProficiencyTier = row
            .tier
            .parse()
            .map_err(|e| anyhow!("user {} has a corrupt tier: {}", row.id, e))?;
        Ok(User {
            id: row.id,
            external_id: row.external_id,
            display_name: row.display_name,
            tier,
            progress: Progress {
                vocabulary_mastered: counter(row.vocabulary_mastered),
                lessons_completed: counter(row.lessons_completed),
                practice_sessions: counter(row.practice_sessions),
                pronunciation_score: row.pronunciation_score,
                grammar_accuracy: row.grammar_accuracy,
                completed_topics: row.completed_topics.0,
                last_active_at: row.last_active_at,
            },
            history: row.conversation_history.0,
            created_at: row.created_at,
            last_interaction_at: row.last_interaction_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatisticsRow {
    total_users: i64,
    active_users_last_week: i64,
    beginner: i64,
    intermediate: i64,
    advanced: i64,
    average_lessons_completed: f64,
    average_practice_sessions: f64,
    average_pronunciation_score: f64,
    average_grammar_accuracy: f64,
}

impl From<StatisticsRow> for UserStatistics {
    fn from(row: StatisticsRow) -> Self {
        let count = |v: i64| u64::try_from(v).unwrap_or(0);
        UserStatistics {
            total_users: count(row.total_users),
            active_users_last_week: count(row.active_users_last_week),
            tier_distribution: TierDistribution {
                beginner: count(row.beginner),
                intermediate: count(row.intermediate),
                advanced: count(row.advanced),
            },
            average_lessons_completed: row.average_lessons_completed,
            average_practice_sessions: row.average_practice_sessions,
            average_pronunciation_score: row.average_pronunciation_score,
            average_grammar_accuracy: row.average_grammar_accuracy,
        }
    }
}

fn into_users(rows: Vec<UserRow>) -> Result<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

/// Learner store backed by a PostgreSQL `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to the database")?;
        Ok(Self::new(pool))
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE external_id = $1",
            USER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn save(&self, user: &User) -> Result<User> {
        let p = &user.progress;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                external_id = EXCLUDED.external_id,
                display_name = EXCLUDED.display_name,
                tier = EXCLUDED.tier,
                vocabulary_mastered = EXCLUDED.vocabulary_mastered,
                lessons_completed = EXCLUDED.lessons_completed,
                practice_sessions = EXCLUDED.practice_sessions,
                pronunciation_score = EXCLUDED.pronunciation_score,
                grammar_accuracy = EXCLUDED.grammar_accuracy,
                completed_topics = EXCLUDED.completed_topics,
                conversation_history = EXCLUDED.conversation_history,
                last_active_at = EXCLUDED.last_active_at,
                last_interaction_at = EXCLUDED.last_interaction_at
            RETURNING {columns}
            "#,
            columns = USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.external_id)
        .bind(&user.display_name)
        .bind(user.tier.as_str())
        .bind(i64::from(p.vocabulary_mastered))
        .bind(i64::from(p.lessons_completed))
        .bind(i64::from(p.practice_sessions))
        .bind(p.pronunciation_score)
        .bind(p.grammar_accuracy)
        .bind(Json(&p.completed_topics))
        .bind(Json(&user.history))
        .bind(p.last_active_at)
        .bind(user.created_at)
        .bind(user.last_interaction_at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to save user {}", user.id))?;
        User::try_from(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        into_users(rows)
    }

    async fn list_by_tier(&self, tier: ProficiencyTier) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE tier = $1 ORDER BY created_at ASC",
            USER_COLUMNS
        ))
        .bind(tier.as_str())
        .fetch_all(&self.pool)
        .await?;
        into_users(rows)
    }

    async fn statistics(&self) -> Result<UserStatistics> {
        let row = sqlx::query_as::<_, StatisticsRow>(
            r#"
            SELECT
                COUNT(*) AS total_users,
                COUNT(*) FILTER (WHERE last_interaction_at > NOW() - INTERVAL '7 days') AS active_users_last_week,
                COUNT(*) FILTER (WHERE tier = 'beginner') AS beginner,
                COUNT(*) FILTER (WHERE tier = 'intermediate') AS intermediate,
                COUNT(*) FILTER (WHERE tier = 'advanced') AS advanced,
                COALESCE(AVG(lessons_completed)::FLOAT8, 0) AS average_lessons_completed,
                COALESCE(AVG(practice_sessions)::FLOAT8, 0) AS average_practice_sessions,
                COALESCE(AVG(pronunciation_score), 0) AS average_pronunciation_score,
                COALESCE(AVG(grammar_accuracy), 0) AS average_grammar_accuracy
            FROM users
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verba_core::user::Role;

    fn row_for(user: &User) -> UserRow {
        UserRow {
            id: user.id,
            external_id: user.external_id.clone(),
            display_name: user.display_name.clone(),
            tier: user.tier.as_str().to_string(),
            vocabulary_mastered: user.progress.vocabulary_mastered.into(),
            lessons_completed: user.progress.lessons_completed.into(),
            practice_sessions: user.progress.practice_sessions.into(),
            pronunciation_score: user.progress.pronunciation_score,
            grammar_accuracy: user.progress.grammar_accuracy,
            completed_topics: Json(user.progress.completed_topics.clone()),
            conversation_history: Json(user.history.clone()),
            last_active_at: user.progress.last_active_at,
            created_at: user.created_at,
            last_interaction_at: user.last_interaction_at,
        }
    }

    #[test]
    fn row_converts_to_user() {
        let mut user = User::new("discord-1", "Ana");
        user.set_tier("intermediate").unwrap();
        user.progress.lessons_completed = 12;
        user.progress.completed_topics.insert("travel".into());
        user.record_turn(Role::User, "hello");
        user.touch();

        let converted = User::try_from(row_for(&user)).unwrap();
        assert_eq!(converted, user);
    }

    #[test]
    fn corrupt_tier_is_rejected() {
        let user = User::new("discord-1", "Ana");
        let mut row = row_for(&user);
        row.tier = "expert".into();
        assert!(User::try_from(row).is_err());
    }

    #[test]
    fn out_of_range_counters_are_clamped() {
        assert_eq!(counter(-3), 0);
        assert_eq!(counter(7), 7);
        assert_eq!(counter(i64::MAX), u32::MAX);
    }

    #[test]
    fn statistics_row_maps_to_statistics() {
        let stats = UserStatistics::from(StatisticsRow {
            total_users: 3,
            active_users_last_week: 1,
            beginner: 2,
            intermediate: 1,
            advanced: 0,
            average_lessons_completed: 4.0,
            average_practice_sessions: 1.5,
            average_pronunciation_score: 0.6,
            average_grammar_accuracy: 0.7,
        });
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.tier_distribution.beginner, 2);
        assert_eq!(stats.average_practice_sessions, 1.5);
    }
}
