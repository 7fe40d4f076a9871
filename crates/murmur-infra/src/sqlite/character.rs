//! SQLite character repository implementation.
//!
//! Implements `CharacterRepository` from `murmur-core`. Replied mention ids
//! live in their own table so an update can only ever add to the set.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use murmur_core::repository::character::{AgentFilter, CharacterRepository};
use murmur_types::agent::{
    Agent, AgentId, AgentPatch, EngagementHours, EthicalFramework, PersonaProfile,
    ReplySettings, TweetSettings,
};
use murmur_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CharacterRepository`.
pub struct SqliteCharacterRepository {
    pool: DatabasePool,
}

impl SqliteCharacterRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to a domain `Agent`.
struct CharacterRow {
    id: String,
    name: String,
    active: bool,
    engagement_start: i64,
    engagement_end: i64,
    tweet_enabled: bool,
    posts_per_minute: f64,
    reply_enabled: bool,
    reply_to_mentions: bool,
    content_focus: String,
    persona: String,
    ethics: String,
    created_at: String,
    updated_at: String,
}

impl CharacterRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            active: row.try_get("active")?,
            engagement_start: row.try_get("engagement_start")?,
            engagement_end: row.try_get("engagement_end")?,
            tweet_enabled: row.try_get("tweet_enabled")?,
            posts_per_minute: row.try_get("posts_per_minute")?,
            reply_enabled: row.try_get("reply_enabled")?,
            reply_to_mentions: row.try_get("reply_to_mentions")?,
            content_focus: row.try_get("content_focus")?,
            persona: row.try_get("persona")?,
            ethics: row.try_get("ethics")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_agent(self, replied_ids: BTreeSet<String>) -> Result<Agent, RepositoryError> {
        let id = self
            .id
            .parse::<AgentId>()
            .map_err(|e| RepositoryError::Query(format!("invalid character id: {e}")))?;

        let content_focus: Vec<String> = serde_json::from_str(&self.content_focus)
            .map_err(|e| RepositoryError::Query(format!("invalid content_focus JSON: {e}")))?;
        let persona: PersonaProfile = serde_json::from_str(&self.persona)
            .map_err(|e| RepositoryError::Query(format!("invalid persona JSON: {e}")))?;
        let ethics: EthicalFramework = serde_json::from_str(&self.ethics)
            .map_err(|e| RepositoryError::Query(format!("invalid ethics JSON: {e}")))?;

        Ok(Agent {
            id,
            name: self.name,
            active: self.active,
            engagement_hours: EngagementHours::new(
                parse_hour(self.engagement_start)?,
                parse_hour(self.engagement_end)?,
            ),
            tweet_settings: TweetSettings {
                enabled: self.tweet_enabled,
                posts_per_minute: self.posts_per_minute,
            },
            reply_settings: ReplySettings {
                enabled: self.reply_enabled,
                reply_to_mentions: self.reply_to_mentions,
                replied_ids,
            },
            content_focus,
            persona,
            ethics,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_hour(value: i64) -> Result<u8, RepositoryError> {
    u8::try_from(value)
        .ok()
        .filter(|h| *h <= 23)
        .ok_or_else(|| RepositoryError::Query(format!("invalid engagement hour: {value}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

async fn load_replied_ids(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<BTreeSet<String>, RepositoryError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT tweet_id FROM replied_mentions WHERE character_id = ?")
            .bind(id)
            .fetch_all(&mut *conn)
            .await
            .map_err(query_err)?;
    Ok(rows.into_iter().map(|(tweet_id,)| tweet_id).collect())
}

async fn load_agent(
    conn: &mut SqliteConnection,
    id: &AgentId,
) -> Result<Option<Agent>, RepositoryError> {
    let id = id.to_string();
    let row = sqlx::query("SELECT * FROM characters WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_err)?;

    match row {
        Some(row) => {
            let character = CharacterRow::from_row(&row).map_err(query_err)?;
            let replied = load_replied_ids(conn, &id).await?;
            Ok(Some(character.into_agent(replied)?))
        }
        None => Ok(None),
    }
}

async fn insert_replied_ids(
    conn: &mut SqliteConnection,
    id: &str,
    ids: &BTreeSet<String>,
    at: &str,
) -> Result<(), RepositoryError> {
    for tweet_id in ids {
        sqlx::query(
            "INSERT OR IGNORE INTO replied_mentions (character_id, tweet_id, replied_at) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(tweet_id)
        .bind(at)
        .execute(&mut *conn)
        .await
        .map_err(query_err)?;
    }
    Ok(())
}

impl CharacterRepository for SqliteCharacterRepository {
    async fn create(&self, agent: &Agent) -> Result<Agent, RepositoryError> {
        let id = agent.id.to_string();
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let result = sqlx::query(
            "INSERT INTO characters (id, name, active, engagement_start, engagement_end, tweet_enabled, posts_per_minute, reply_enabled, reply_to_mentions, content_focus, persona, ethics, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&agent.name)
        .bind(agent.active)
        .bind(i64::from(agent.engagement_hours.start))
        .bind(i64::from(agent.engagement_hours.end))
        .bind(agent.tweet_settings.enabled)
        .bind(agent.tweet_settings.posts_per_minute)
        .bind(agent.reply_settings.enabled)
        .bind(agent.reply_settings.reply_to_mentions)
        .bind(to_json(&agent.content_focus)?)
        .bind(to_json(&agent.persona)?)
        .bind(to_json(&agent.ethics)?)
        .bind(format_datetime(&agent.created_at))
        .bind(format_datetime(&agent.updated_at))
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                return Err(RepositoryError::Conflict(format!(
                    "character '{}' already exists",
                    agent.name
                )));
            }
            Err(e) => return Err(query_err(e)),
        }

        insert_replied_ids(
            &mut tx,
            &id,
            &agent.reply_settings.replied_ids,
            &format_datetime(&agent.updated_at),
        )
        .await?;
        tx.commit().await.map_err(query_err)?;

        tracing::debug!(agent_id = %agent.id, name = %agent.name, "character created");
        Ok(agent.clone())
    }

    async fn get(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let mut conn = self.pool.reader.acquire().await.map_err(query_err)?;
        load_agent(&mut conn, id).await
    }

    async fn list(&self, filter: Option<AgentFilter>) -> Result<Vec<Agent>, RepositoryError> {
        let filter = filter.unwrap_or_default();
        let mut sql = String::from("SELECT * FROM characters");
        if filter.active.is_some() {
            sql.push_str(" WHERE active = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(0)));
        }

        let mut conn = self.pool.reader.acquire().await.map_err(query_err)?;
        let mut query = sqlx::query(&sql);
        if let Some(active) = filter.active {
            query = query.bind(active);
        }
        let rows = query.fetch_all(&mut *conn).await.map_err(query_err)?;

        let mut agents = Vec::with_capacity(rows.len());
        for row in &rows {
            let character = CharacterRow::from_row(row).map_err(query_err)?;
            let replied = load_replied_ids(&mut conn, &character.id).await?;
            agents.push(character.into_agent(replied)?);
        }
        Ok(agents)
    }

    async fn update(&self, id: &AgentId, patch: &AgentPatch) -> Result<Agent, RepositoryError> {
        let key = id.to_string();
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let touched = sqlx::query("UPDATE characters SET active = COALESCE(?, active), updated_at = ? WHERE id = ?")
            .bind(patch.active)
            .bind(&now)
            .bind(&key)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        if touched.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        if let Some(ids) = &patch.replied_ids {
            insert_replied_ids(&mut tx, &key, ids, &now).await?;
        }

        let agent = load_agent(&mut tx, id).await?.ok_or(RepositoryError::NotFound)?;
        tx.commit().await.map_err(query_err)?;
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use murmur_types::agent::TopicHandling;

    async fn test_repo() -> SqliteCharacterRepository {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open(dir.path()).await.unwrap();
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        SqliteCharacterRepository::new(pool)
    }

    fn make_agent(name: &str) -> Agent {
        let mut agent = Agent::new(name);
        agent.engagement_hours = EngagementHours::new(8, 22);
        agent.tweet_settings = TweetSettings {
            enabled: true,
            posts_per_minute: 1.0 / 30.0,
        };
        agent.reply_settings.enabled = true;
        agent.reply_settings.reply_to_mentions = true;
        agent.content_focus = vec!["astronomy".into(), "night sky".into()];
        agent.persona.tone = "warm".into();
        agent
            .ethics
            .sensitive_topics
            .insert("politics".into(), TopicHandling::Avoid);
        agent
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = test_repo().await;
        let mut agent = make_agent("Luna");
        agent.reply_settings.replied_ids.insert("42".into());

        repo.create(&agent).await.unwrap();
        let found = repo.get(&agent.id).await.unwrap().unwrap();

        assert_eq!(found.name, "Luna");
        assert_eq!(found.engagement_hours, EngagementHours::new(8, 22));
        assert_eq!(found.tweet_settings.interval_minutes(), Some(30));
        assert!(found.reply_settings.wants_mentions());
        assert!(found.has_replied_to("42"));
        assert_eq!(found.content_focus, agent.content_focus);
        assert_eq!(found.ethics, agent.ethics);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = test_repo().await;
        assert!(repo.get(&AgentId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let repo = test_repo().await;
        repo.create(&make_agent("Luna")).await.unwrap();
        let err = repo.create(&make_agent("Luna")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_filters_active() {
        let repo = test_repo().await;
        let mut sleeping = make_agent("Nova");
        sleeping.active = false;
        repo.create(&make_agent("Luna")).await.unwrap();
        repo.create(&sleeping).await.unwrap();

        assert_eq!(repo.list(None).await.unwrap().len(), 2);
        let active = repo.list(Some(AgentFilter::active_only())).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Luna");

        let limited = repo
            .list(Some(AgentFilter {
                limit: Some(1),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_update_active_flag() {
        let repo = test_repo().await;
        let agent = make_agent("Luna");
        repo.create(&agent).await.unwrap();

        let updated = repo.update(&agent.id, &AgentPatch::active(false)).await.unwrap();
        assert!(!updated.active);
        assert!(updated.updated_at >= agent.updated_at);
        assert!(!repo.get(&agent.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = test_repo().await;
        let err = repo
            .update(&AgentId::new(), &AgentPatch::active(true))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_stale_replied_ids_never_shrink_the_set() {
        let repo = test_repo().await;
        let agent = make_agent("Luna");
        repo.create(&agent).await.unwrap();

        let fresh = BTreeSet::from(["1".to_string(), "2".to_string()]);
        repo.update(&agent.id, &AgentPatch::replied_ids(fresh))
            .await
            .unwrap();

        // A writer holding an older snapshot only knows about "1".
        let stale = BTreeSet::from(["1".to_string(), "3".to_string()]);
        let merged = repo
            .update(&agent.id, &AgentPatch::replied_ids(stale))
            .await
            .unwrap();

        let expected: BTreeSet<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(merged.reply_settings.replied_ids, expected);
    }

    #[tokio::test]
    async fn test_concurrent_updates_union() {
        let repo = Arc::new(test_repo().await);
        let agent = make_agent("Luna");
        repo.create(&agent).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let repo = Arc::clone(&repo);
            let id = agent.id.clone();
            handles.push(tokio::spawn(async move {
                let ids = BTreeSet::from([format!("m{i}")]);
                repo.update(&id, &AgentPatch::replied_ids(ids)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = repo.get(&agent.id).await.unwrap().unwrap();
        assert_eq!(stored.reply_settings.replied_ids.len(), 10);
    }
}
