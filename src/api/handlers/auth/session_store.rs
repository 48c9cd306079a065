//! Persistent session records and their maintenance.
//!
//! A session row holds an opaque JSON payload ([`SessionData`]) and an expiry.
//! The owning user id is also written to its own indexed column so per-user
//! operations (invalidate, count) never scan or decode every payload.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info_span};

/// Payload serialized into `sessions.data`. Timestamps are epoch milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub user_id: i64,
    pub created_at: i64,
    pub last_activity: i64,
}

impl SessionData {
    #[must_use]
    pub fn new(user_id: i64, now: DateTime<Utc>) -> Self {
        let now = now.timestamp_millis();
        Self {
            user_id,
            created_at: now,
            last_activity: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    /// SHA-256 of the raw cookie token, never the token itself.
    pub id: String,
    pub data: SessionData,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, record: &SessionRecord) -> Result<()>;

    /// Load a record whether or not it has expired; callers decide.
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>>;

    /// Store a new payload and push the expiry forward.
    async fn touch(&self, id: &str, data: &SessionData, expires_at: DateTime<Utc>) -> Result<()>;

    async fn destroy(&self, id: &str) -> Result<()>;

    /// Delete every expired record, returning how many were removed.
    async fn sweep_expired(&self) -> Result<u64>;

    /// Delete every record owned by `user_id`, returning how many were removed.
    async fn invalidate_user_sessions(&self, user_id: i64) -> Result<u64>;

    /// Number of non-expired records owned by `user_id`.
    async fn count_user_active_sessions(&self, user_id: i64) -> Result<u64>;
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, record: &SessionRecord) -> Result<()> {
        let data = serde_json::to_string(&record.data).context("failed to encode session")?;
        let query = r"
            INSERT INTO sessions (id, user_id, data, expires_at)
            VALUES ($1, $2, $3, $4)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&record.id)
            .bind(record.data.user_id)
            .bind(data)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>> {
        let query = "SELECT id, data, expires_at FROM sessions WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load session")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row.get("data");
        let data: SessionData =
            serde_json::from_str(&data).context("failed to decode session payload")?;
        Ok(Some(SessionRecord {
            id: row.get("id"),
            data,
            expires_at: row.get("expires_at"),
        }))
    }

    async fn touch(&self, id: &str, data: &SessionData, expires_at: DateTime<Utc>) -> Result<()> {
        let data = serde_json::to_string(data).context("failed to encode session")?;
        let query = "UPDATE sessions SET data = $2, expires_at = $3 WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(data)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to refresh session")?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let query = "DELETE FROM sessions WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE expires_at <= NOW()";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to sweep expired sessions")?;
        Ok(result.rows_affected())
    }

    async fn invalidate_user_sessions(&self, user_id: i64) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to invalidate user sessions")?;
        Ok(result.rows_affected())
    }

    async fn count_user_active_sessions(&self, user_id: i64) -> Result<u64> {
        let query = "SELECT COUNT(*) AS count FROM sessions WHERE user_id = $1 AND expires_at > NOW()";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count user sessions")?;
        let count: i64 = row.get("count");
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// Periodically delete expired sessions so the table does not grow unbounded.
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match store.sweep_expired().await {
                Ok(0) => {}
                Ok(count) => debug!("Removed {count} expired session(s)"),
                Err(err) => error!("session sweep failed: {err:#}"),
            }

            sleep(period).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::memory::MemorySessionStore;
    use chrono::Duration as ChronoDuration;

    fn record(id: &str, user_id: i64, expires_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id: id.to_string(),
            data: SessionData::new(user_id, Utc::now()),
            expires_at,
        }
    }

    #[test]
    fn session_data_serializes_camel_case() -> Result<()> {
        let data = SessionData {
            user_id: 7,
            created_at: 1,
            last_activity: 2,
        };
        let json = serde_json::to_value(data)?;
        assert_eq!(
            json,
            serde_json::json!({ "userId": 7, "createdAt": 1, "lastActivity": 2 })
        );
        Ok(())
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        assert!(record("a", 1, now).is_expired(now));
        assert!(!record("a", 1, now + ChronoDuration::seconds(1)).is_expired(now));
    }

    #[tokio::test]
    async fn invalidate_then_count_is_zero() -> Result<()> {
        let store = MemorySessionStore::default();
        let later = Utc::now() + ChronoDuration::minutes(45);
        store.create(&record("a", 1, later)).await?;
        store.create(&record("b", 1, later)).await?;
        store.create(&record("c", 2, later)).await?;

        assert_eq!(store.count_user_active_sessions(1).await?, 2);
        assert_eq!(store.invalidate_user_sessions(1).await?, 2);
        assert_eq!(store.count_user_active_sessions(1).await?, 0);
        assert_eq!(store.count_user_active_sessions(2).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_records() -> Result<()> {
        let store = MemorySessionStore::default();
        let now = Utc::now();
        store.create(&record("old", 1, now - ChronoDuration::minutes(1))).await?;
        store.create(&record("live", 1, now + ChronoDuration::minutes(1))).await?;

        assert_eq!(store.count_user_active_sessions(1).await?, 1);
        assert_eq!(store.sweep_expired().await?, 1);
        assert!(store.load("old").await?.is_none());
        assert!(store.load("live").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn sweeper_task_cleans_in_background() -> Result<()> {
        let store = Arc::new(MemorySessionStore::default());
        store
            .create(&record("old", 1, Utc::now() - ChronoDuration::minutes(1)))
            .await?;

        let shared: Arc<dyn SessionStore> = store.clone();
        let handle = spawn_session_sweeper(shared, Duration::from_millis(10));
        for _ in 0..50 {
            if store.load("old").await?.is_none() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(store.load("old").await?.is_none());
        Ok(())
    }
}
