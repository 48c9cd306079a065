//! Database helpers for employee accounts and the organization tree.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::{collections::BTreeMap, time::Duration};
use tracing::{Instrument, info_span};

use super::permissions::{FranchiseUnit, OrgDirectory, Scope};

/// Employee row as stored. Role and level stay raw strings until parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub level: String,
    pub scope: Scope,
    pub is_active: bool,
    pub must_change_password: bool,
    pub password_reset_at: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub hired_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Counter state after a failed attempt was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailedLogin {
    /// Failures so far; reset to 0 when this attempt triggered a lockout.
    pub attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Who is setting the new password, which decides the must-change flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordUpdate {
    /// The employee chose it: clears the must-change flag.
    SelfService,
    /// An administrator set it: the employee must change it at next login.
    AdminReset,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>>;

    /// Atomically count one failed attempt. When the counter reaches
    /// `max_attempts`, store `now + lockout` and reset the counter.
    async fn record_failed_login(
        &self,
        user_id: i64,
        max_attempts: u32,
        lockout: Duration,
    ) -> Result<FailedLogin>;

    /// Clear the counter and lockout and stamp the last login.
    async fn record_successful_login(&self, user_id: i64) -> Result<()>;

    /// Store a new hash. Counter and lockout are cleared as well.
    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        update: PasswordUpdate,
    ) -> Result<()>;
}

const USER_COLUMNS: &str = r"
    id, username, email, first_name, last_name, phone, password_hash, role, level,
    site_id, franchise_id, center_id, is_active, must_change_password,
    password_reset_at, failed_login_attempts, locked_until, hired_at, last_login_at
";

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone: row.get("phone"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        level: row.get("level"),
        scope: Scope {
            site_id: row.get("site_id"),
            franchise_id: row.get("franchise_id"),
            center_id: row.get("center_id"),
        },
        is_active: row.get("is_active"),
        must_change_password: row.get("must_change_password"),
        password_reset_at: row.get("password_reset_at"),
        failed_login_attempts: row.get("failed_login_attempts"),
        locked_until: row.get("locked_until"),
        hired_at: row.get("hired_at"),
        last_login_at: row.get("last_login_at"),
    }
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, bind: UserKey<'_>) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM employees WHERE {filter} = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let query = sqlx::query(&query);
        let query = match bind {
            UserKey::Id(id) => query.bind(id),
            UserKey::Username(username) => query.bind(username),
        };
        let row = query
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup employee")?;

        Ok(row.as_ref().map(user_from_row))
    }
}

enum UserKey<'a> {
    Id(i64),
    Username(&'a str),
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        self.find_one("username", UserKey::Username(username)).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        self.find_one("id", UserKey::Id(id)).await
    }

    async fn record_failed_login(
        &self,
        user_id: i64,
        max_attempts: u32,
        lockout: Duration,
    ) -> Result<FailedLogin> {
        // One statement so concurrent failures cannot lose increments.
        let query = r"
            UPDATE employees
            SET failed_login_attempts = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN 0
                    ELSE failed_login_attempts + 1
                END,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $2
                        THEN NOW() + ($3 * INTERVAL '1 second')
                    ELSE locked_until
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let lockout_seconds = i64::try_from(lockout.as_secs()).unwrap_or(i64::MAX);
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
            .bind(lockout_seconds)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to record failed login")?;

        let attempts: i32 = row.get("failed_login_attempts");
        let locked_until: Option<DateTime<Utc>> = row.get("locked_until");
        Ok(FailedLogin {
            attempts: u32::try_from(attempts).unwrap_or(0),
            // Only a reset counter means this attempt set the lock.
            locked_until: locked_until.filter(|_| attempts == 0),
        })
    }

    async fn record_successful_login(&self, user_id: i64) -> Result<()> {
        let query = r"
            UPDATE employees
            SET failed_login_attempts = 0,
                locked_until = NULL,
                last_login_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record successful login")?;
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        update: PasswordUpdate,
    ) -> Result<()> {
        let query = match update {
            PasswordUpdate::SelfService => {
                r"
                UPDATE employees
                SET password_hash = $2,
                    must_change_password = FALSE,
                    password_reset_at = NULL,
                    failed_login_attempts = 0,
                    locked_until = NULL,
                    updated_at = NOW()
                WHERE id = $1
                "
            }
            PasswordUpdate::AdminReset => {
                r"
                UPDATE employees
                SET password_hash = $2,
                    must_change_password = TRUE,
                    password_reset_at = NOW(),
                    failed_login_attempts = 0,
                    locked_until = NULL,
                    updated_at = NOW()
                WHERE id = $1
                "
            }
        };
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password")?;
        Ok(())
    }
}

pub struct PgOrgDirectory {
    pool: PgPool,
}

impl PgOrgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrgDirectory for PgOrgDirectory {
    async fn franchises(&self) -> Result<Vec<FranchiseUnit>> {
        let query = r"
            SELECT f.id AS franchise_id, c.id AS center_id
            FROM franchises f
            LEFT JOIN centers c ON c.franchise_id = f.id
            ORDER BY f.id, c.id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load organization tree")?;

        let mut tree: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for row in rows {
            let centers = tree.entry(row.get("franchise_id")).or_default();
            if let Some(center_id) = row.get::<Option<i64>, _>("center_id") {
                centers.push(center_id);
            }
        }

        Ok(tree
            .into_iter()
            .map(|(id, center_ids)| FranchiseUnit { id, center_ids })
            .collect())
    }
}
