//! Postgres-backed storage and client listing tests.
//!
//! They run against `EVERGLASS_TEST_DATABASE_URL` inside a throwaway schema and
//! are skipped when the variable is unset.

use anyhow::{Context, Result};
use axum::extract::Extension;
use chrono::{Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use sqlx::{
    Connection, PgConnection, PgPool, Row,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use std::{sync::Arc, time::Duration};
use ulid::Ulid;

use crate::api::handlers::clients::list_clients;

use super::{
    memory::user,
    permissions::{FranchiseUnit, Level, OrgDirectory, Role, Scope},
    principal::Principal,
    session_store::{PgSessionStore, SessionData, SessionRecord, SessionStore},
    state::{AuthConfig, AuthState, Environment},
    storage::{PasswordUpdate, PgOrgDirectory, PgUserRepository, UserRepository},
};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

struct TestDb {
    url: String,
    schema: String,
    pool: PgPool,
}

impl TestDb {
    async fn new() -> Result<Option<Self>> {
        let Ok(url) = std::env::var("EVERGLASS_TEST_DATABASE_URL") else {
            eprintln!("Skipping integration test: EVERGLASS_TEST_DATABASE_URL not set");
            return Ok(None);
        };

        let schema = format!("everglass_test_{}", Ulid::new().to_string().to_lowercase());
        let mut connection = PgConnection::connect(&url)
            .await
            .context("failed to connect for schema setup")?;
        sqlx::query(&format!("CREATE SCHEMA {schema}"))
            .execute(&mut connection)
            .await
            .context("failed to create test schema")?;

        let options: PgConnectOptions = url.parse()?;
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options.options([("search_path", schema.as_str())]))
            .await
            .context("failed to connect test pool")?;

        for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
        }

        Ok(Some(Self { url, schema, pool }))
    }

    async fn teardown(self) -> Result<()> {
        self.pool.close().await;
        let mut connection = PgConnection::connect(&self.url).await?;
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&mut connection)
            .await?;
        Ok(())
    }

    async fn insert_employee(&self, username: &str) -> Result<i64> {
        let row = sqlx::query(
            r"
            INSERT INTO employees (username, email, first_name, last_name, password_hash, role, level)
            VALUES ($1, $2, 'Jean', 'Dupont', 'hash', 'MANAGER', 'HEADQUARTERS')
            RETURNING id
            ",
        )
        .bind(username)
        .bind(format!("{username}@everglass.test"))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[test]
fn split_sql_statements_skips_comments() {
    let statements = split_sql_statements("-- note\nCREATE TABLE a (id INT);\n\nCREATE INDEX b\n  ON a (id);\n");
    assert_eq!(
        statements,
        vec!["CREATE TABLE a (id INT);", "CREATE INDEX b\n  ON a (id);"]
    );
}

#[tokio::test]
async fn failed_logins_lock_then_success_clears() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };
    let users = PgUserRepository::new(db.pool.clone());
    let id = db.insert_employee("jdupont").await?;

    let lockout = Duration::from_secs(15 * 60);
    for expected in 1..5 {
        let failed = users.record_failed_login(id, 5, lockout).await?;
        assert_eq!(failed.attempts, expected);
        assert!(failed.locked_until.is_none());
    }
    let failed = users.record_failed_login(id, 5, lockout).await?;
    assert_eq!(failed.attempts, 0);
    assert!(failed.locked_until.is_some_and(|until| until > Utc::now()));

    let Some(user) = users.find_by_username("jdupont").await? else {
        anyhow::bail!("employee not found");
    };
    assert!(user.is_locked(Utc::now()));
    assert_eq!(user.failed_login_attempts, 0);

    users.record_successful_login(id).await?;
    let Some(user) = users.find_by_id(id).await? else {
        anyhow::bail!("employee not found");
    };
    assert!(!user.is_locked(Utc::now()));
    assert!(user.last_login_at.is_some());

    users
        .update_password(id, "new-hash", PasswordUpdate::AdminReset)
        .await?;
    let Some(user) = users.find_by_id(id).await? else {
        anyhow::bail!("employee not found");
    };
    assert_eq!(user.password_hash, "new-hash");
    assert!(user.must_change_password);
    assert!(user.password_reset_at.is_some());

    db.teardown().await
}

#[tokio::test]
async fn session_store_lifecycle() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };
    let store = PgSessionStore::new(db.pool.clone());
    let user_id = db.insert_employee("jdupont").await?;
    let now = Utc::now();

    let live = SessionRecord {
        id: "live".to_string(),
        data: SessionData::new(user_id, now),
        expires_at: now + ChronoDuration::minutes(45),
    };
    let stale = SessionRecord {
        id: "stale".to_string(),
        data: SessionData::new(user_id, now),
        expires_at: now - ChronoDuration::minutes(1),
    };
    store.create(&live).await?;
    store.create(&stale).await?;

    assert_eq!(store.count_user_active_sessions(user_id).await?, 1);
    assert_eq!(store.load("live").await?.map(|record| record.data), Some(live.data));

    let mut data = live.data;
    data.last_activity += 1_000;
    store
        .touch("live", &data, now + ChronoDuration::minutes(90))
        .await?;
    let Some(touched) = store.load("live").await? else {
        anyhow::bail!("session not found");
    };
    assert_eq!(touched.data.last_activity, data.last_activity);
    assert!(touched.expires_at > live.expires_at);

    assert_eq!(store.sweep_expired().await?, 1);
    assert!(store.load("stale").await?.is_none());

    assert_eq!(store.invalidate_user_sessions(user_id).await?, 1);
    assert_eq!(store.count_user_active_sessions(user_id).await?, 0);

    db.teardown().await
}

#[tokio::test]
async fn sessions_belong_to_an_employee() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };
    let store = PgSessionStore::new(db.pool.clone());
    let now = Utc::now();
    let expires_at = now + ChronoDuration::minutes(45);

    let orphan = SessionRecord {
        id: "orphan".to_string(),
        data: SessionData::new(i64::MAX, now),
        expires_at,
    };
    assert!(store.create(&orphan).await.is_err());

    let user_id = db.insert_employee("jdupont").await?;
    let owned = SessionRecord {
        id: "owned".to_string(),
        data: SessionData::new(user_id, now),
        expires_at,
    };
    store.create(&owned).await?;

    sqlx::query("DELETE FROM employees WHERE id = $1")
        .bind(user_id)
        .execute(&db.pool)
        .await?;
    assert!(store.load("owned").await?.is_none());

    db.teardown().await
}

#[tokio::test]
async fn org_directory_groups_centers() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };
    let franchise: i64 = sqlx::query("INSERT INTO franchises (name) VALUES ('Nord') RETURNING id")
        .fetch_one(&db.pool)
        .await?
        .get("id");
    let empty: i64 = sqlx::query("INSERT INTO franchises (name) VALUES ('Sud') RETURNING id")
        .fetch_one(&db.pool)
        .await?
        .get("id");
    let mut centers = Vec::new();
    for name in ["Lille", "Arras"] {
        let id: i64 = sqlx::query("INSERT INTO centers (franchise_id, name) VALUES ($1, $2) RETURNING id")
            .bind(franchise)
            .bind(name)
            .fetch_one(&db.pool)
            .await?
            .get("id");
        centers.push(id);
    }

    let tree = PgOrgDirectory::new(db.pool.clone()).franchises().await?;
    assert_eq!(
        tree,
        vec![
            FranchiseUnit {
                id: franchise,
                center_ids: centers,
            },
            FranchiseUnit {
                id: empty,
                center_ids: Vec::new(),
            },
        ]
    );

    db.teardown().await
}

async fn insert_center(db: &TestDb, franchise: &str, center: &str) -> Result<(i64, i64)> {
    let franchise_id: i64 = sqlx::query("INSERT INTO franchises (name) VALUES ($1) RETURNING id")
        .bind(franchise)
        .fetch_one(&db.pool)
        .await?
        .get("id");
    let center_id: i64 =
        sqlx::query("INSERT INTO centers (franchise_id, name) VALUES ($1, $2) RETURNING id")
            .bind(franchise_id)
            .bind(center)
            .fetch_one(&db.pool)
            .await?
            .get("id");
    Ok((franchise_id, center_id))
}

fn principal(role: Role, level: Level, scope: Scope) -> Principal {
    let mut employee = user(1, "jdupont", role.as_str(), level.as_str());
    employee.scope = scope;
    let now = Utc::now();
    Principal {
        user: employee,
        role,
        level,
        session: SessionRecord {
            id: "session".to_string(),
            data: SessionData::new(1, now),
            expires_at: now + ChronoDuration::minutes(45),
        },
    }
}

#[tokio::test]
async fn clients_are_scoped_to_the_perimeter() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };
    let (north, lille) = insert_center(&db, "Nord", "Lille").await?;
    let (_, nice) = insert_center(&db, "Sud", "Nice").await?;
    for (center, name) in [(lille, "Martin"), (nice, "Bernard")] {
        sqlx::query("INSERT INTO clients (center_id, name) VALUES ($1, $2)")
            .bind(center)
            .bind(name)
            .execute(&db.pool)
            .await?;
    }

    let state = Arc::new(AuthState::new(
        AuthConfig::new(Environment::Test, SecretString::from("test-secret")),
        Arc::new(PgUserRepository::new(db.pool.clone())),
        Arc::new(PgSessionStore::new(db.pool.clone())),
        Arc::new(PgOrgDirectory::new(db.pool.clone())),
    ));
    let names = |principal: Principal| {
        let pool = db.pool.clone();
        let state = state.clone();
        async move {
            let list = list_clients(Extension(pool), Extension(state), Extension(principal))
                .await?;
            assert_eq!(list.0.count, list.0.data.len());
            Ok::<_, anyhow::Error>(
                list.0
                    .data
                    .into_iter()
                    .map(|client| client.name)
                    .collect::<Vec<_>>(),
            )
        }
    };

    let center_manager = principal(
        Role::Manager,
        Level::Center,
        Scope {
            site_id: None,
            franchise_id: Some(north),
            center_id: Some(lille),
        },
    );
    assert_eq!(names(center_manager).await?, vec!["Martin"]);

    let headquarters_admin = principal(Role::Admin, Level::Headquarters, Scope::default());
    assert_eq!(names(headquarters_admin).await?, vec!["Martin", "Bernard"]);

    db.teardown().await
}
