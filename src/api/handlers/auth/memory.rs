//! In-memory stores used by unit and router tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, time::Duration};
use tokio::sync::Mutex;

use super::{
    permissions::{FranchiseUnit, OrgDirectory, Scope},
    session_store::{SessionData, SessionRecord, SessionStore},
    storage::{FailedLogin, PasswordUpdate, UserRecord, UserRepository},
};

/// Active center-level employee with an empty password hash.
pub(crate) fn user(id: i64, username: &str, role: &str, level: &str) -> UserRecord {
    UserRecord {
        id,
        username: username.to_string(),
        email: format!("{username}@everglass.test"),
        first_name: "Jean".to_string(),
        last_name: "Dupont".to_string(),
        phone: None,
        password_hash: String::new(),
        role: role.to_string(),
        level: level.to_string(),
        scope: Scope::default(),
        is_active: true,
        must_change_password: false,
        password_reset_at: None,
        failed_login_attempts: 0,
        locked_until: None,
        hired_at: Utc::now(),
        last_login_at: None,
    }
}

#[derive(Default)]
pub(crate) struct MemoryUserRepository {
    users: Mutex<HashMap<i64, UserRecord>>,
}

impl MemoryUserRepository {
    pub(crate) async fn insert(&self, user: UserRecord) {
        self.users.lock().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.username == username).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn record_failed_login(
        &self,
        user_id: i64,
        max_attempts: u32,
        lockout: Duration,
    ) -> Result<FailedLogin> {
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("unknown employee {user_id}"))?;

        let attempts = u32::try_from(user.failed_login_attempts).unwrap_or(0) + 1;
        if attempts >= max_attempts {
            let until = Utc::now() + chrono::Duration::from_std(lockout)?;
            user.failed_login_attempts = 0;
            user.locked_until = Some(until);
            Ok(FailedLogin {
                attempts: 0,
                locked_until: Some(until),
            })
        } else {
            user.failed_login_attempts = i32::try_from(attempts)?;
            Ok(FailedLogin {
                attempts,
                locked_until: None,
            })
        }
    }

    async fn record_successful_login(&self, user_id: i64) -> Result<()> {
        if let Some(user) = self.users.lock().await.get_mut(&user_id) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        update: PasswordUpdate,
    ) -> Result<()> {
        if let Some(user) = self.users.lock().await.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.failed_login_attempts = 0;
            user.locked_until = None;
            match update {
                PasswordUpdate::SelfService => {
                    user.must_change_password = false;
                    user.password_reset_at = None;
                }
                PasswordUpdate::AdminReset => {
                    user.must_change_password = true;
                    user.password_reset_at = Some(Utc::now());
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    /// Force a record to expire, as if the timeout elapsed.
    pub(crate) async fn expire(&self, id: &str) {
        if let Some(record) = self.sessions.lock().await.get_mut(id) {
            record.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    pub(crate) async fn ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &SessionRecord) -> Result<()> {
        self.sessions
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.lock().await.get(id).cloned())
    }

    async fn touch(&self, id: &str, data: &SessionData, expires_at: DateTime<Utc>) -> Result<()> {
        if let Some(record) = self.sessions.lock().await.get_mut(id) {
            record.data = *data;
            record.expires_at = expires_at;
        }
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.sessions.lock().await.remove(id);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired(now));
        Ok(u64::try_from(before - sessions.len())?)
    }

    async fn invalidate_user_sessions(&self, user_id: i64) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.data.user_id != user_id);
        Ok(u64::try_from(before - sessions.len())?)
    }

    async fn count_user_active_sessions(&self, user_id: i64) -> Result<u64> {
        let now = Utc::now();
        let sessions = self.sessions.lock().await;
        let count = sessions
            .values()
            .filter(|record| record.data.user_id == user_id && !record.is_expired(now))
            .count();
        Ok(u64::try_from(count)?)
    }
}

/// Session store whose backend is down: every call fails.
pub(crate) struct UnavailableSessionStore;

#[async_trait]
impl SessionStore for UnavailableSessionStore {
    async fn create(&self, _record: &SessionRecord) -> Result<()> {
        Err(anyhow!("db down"))
    }

    async fn load(&self, _id: &str) -> Result<Option<SessionRecord>> {
        Err(anyhow!("db down"))
    }

    async fn touch(&self, _id: &str, _data: &SessionData, _expires_at: DateTime<Utc>) -> Result<()> {
        Err(anyhow!("db down"))
    }

    async fn destroy(&self, _id: &str) -> Result<()> {
        Err(anyhow!("db down"))
    }

    async fn sweep_expired(&self) -> Result<u64> {
        Err(anyhow!("db down"))
    }

    async fn invalidate_user_sessions(&self, _user_id: i64) -> Result<u64> {
        Err(anyhow!("db down"))
    }

    async fn count_user_active_sessions(&self, _user_id: i64) -> Result<u64> {
        Err(anyhow!("db down"))
    }
}

#[derive(Default)]
pub(crate) struct MemoryDirectory {
    pub(crate) franchises: Vec<FranchiseUnit>,
}

#[async_trait]
impl OrgDirectory for MemoryDirectory {
    async fn franchises(&self) -> Result<Vec<FranchiseUnit>> {
        Ok(self.franchises.clone())
    }
}
