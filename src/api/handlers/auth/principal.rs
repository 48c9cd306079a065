//! Authenticated principal and the helpers handlers use to authorize it.
//!
//! The session middleware resolves the cookie into a [`Principal`] and stores
//! it in the request extensions; handlers extract it with
//! `Extension<Principal>` and derive permissions on demand.

use crate::api::error::{ApiError, PasswordChangeReason};

use super::{
    permissions::{Level, Permissions, Role, derive_permissions},
    session_store::SessionRecord,
    state::AuthState,
    storage::UserRecord,
    types::UserView,
};

/// Authenticated employee context derived from the session cookie.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: UserRecord,
    pub role: Role,
    pub level: Level,
    pub session: SessionRecord,
}

impl Principal {
    #[must_use]
    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    #[must_use]
    pub fn view(&self) -> UserView {
        UserView::new(&self.user, self.role, self.level)
    }

    /// `Some` while the employee still has to replace their password.
    #[must_use]
    pub fn pending_password_change(&self) -> Option<PasswordChangeReason> {
        password_change_reason(&self.user)
    }

    /// Permissions against the current organization tree.
    pub async fn permissions(&self, state: &AuthState) -> Result<Permissions, ApiError> {
        let franchises = state.directory().franchises().await?;
        Ok(derive_permissions(
            self.role,
            self.level,
            self.user.scope,
            &franchises,
        ))
    }
}

/// Parse the stored role and level strings.
pub(super) fn identity(user: &UserRecord) -> Result<(Role, Level), ApiError> {
    Ok((user.role.parse()?, user.level.parse()?))
}

pub(super) fn password_change_reason(user: &UserRecord) -> Option<PasswordChangeReason> {
    if !user.must_change_password {
        return None;
    }
    Some(if user.password_reset_at.is_some() {
        PasswordChangeReason::AdminReset
    } else {
        PasswordChangeReason::FirstLogin
    })
}
