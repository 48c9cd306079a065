//! Authentication workflow: login throttling, session lifecycle and password
//! changes.
//!
//! Flow Overview (login):
//! 1) Unknown username: `INVALID_CREDENTIALS`, nothing is counted.
//! 2) Stored lock still in the future: `ACCOUNT_LOCKED`, password ignored.
//! 3) Deactivated account: `ACCOUNT_INACTIVE`, password ignored.
//! 4) Wrong password: the counter is bumped in one atomic update. Reaching the
//!    threshold stores the lock and resets the counter.
//! 5) Success: counters cleared, last login stamped, session limit enforced and
//!    a session created. A pending password change is reported after the
//!    session exists so the client can still call change-password.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use crate::api::error::{ApiError, PasswordChangeReason, ValidationError};

use super::{
    permissions::{Level, Role, ensure_center_access, ensure_franchise_access},
    principal::{Principal, identity, password_change_reason},
    session_store::{SessionData, SessionRecord},
    state::AuthState,
    storage::PasswordUpdate,
    types::{
        ChangePasswordRequest, LoginRequest, MeResponse, ResetPasswordRequest, SessionInfo,
        UserView,
    },
    utils::{
        generate_session_token, hash_password, session_id_from_token, sign_token,
        verify_password, verify_signed_token,
    },
    validation::{mask_email, validate_password},
};

/// A freshly created session and the signed cookie value that refers to it.
#[derive(Debug)]
pub struct IssuedSession {
    pub cookie_value: String,
    pub record: SessionRecord,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub session: IssuedSession,
    pub user: UserView,
    /// Set when the password must be replaced before using the API.
    pub password_change: Option<PasswordChangeReason>,
}

fn expiry_from(state: &AuthState, now: DateTime<Utc>) -> DateTime<Utc> {
    now + ChronoDuration::minutes(i64::from(state.config().session_timeout_minutes()))
}

async fn issue_session(state: &AuthState, user_id: i64) -> Result<IssuedSession, ApiError> {
    let now = Utc::now();
    let token = generate_session_token()?;
    let record = SessionRecord {
        id: session_id_from_token(&token),
        data: SessionData::new(user_id, now),
        expires_at: expiry_from(state, now),
    };
    state.sessions().create(&record).await?;
    let cookie_value = sign_token(&token, state.config().session_secret())?;
    Ok(IssuedSession {
        cookie_value,
        record,
    })
}

/// Resolve a signed cookie value to a session id.
pub(super) fn session_id_from_cookie(state: &AuthState, cookie_value: &str) -> Option<String> {
    verify_signed_token(cookie_value, state.config().session_secret())
        .map(|token| session_id_from_token(&token))
}

pub async fn login(state: &AuthState, request: &LoginRequest) -> Result<LoginOutcome, ApiError> {
    let mut missing = Vec::new();
    if request.username.trim().is_empty() {
        missing.push(ValidationError::new("username", "Username is required."));
    }
    if request.password.is_empty() {
        missing.push(ValidationError::new("password", "Password is required."));
    }
    if !missing.is_empty() {
        return Err(ApiError::validation(missing));
    }

    let config = state.config();
    let Some(user) = state.users().find_by_username(request.username.trim()).await? else {
        return Err(ApiError::InvalidCredentials {
            remaining_attempts: None,
        });
    };

    let now = Utc::now();
    if user.is_locked(now) {
        return Err(ApiError::AccountLocked {
            lockout_minutes: Some(config.lockout_minutes()),
            locked_until: user.locked_until,
        });
    }

    if !user.is_active {
        return Err(ApiError::AccountInactive { reason: None });
    }

    if !verify_password(&request.password, &user.password_hash).await? {
        let failed = state
            .users()
            .record_failed_login(user.id, config.max_login_attempts(), config.lockout_duration())
            .await?;

        if let Some(locked_until) = failed.locked_until {
            warn!(
                user_id = user.id,
                email = %mask_email(&user.email),
                "Account locked after repeated failed logins"
            );
            return Err(ApiError::AccountLocked {
                lockout_minutes: Some(config.lockout_minutes()),
                locked_until: Some(locked_until),
            });
        }
        return Err(ApiError::InvalidCredentials {
            remaining_attempts: Some(config.max_login_attempts().saturating_sub(failed.attempts)),
        });
    }

    let (role, level) = identity(&user)?;
    state.users().record_successful_login(user.id).await?;

    if let Some(max_sessions) = config.max_sessions() {
        let current = state.sessions().count_user_active_sessions(user.id).await?;
        if current >= u64::from(max_sessions) {
            return Err(ApiError::MaxSessionsReached {
                max_sessions,
                current_sessions: Some(u32::try_from(current).unwrap_or(u32::MAX)),
            });
        }
    }

    let session = issue_session(state, user.id).await?;
    info!(user_id = user.id, "Login succeeded");

    let mut view = UserView::new(&user, role, level);
    view.last_login_at = Some(now);
    Ok(LoginOutcome {
        session,
        user: view,
        password_change: password_change_reason(&user),
    })
}

/// Resolve a signed cookie into an authenticated principal and roll the session.
///
/// Expired sessions and sessions of deactivated employees are destroyed.
pub async fn authenticate(
    state: &AuthState,
    cookie_value: Option<&str>,
) -> Result<Principal, ApiError> {
    let session_id = cookie_value
        .and_then(|value| session_id_from_cookie(state, value))
        .ok_or(ApiError::NotAuthenticated)?;

    let Some(mut session) = state.sessions().load(&session_id).await? else {
        return Err(ApiError::NotAuthenticated);
    };

    let now = Utc::now();
    if session.is_expired(now) {
        state.sessions().destroy(&session_id).await?;
        return Err(ApiError::SessionExpired {
            inactive_minutes: Some(state.config().session_timeout_minutes()),
        });
    }

    let Some(user) = state.users().find_by_id(session.data.user_id).await? else {
        state.sessions().destroy(&session_id).await?;
        return Err(ApiError::NotAuthenticated);
    };

    if !user.is_active {
        state.sessions().destroy(&session_id).await?;
        return Err(ApiError::AccountInactive { reason: None });
    }

    let (role, level) = identity(&user)?;

    session.data.last_activity = now.timestamp_millis();
    session.expires_at = expiry_from(state, now);
    state
        .sessions()
        .touch(&session.id, &session.data, session.expires_at)
        .await?;

    Ok(Principal {
        user,
        role,
        level,
        session,
    })
}

/// Destroy the session behind a cookie, if any. Unknown cookies are ignored.
pub async fn logout(state: &AuthState, cookie_value: Option<&str>) -> Result<(), ApiError> {
    if let Some(session_id) = cookie_value.and_then(|value| session_id_from_cookie(state, value)) {
        state.sessions().destroy(&session_id).await?;
    }
    Ok(())
}

pub async fn me(state: &AuthState, principal: &Principal) -> Result<MeResponse, ApiError> {
    Ok(MeResponse {
        user: principal.view(),
        session: SessionInfo {
            created_at: principal.session.data.created_at,
            last_activity: principal.session.data.last_activity,
            expires_at: principal.session.expires_at.timestamp_millis(),
        },
        permissions: principal.permissions(state).await?,
    })
}

fn rename_field(errors: Vec<ValidationError>, field: &str) -> Vec<ValidationError> {
    errors
        .into_iter()
        .map(|error| ValidationError::new(field, error.message))
        .collect()
}

/// Change the caller's own password.
///
/// Every problem is reported in one validation error. On success all sessions
/// of the employee are dropped and a fresh one is issued to the caller.
pub async fn change_password(
    state: &AuthState,
    principal: &Principal,
    request: &ChangePasswordRequest,
) -> Result<IssuedSession, ApiError> {
    let mut errors = Vec::new();

    let current_ok = if request.current_password.is_empty() {
        errors.push(ValidationError::new(
            "currentPassword",
            "Current password is required.",
        ));
        false
    } else if verify_password(&request.current_password, &principal.user.password_hash).await? {
        true
    } else {
        errors.push(ValidationError::new(
            "currentPassword",
            "Current password is incorrect.",
        ));
        false
    };

    errors.extend(rename_field(
        validate_password(&request.new_password, state.config().password_policy()),
        "newPassword",
    ));

    if request.new_password != request.confirm_password {
        errors.push(ValidationError::new(
            "confirmPassword",
            "Passwords do not match.",
        ));
    }

    if current_ok && request.new_password == request.current_password {
        errors.push(ValidationError::new(
            "newPassword",
            "New password must be different from the current one.",
        ));
    }

    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let hash = hash_password(&request.new_password, state.config().bcrypt_cost()).await?;
    let user_id = principal.user_id();
    state
        .users()
        .update_password(user_id, &hash, PasswordUpdate::SelfService)
        .await?;
    let dropped = state.sessions().invalidate_user_sessions(user_id).await?;
    info!(user_id, dropped, "Password changed");

    issue_session(state, user_id).await
}

/// Set a new password for another employee.
///
/// Requires the manage-employees capability, a role at least as high as the
/// target's, and the target inside the caller's perimeter. The target must
/// change the password at next login and loses every open session.
pub async fn reset_password(
    state: &AuthState,
    principal: &Principal,
    request: &ResetPasswordRequest,
) -> Result<(), ApiError> {
    let permissions = principal.permissions(state).await?;
    if !permissions.can_manage_employees {
        return Err(ApiError::InsufficientRole {
            required: vec![Role::Admin, Role::Director, Role::Manager],
            current: Some(principal.role),
        });
    }

    let errors = rename_field(
        validate_password(&request.new_password, state.config().password_policy()),
        "newPassword",
    );
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let Some(target) = state.users().find_by_id(request.employee_id).await? else {
        return Err(ApiError::not_found("Employee"));
    };

    let forbidden = || ApiError::Forbidden {
        action: Some("reset the password".to_string()),
        resource: Some(format!("employee #{}", target.id)),
    };

    let (target_role, _) = identity(&target)?;
    if target_role.rank() > principal.role.rank() {
        return Err(forbidden());
    }

    if principal.level != Level::Headquarters {
        match (target.scope.center_id, target.scope.franchise_id) {
            (Some(center_id), _) => {
                ensure_center_access(&permissions, center_id)?;
            }
            (None, Some(franchise_id)) => {
                ensure_franchise_access(&permissions, franchise_id)?;
            }
            (None, None) => return Err(forbidden()),
        }
    }

    let hash = hash_password(&request.new_password, state.config().bcrypt_cost()).await?;
    state
        .users()
        .update_password(target.id, &hash, PasswordUpdate::AdminReset)
        .await?;
    let dropped = state.sessions().invalidate_user_sessions(target.id).await?;
    info!(
        user_id = principal.user_id(),
        target_id = target.id,
        dropped,
        "Password reset by administrator"
    );
    Ok(())
}
