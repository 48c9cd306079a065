//! Domain error taxonomy and the JSON error envelope.
//!
//! Every variant is operational (an expected outcome reported to the caller)
//! except [`ApiError::Internal`], which wraps database or plumbing failures and
//! is logged when converted into a response.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::error;
use utoipa::ToSchema;

use super::handlers::auth::permissions::Role;

/// A single field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Why a user has to pick a new password before using the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PasswordChangeReason {
    FirstLogin,
    AdminReset,
}

impl PasswordChangeReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstLogin => "first_login",
            Self::AdminReset => "admin_reset",
        }
    }
}

/// Statistics families guarded by [`ApiError::StatsAccessDenied`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatsKind {
    Center,
    Franchise,
    Global,
    Employee,
}

impl StatsKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Franchise => "franchise",
            Self::Global => "global",
            Self::Employee => "employee",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Center => "center statistics",
            Self::Franchise => "franchise statistics",
            Self::Global => "global statistics",
            Self::Employee => "statistics for this employee",
        }
    }
}

/// Variant tag of an [`ApiError`], carrying the status/code table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCredentials,
    AccountLocked,
    AccountInactive,
    SessionExpired,
    NotAuthenticated,
    MaxSessionsReached,
    PasswordChangeRequired,
    InvalidRole,
    InvalidLevel,
    InsufficientRole,
    CenterAccessDenied,
    FranchiseAccessDenied,
    Forbidden,
    StatsAccessDenied,
    Validation,
    NotFound,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::SessionExpired | Self::NotAuthenticated => {
                StatusCode::UNAUTHORIZED
            }
            Self::AccountLocked => StatusCode::LOCKED,
            Self::MaxSessionsReached => StatusCode::TOO_MANY_REQUESTS,
            Self::AccountInactive
            | Self::PasswordChangeRequired
            | Self::InvalidRole
            | Self::InvalidLevel
            | Self::InsufficientRole
            | Self::CenterAccessDenied
            | Self::FranchiseAccessDenied
            | Self::Forbidden
            | Self::StatsAccessDenied => StatusCode::FORBIDDEN,
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::AccountInactive => "ACCOUNT_INACTIVE",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::MaxSessionsReached => "MAX_SESSIONS_REACHED",
            Self::PasswordChangeRequired => "PASSWORD_CHANGE_REQUIRED",
            Self::InvalidRole => "INVALID_ROLE",
            Self::InvalidLevel => "INVALID_LEVEL",
            Self::InsufficientRole => "INSUFFICIENT_ROLE",
            Self::CenterAccessDenied => "CENTER_ACCESS_DENIED",
            Self::FranchiseAccessDenied => "FRANCHISE_ACCESS_DENIED",
            Self::Forbidden => "FORBIDDEN",
            Self::StatsAccessDenied => "STATS_ACCESS_DENIED",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", invalid_credentials_message(.remaining_attempts))]
    InvalidCredentials { remaining_attempts: Option<u32> },

    #[error("{}", account_locked_message(.lockout_minutes, .locked_until))]
    AccountLocked {
        lockout_minutes: Option<u32>,
        locked_until: Option<DateTime<Utc>>,
    },

    #[error("{}", account_inactive_message(.reason))]
    AccountInactive { reason: Option<String> },

    #[error("{}", session_expired_message(.inactive_minutes))]
    SessionExpired { inactive_minutes: Option<u32> },

    #[error("Authentication required. Please log in.")]
    NotAuthenticated,

    #[error(
        "Limit of {max_sessions} active session(s) reached. Log out from another device to continue."
    )]
    MaxSessionsReached {
        max_sessions: u32,
        current_sessions: Option<u32>,
    },

    #[error("{}", password_change_message(.reason))]
    PasswordChangeRequired { reason: PasswordChangeReason },

    #[error("{}", unknown_value_message("Role", "role", .role))]
    InvalidRole { role: Option<String> },

    #[error("{}", unknown_value_message("Level", "hierarchical level", .level))]
    InvalidLevel { level: Option<String> },

    #[error("{}", insufficient_role_message(.required, .current))]
    InsufficientRole {
        required: Vec<Role>,
        current: Option<Role>,
    },

    #[error("{}", access_denied_message("center", .center_id, .center_name))]
    CenterAccessDenied {
        center_id: Option<i64>,
        center_name: Option<String>,
    },

    #[error("{}", access_denied_message("franchise", .franchise_id, .franchise_name))]
    FranchiseAccessDenied {
        franchise_id: Option<i64>,
        franchise_name: Option<String>,
    },

    #[error("{}", forbidden_message(.action, .resource))]
    Forbidden {
        action: Option<String>,
        resource: Option<String>,
    },

    #[error("{}", stats_denied_message(.kind))]
    StatsAccessDenied {
        kind: Option<StatsKind>,
        target_id: Option<i64>,
    },

    #[error("{}", validation_message(.0))]
    Validation(Vec<ValidationError>),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Build a validation error from every collected field error.
    #[must_use]
    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self::Validation(errors)
    }

    #[must_use]
    pub fn single_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![ValidationError::new(field, message)])
    }

    pub fn from_fields<I, F, M>(fields: I) -> Self
    where
        I: IntoIterator<Item = (F, M)>,
        F: Into<String>,
        M: Into<String>,
    {
        Self::Validation(
            fields
                .into_iter()
                .map(|(field, message)| ValidationError::new(field, message))
                .collect(),
        )
    }

    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials { .. } => ErrorKind::InvalidCredentials,
            Self::AccountLocked { .. } => ErrorKind::AccountLocked,
            Self::AccountInactive { .. } => ErrorKind::AccountInactive,
            Self::SessionExpired { .. } => ErrorKind::SessionExpired,
            Self::NotAuthenticated => ErrorKind::NotAuthenticated,
            Self::MaxSessionsReached { .. } => ErrorKind::MaxSessionsReached,
            Self::PasswordChangeRequired { .. } => ErrorKind::PasswordChangeRequired,
            Self::InvalidRole { .. } => ErrorKind::InvalidRole,
            Self::InvalidLevel { .. } => ErrorKind::InvalidLevel,
            Self::InsufficientRole { .. } => ErrorKind::InsufficientRole,
            Self::CenterAccessDenied { .. } => ErrorKind::CenterAccessDenied,
            Self::FranchiseAccessDenied { .. } => ErrorKind::FranchiseAccessDenied,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::StatsAccessDenied { .. } => ErrorKind::StatsAccessDenied,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.kind().status()
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Expected failures are reported as-is; anything else is a bug or an outage.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Structured details for the envelope, `None` when there is nothing to add.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        let mut details = Map::new();
        match self {
            Self::InvalidCredentials { remaining_attempts } => {
                insert(&mut details, "remainingAttempts", *remaining_attempts);
            }
            Self::AccountLocked {
                lockout_minutes,
                locked_until,
            } => {
                insert(&mut details, "lockoutDurationMin", *lockout_minutes);
                insert(
                    &mut details,
                    "lockedUntil",
                    locked_until.map(|until| until.to_rfc3339()),
                );
            }
            Self::AccountInactive { reason } => insert(&mut details, "reason", reason.clone()),
            Self::SessionExpired { inactive_minutes } => {
                insert(&mut details, "inactiveTimeDuration", *inactive_minutes);
            }
            Self::MaxSessionsReached {
                max_sessions,
                current_sessions,
            } => {
                insert(&mut details, "maxSessions", Some(*max_sessions));
                insert(&mut details, "currentSessions", *current_sessions);
            }
            Self::PasswordChangeRequired { reason } => {
                insert(&mut details, "reason", Some(reason.as_str()));
            }
            Self::InvalidRole { role } => insert(&mut details, "providedRole", role.clone()),
            Self::InvalidLevel { level } => insert(&mut details, "providedLevel", level.clone()),
            Self::InsufficientRole { required, current } => {
                insert(&mut details, "requiredRoles", Some(required.clone()));
                insert(&mut details, "currentRole", *current);
            }
            Self::CenterAccessDenied {
                center_id,
                center_name,
            } => {
                insert(&mut details, "centerId", *center_id);
                insert(&mut details, "centerName", center_name.clone());
            }
            Self::FranchiseAccessDenied {
                franchise_id,
                franchise_name,
            } => {
                insert(&mut details, "franchiseId", *franchise_id);
                insert(&mut details, "franchiseName", franchise_name.clone());
            }
            Self::Forbidden { action, resource } => {
                insert(&mut details, "action", action.clone());
                insert(&mut details, "resource", resource.clone());
            }
            Self::StatsAccessDenied { kind, target_id } => {
                insert(&mut details, "statsType", *kind);
                insert(&mut details, "targetId", *target_id);
            }
            Self::Validation(errors) => insert(&mut details, "errors", Some(errors.clone())),
            Self::NotFound { resource } => insert(&mut details, "resource", Some(resource)),
            Self::NotAuthenticated | Self::Internal(_) => {}
        }

        if details.is_empty() {
            None
        } else {
            Some(Value::Object(details))
        }
    }

    /// Serialize into the uniform `{success: false, error: {...}}` envelope.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut error = Map::new();
        error.insert("code".to_string(), json!(self.code()));
        error.insert("message".to_string(), json!(self.to_string()));

        // Validation errors expose the list directly instead of nesting it in details.
        if let Self::Validation(errors) = self {
            error.insert("errors".to_string(), json!(errors));
        } else if let Some(details) = self.details() {
            error.insert("details".to_string(), details);
        }

        json!({
            "success": false,
            "error": Value::Object(error),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("Internal error: {err:#}");
        }
        (self.status(), Json(self.to_body())).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::single_field("body", rejection.body_text())
    }
}

fn insert<T: Serialize>(details: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        if let Ok(value) = serde_json::to_value(value) {
            details.insert(key.to_string(), value);
        }
    }
}

fn invalid_credentials_message(remaining_attempts: &Option<u32>) -> String {
    match remaining_attempts {
        Some(remaining) => {
            format!("Invalid username or password. {remaining} attempt(s) remaining.")
        }
        None => "Invalid username or password.".to_string(),
    }
}

fn account_locked_message(
    lockout_minutes: &Option<u32>,
    locked_until: &Option<DateTime<Utc>>,
) -> String {
    match (locked_until, lockout_minutes) {
        (Some(until), _) => format!(
            "Account locked after too many attempts. Try again after {} UTC.",
            until.format("%H:%M")
        ),
        (None, Some(minutes)) => format!("Account locked for {minutes} minute(s)."),
        (None, None) => "Account temporarily locked after too many attempts.".to_string(),
    }
}

fn account_inactive_message(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!("Your account has been deactivated: {reason}"),
        None => "Your account has been deactivated. Contact an administrator.".to_string(),
    }
}

fn session_expired_message(inactive_minutes: &Option<u32>) -> String {
    match inactive_minutes {
        Some(minutes) => format!(
            "The session was inactive for {minutes} minutes and you have been logged out."
        ),
        None => "The session was inactive for too long and you have been logged out.".to_string(),
    }
}

fn password_change_message(reason: &PasswordChangeReason) -> &'static str {
    match reason {
        PasswordChangeReason::FirstLogin => "First login: please choose your personal password.",
        PasswordChangeReason::AdminReset => {
            "Your password has been reset. Please choose a new one."
        }
    }
}

fn unknown_value_message(label: &str, noun: &str, value: &Option<String>) -> String {
    match value {
        Some(value) => format!(
            "{label} \"{value}\" is not recognized or not allowed for this action."
        ),
        None => format!("Invalid or unrecognized {noun}."),
    }
}

fn insufficient_role_message(required: &[Role], current: &Option<Role>) -> String {
    let roles = required
        .iter()
        .map(|role| role.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    match current {
        Some(current) => format!(
            "Insufficient role. Your role \"{current}\" does not allow this action. Required roles: {roles}."
        ),
        None => format!("Insufficient role for this action. Required roles: {roles}."),
    }
}

fn access_denied_message(noun: &str, id: &Option<i64>, name: &Option<String>) -> String {
    match (name, id) {
        (Some(name), _) => format!("You do not have access to the {noun} \"{name}\"."),
        (None, Some(id)) => format!("You do not have access to {noun} #{id}."),
        (None, None) => format!("You do not have access to this {noun}."),
    }
}

fn forbidden_message(action: &Option<String>, resource: &Option<String>) -> String {
    match (action, resource) {
        (Some(action), Some(resource)) => {
            format!("You are not allowed to {action} on {resource}.")
        }
        (Some(action), None) => format!("You are not allowed to {action}."),
        (None, Some(resource)) => format!("You do not have access to {resource}."),
        (None, None) => "You are not allowed to perform this action.".to_string(),
    }
}

fn stats_denied_message(kind: &Option<StatsKind>) -> String {
    match kind {
        Some(kind) => format!("You do not have access to {}.", kind.label()),
        None => "You do not have access to these statistics.".to_string(),
    }
}

fn validation_message(errors: &[ValidationError]) -> String {
    let mut fields: Vec<&str> = Vec::with_capacity(errors.len());
    for error in errors {
        if !fields.contains(&error.field.as_str()) {
            fields.push(&error.field);
        }
    }
    format!("Invalid data: {}", fields.join(", "))
}
