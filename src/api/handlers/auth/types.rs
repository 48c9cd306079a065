use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    permissions::{Level, Permissions, Role},
    storage::UserRecord,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub employee_id: i64,
    #[serde(default)]
    pub new_password: String,
}

/// Employee fields safe to return to clients: no hash, no lockout counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub level: Level,
    pub site_id: Option<i64>,
    pub franchise_id: Option<i64>,
    pub center_id: Option<i64>,
    pub hired_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub must_change_password: bool,
}

impl UserView {
    #[must_use]
    pub fn new(user: &UserRecord, role: Role, level: Level) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            role,
            level,
            site_id: user.scope.site_id,
            franchise_id: user.scope.franchise_id,
            center_id: user.scope.center_id,
            hired_at: user.hired_at,
            last_login_at: user.last_login_at,
            must_change_password: user.must_change_password,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserView,
    /// Session expiry, epoch milliseconds.
    pub expires_at: i64,
}

/// Session timestamps, epoch milliseconds.
#[derive(Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub created_at: i64,
    pub last_activity: i64,
    pub expires_at: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: UserView,
    pub session: SessionInfo,
    pub permissions: Permissions,
}

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
