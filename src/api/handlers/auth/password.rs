//! Password change (self service) and administrator reset endpoints.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::api::error::ApiError;

use super::{
    principal::Principal,
    session::{session_cookie, with_cookie},
    state::AuthState,
    types::{ChangePasswordRequest, MessageResponse, ResetPasswordRequest},
    workflow,
};

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed, other sessions closed", body = MessageResponse),
        (status = 400, description = "Every failed rule, in one validation error"),
        (status = 401, description = "No valid session")
    ),
    tag = "auth"
)]
pub async fn change_password(
    auth_state: Extension<Arc<AuthState>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };

    match workflow::change_password(&auth_state, &principal, &request).await {
        Ok(session) => {
            let response = (
                StatusCode::OK,
                Json(MessageResponse::new("Password changed successfully.")),
            )
                .into_response();
            with_cookie(
                response,
                session_cookie(auth_state.config(), &session.cookie_value),
            )
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset, employee must change it at next login", body = MessageResponse),
        (status = 400, description = "New password violates the policy"),
        (status = 403, description = "Missing capability or target outside the caller's perimeter"),
        (status = 404, description = "Unknown employee")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    auth_state: Extension<Arc<AuthState>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;
    workflow::reset_password(&auth_state, &principal, &request).await?;
    Ok(Json(MessageResponse::new(
        "Password reset. The employee must choose a new one at next login.",
    )))
}
