//! Login and logout endpoints.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::api::error::ApiError;

use super::{
    session::{clear_session_cookie, extract_session_cookie, session_cookie, with_cookie},
    state::AuthState,
    types::{DataResponse, LoginRequest, LoginResponse, MessageResponse},
    workflow,
};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session created", body = DataResponse<LoginResponse>),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account inactive, or password change required (session still issued)"),
        (status = 423, description = "Account locked"),
        (status = 429, description = "Too many active sessions")
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };

    let outcome = match workflow::login(&auth_state, &request).await {
        Ok(outcome) => outcome,
        Err(err) => return err.into_response(),
    };

    let cookie = session_cookie(auth_state.config(), &outcome.session.cookie_value);

    // The session exists either way; the client needs the cookie to change the password.
    let response = match outcome.password_change {
        Some(reason) => ApiError::PasswordChangeRequired { reason }.into_response(),
        None => (
            StatusCode::OK,
            Json(DataResponse::new(LoginResponse {
                user: outcome.user,
                expires_at: outcome.session.record.expires_at.timestamp_millis(),
            })),
        )
            .into_response(),
    };
    with_cookie(response, cookie)
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session cleared", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    let cookie_value = extract_session_cookie(&headers);
    if let Err(err) = workflow::logout(&auth_state, cookie_value.as_deref()).await {
        error!("Failed to delete session: {err}");
    }

    // Always clear the cookie, even if the session record was missing.
    let response = (
        StatusCode::OK,
        Json(MessageResponse::new("Logged out successfully.")),
    )
        .into_response();
    with_cookie(response, clear_session_cookie(auth_state.config()))
}
