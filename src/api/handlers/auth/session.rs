//! Session cookie helpers and the session middleware.
//!
//! The middleware guards every route that needs an employee: it resolves the
//! signed `everglass.sid` cookie into a [`Principal`], rolls the session
//! forward, re-issues the cookie on the way out and keeps employees with a
//! pending password change away from everything but the change-password flow.

use axum::{
    extract::{Extension, Request},
    http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::api::error::ApiError;

use super::{
    principal::Principal,
    state::{AuthConfig, AuthState},
    workflow::authenticate,
};

pub const SESSION_COOKIE_NAME: &str = "everglass.sid";

/// Routes still reachable while the password must be changed.
const PASSWORD_CHANGE_ALLOWLIST: [&str; 3] = ["/auth/me", "/auth/logout", "/auth/change-password"];

/// Build the `HttpOnly` session cookie carrying the signed token.
pub(super) fn session_cookie(
    config: &AuthConfig,
    value: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = u64::from(config.session_timeout_minutes()) * 60;
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Raw (still signed) cookie value, if the request carries one.
pub(super) fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

/// Attach a `Set-Cookie` header, logging instead of failing on a bad value.
pub(super) fn with_cookie(
    mut response: Response,
    cookie: Result<HeaderValue, InvalidHeaderValue>,
) -> Response {
    match cookie {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    response
}

/// Require a live session on the wrapped routes.
pub async fn require_session(
    Extension(auth_state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_value = extract_session_cookie(request.headers());
    let config = auth_state.config();

    let principal = match authenticate(&auth_state, cookie_value.as_deref()).await {
        Ok(principal) => principal,
        Err(err) => {
            let stale = cookie_value.is_some() && rejects_session(&err);
            let response = err.into_response();
            // A cookie that no longer resolves is dropped client side as well.
            return if stale {
                with_cookie(response, clear_session_cookie(config))
            } else {
                response
            };
        }
    };

    if let Some(reason) = principal.pending_password_change() {
        if !PASSWORD_CHANGE_ALLOWLIST.contains(&request.uri().path()) {
            let response = ApiError::PasswordChangeRequired { reason }.into_response();
            return with_cookie(response, refreshed_cookie(config, cookie_value.as_deref()));
        }
    }

    request.extensions_mut().insert::<Principal>(principal);
    let response = next.run(request).await;

    // Handlers that issue a new session set their own cookie.
    if response.headers().contains_key(SET_COOKIE) {
        return response;
    }
    with_cookie(response, refreshed_cookie(config, cookie_value.as_deref()))
}

/// Errors meaning the session itself is gone, as opposed to a storage failure.
fn rejects_session(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::NotAuthenticated
            | ApiError::SessionExpired { .. }
            | ApiError::AccountInactive { .. }
    )
}

fn refreshed_cookie(
    config: &AuthConfig,
    cookie_value: Option<&str>,
) -> Result<HeaderValue, InvalidHeaderValue> {
    session_cookie(config, cookie_value.unwrap_or_default())
}
