//! API handlers for Everglass.
//!
//! Route handlers live in their own modules; this module only holds the 404
//! fallback shared by the router.

pub mod auth;
pub mod clients;
pub mod health;
pub mod root;

use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use super::error::ApiError;
use root::AVAILABLE_ENDPOINTS;

/// JSON 404 for unknown routes, listing the public endpoints.
pub async fn not_found(uri: Uri) -> Response {
    let mut body = ApiError::not_found("Route").to_body();
    body["path"] = json!(uri.path());
    body["availableEndpoints"] = json!(
        AVAILABLE_ENDPOINTS
            .iter()
            .map(|(_, path)| *path)
            .collect::<Vec<_>>()
    );
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
