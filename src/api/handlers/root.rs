use axum::response::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Public endpoints advertised by `/` and by the 404 fallback.
pub const AVAILABLE_ENDPOINTS: [(&str, &str); 7] = [
    ("root", "/"),
    ("health", "/health"),
    ("clients", "/api/clients"),
    ("login", "/auth/login"),
    ("logout", "/auth/logout"),
    ("me", "/auth/me"),
    ("openapi", "/api-docs/openapi.json"),
];

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiInfo {
    message: String,
    version: String,
    status: String,
    timestamp: String,
    endpoints: BTreeMap<String, String>,
}

/// API name, version and entry points.
pub async fn root() -> Json<ApiInfo> {
    Json(ApiInfo {
        message: "Everglass CRM API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        endpoints: AVAILABLE_ENDPOINTS
            .iter()
            .map(|(name, path)| ((*name).to_string(), (*path).to_string()))
            .collect(),
    })
}
