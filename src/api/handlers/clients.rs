//! Client listing, scoped to the caller's perimeter.

use anyhow::Context;
use axum::{Json, extract::Extension};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{Instrument, info_span};
use utoipa::ToSchema;

use crate::api::error::ApiError;

use super::auth::{AuthState, permissions::Level, principal::Principal};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientView {
    pub id: i64,
    pub center_id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClientList {
    pub success: bool,
    pub count: usize,
    pub data: Vec<ClientView>,
}

#[utoipa::path(
    get,
    path = "/api/clients",
    responses(
        (status = 200, description = "Clients visible to the caller", body = ClientList),
        (status = 401, description = "No valid session")
    ),
    tag = "clients"
)]
pub async fn list_clients(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ClientList>, ApiError> {
    let permissions = principal.permissions(&auth_state).await?;
    let everything = permissions.can_view_all_dossiers && principal.level == Level::Headquarters;

    let query = if everything {
        "SELECT id, center_id, name, email, phone, created_at FROM clients ORDER BY id"
    } else {
        "SELECT id, center_id, name, email, phone, created_at FROM clients WHERE center_id = ANY($1) ORDER BY id"
    };
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let mut statement = sqlx::query(query);
    if !everything {
        statement = statement.bind(permissions.accessible_center_ids);
    }
    let rows = statement
        .fetch_all(&pool.0)
        .instrument(span)
        .await
        .context("failed to list clients")?;

    let data: Vec<ClientView> = rows
        .iter()
        .map(|row| ClientView {
            id: row.get("id"),
            center_id: row.get("center_id"),
            name: row.get("name"),
            email: row.get("email"),
            phone: row.get("phone"),
            created_at: row.get("created_at"),
        })
        .collect();

    Ok(Json(ClientList {
        success: true,
        count: data.len(),
        data,
    }))
}
