use axum::{Json, extract::Extension};
use std::sync::Arc;

use crate::api::error::ApiError;

use super::{
    principal::Principal,
    state::AuthState,
    types::{DataResponse, MeResponse},
    workflow,
};

/// Current employee, session timestamps and derived permissions.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Authenticated employee", body = DataResponse<MeResponse>),
        (status = 401, description = "No valid session")
    ),
    tag = "auth"
)]
pub async fn me(
    auth_state: Extension<Arc<AuthState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<DataResponse<MeResponse>>, ApiError> {
    let me = workflow::me(&auth_state, &principal).await?;
    Ok(Json(DataResponse::new(me)))
}
