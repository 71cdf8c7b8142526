use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::error_response;
use crate::{access::session::Identity, backend::Backend, noticeboard::AppState};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ActiveRequest {
    pub active: bool,
}

#[utoipa::path(
    patch,
    path = "/v1/users/{id}/active",
    params(
        ("id" = String, Path, description = "User id")
    ),
    request_body = ActiveRequest,
    responses(
        (status = 204, description = "Account activation updated."),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Sign in required."),
        (status = 403, description = "Admin role required, or target is an admin being deactivated."),
        (status = 404, description = "User not found."),
        (status = 502, description = "Backend request failed."),
        (status = 503, description = "Session still resolving."),
    ),
    tag = "users"
)]
pub async fn set_active<B: Backend>(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState<B>>>,
    payload: Option<Json<ActiveRequest>>,
) -> Response {
    let id = id.trim();
    if id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid id");
    }

    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "missing payload");
    };

    match state
        .users
        .set_active(&Identity::new(id), request.active)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
