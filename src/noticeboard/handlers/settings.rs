use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::error_response;
use crate::{
    backend::{Backend, SettingUpdate},
    noticeboard::AppState,
};

#[utoipa::path(
    patch,
    path = "/v1/settings",
    request_body = SettingUpdate,
    responses(
        (status = 204, description = "Setting saved."),
        (status = 400, description = "Unknown setting or a value of the wrong shape."),
        (status = 401, description = "Sign in required."),
        (status = 403, description = "Admin role required."),
        (status = 502, description = "Backend request failed."),
        (status = 503, description = "Session or role still resolving."),
    ),
    tag = "settings"
)]
pub async fn update<B: Backend>(
    Extension(state): Extension<Arc<AppState<B>>>,
    payload: Option<Json<SettingUpdate>>,
) -> Response {
    let Some(Json(update)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "missing payload");
    };

    if !update.key.accepts(&update.value) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("invalid value for {}", update.key.as_str()),
        );
    }

    match state.settings.update(&update).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
