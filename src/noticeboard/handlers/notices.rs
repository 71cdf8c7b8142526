//! Notice mutations. Publishing is admin-only; every other call re-checks
//! owner-or-admin against the notice's creator at request time. Affordances are
//! only a hint for the views.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{error_response, parse_id};
use crate::{
    access::{
        actions::ActionError,
        capability::{notice_affordances, NoticeAffordances},
    },
    backend::{Backend, NewNotice, NoticeId, NoticeStore, NoticeUpdate},
    noticeboard::AppState,
};

fn notice_id(id: &str) -> Result<NoticeId, Response> {
    parse_id(id).map(NoticeId)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedNotice {
    pub id: String,
}

#[utoipa::path(
    post,
    path = "/v1/notices",
    request_body = NewNotice,
    responses(
        (status = 201, description = "Notice published.", body = CreatedNotice),
        (status = 400, description = "Missing payload or a required field is blank."),
        (status = 401, description = "Sign in required."),
        (status = 403, description = "Admin role required."),
        (status = 502, description = "Backend request failed."),
        (status = 503, description = "Session or role still resolving."),
    ),
    tag = "notices"
)]
pub async fn create<B: Backend>(
    Extension(state): Extension<Arc<AppState<B>>>,
    payload: Option<Json<NewNotice>>,
) -> Response {
    let Some(Json(notice)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "missing payload");
    };

    if let Some(field) = notice.missing_field() {
        return error_response(StatusCode::BAD_REQUEST, format!("{field} is required"));
    }

    match state.notices.create(&notice).await {
        Ok(id) => {
            let body = CreatedNotice { id: id.to_string() };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/notices/{id}",
    params(
        ("id" = String, Path, description = "Notice id")
    ),
    request_body = NoticeUpdate,
    responses(
        (status = 204, description = "Notice updated."),
        (status = 400, description = "Invalid id or no updates provided."),
        (status = 401, description = "Sign in required."),
        (status = 403, description = "Only the creator or an admin may modify this notice."),
        (status = 404, description = "Notice not found."),
        (status = 502, description = "Backend request failed."),
        (status = 503, description = "Session still resolving."),
    ),
    tag = "notices"
)]
pub async fn update<B: Backend>(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState<B>>>,
    payload: Option<Json<NoticeUpdate>>,
) -> Response {
    let id = match notice_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let Some(Json(update)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "missing payload");
    };

    if update.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no updates provided");
    }

    match state.notices.update(id, &update).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/notices/{id}",
    params(
        ("id" = String, Path, description = "Notice id")
    ),
    responses(
        (status = 204, description = "Notice deleted."),
        (status = 401, description = "Sign in required."),
        (status = 403, description = "Only the creator or an admin may modify this notice."),
        (status = 404, description = "Notice not found."),
        (status = 502, description = "Backend request failed."),
    ),
    tag = "notices"
)]
pub async fn delete<B: Backend>(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState<B>>>,
) -> Response {
    let id = match notice_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.notices.delete(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/notices/{id}/archive",
    params(
        ("id" = String, Path, description = "Notice id")
    ),
    responses(
        (status = 204, description = "Notice archived."),
        (status = 401, description = "Sign in required."),
        (status = 403, description = "Only the creator or an admin may modify this notice."),
        (status = 404, description = "Notice not found."),
    ),
    tag = "notices"
)]
pub async fn archive<B: Backend>(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState<B>>>,
) -> Response {
    let id = match notice_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.notices.archive(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/notices/{id}/restore",
    params(
        ("id" = String, Path, description = "Notice id")
    ),
    responses(
        (status = 204, description = "Notice restored from the archive."),
        (status = 401, description = "Sign in required."),
        (status = 403, description = "Only the creator or an admin may modify this notice."),
        (status = 404, description = "Notice not found."),
    ),
    tag = "notices"
)]
pub async fn restore<B: Backend>(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState<B>>>,
) -> Response {
    let id = match notice_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.notices.restore(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/notices/{id}/affordances",
    params(
        ("id" = String, Path, description = "Notice id")
    ),
    responses(
        (status = 200, description = "Controls to show next to the notice", body = NoticeAffordances),
        (status = 404, description = "Notice not found."),
        (status = 502, description = "Backend request failed."),
    ),
    tag = "notices"
)]
pub async fn affordances<B: Backend>(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState<B>>>,
) -> Response {
    let id = match notice_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.backend.notice(id).await {
        Ok(Some(notice)) => {
            let session = state.session.current();
            Json(notice_affordances(&session, notice.creator.as_ref())).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "notice not found"),
        Err(err) => ActionError::from(err).into_response(),
    }
}
