use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::error_response;
use crate::{
    access::{
        actions::require_admin,
        audit::{AccessAttempt, DenyReason},
        role::Role,
    },
    backend::Backend,
    noticeboard::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessAttemptView {
    pub id: String,
    pub destination: String,
    pub identity: Option<String>,
    pub role: Option<Role>,
    pub reason: DenyReason,
    pub redirect_to: String,
}

impl From<AccessAttempt> for AccessAttemptView {
    fn from(attempt: AccessAttempt) -> Self {
        Self {
            id: attempt.id.to_string(),
            destination: attempt.destination,
            identity: attempt.identity.map(|identity| identity.to_string()),
            role: attempt.role,
            reason: attempt.reason,
            redirect_to: attempt.redirect_to.to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/audit",
    responses(
        (status = 200, description = "Recorded access attempts, newest first", body = [AccessAttemptView]),
        (status = 401, description = "Sign in required."),
        (status = 403, description = "Admin role required."),
        (status = 503, description = "Session still resolving."),
    ),
    tag = "audit"
)]
pub async fn audit<B: Backend>(Extension(state): Extension<Arc<AppState<B>>>) -> Response {
    let session = state.session.current();
    if let Err(err) = require_admin(&session) {
        return err.into_response();
    }

    match state.audit.recent() {
        Ok(attempts) => Json(
            attempts
                .into_iter()
                .map(AccessAttemptView::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => {
            error!("Failed to read audit log: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "audit log unavailable")
        }
    }
}
