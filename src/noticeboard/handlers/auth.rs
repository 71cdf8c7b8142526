use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::{error_response, valid_email};
use crate::{
    backend::{AuthService, Backend, BackendError},
    noticeboard::AppState,
};

#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: String,
    #[schema(format = Password)]
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/v1/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 204, description = "Signed in; the session resolves asynchronously."),
        (status = 400, description = "Invalid email or missing password."),
        (status = 401, description = "Invalid credentials."),
        (status = 502, description = "Auth service unavailable."),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn sign_in<B: Backend>(
    Extension(state): Extension<Arc<AppState<B>>>,
    payload: Option<Json<SignInRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "missing payload");
    };

    let email = request.email.trim();
    if !valid_email(email) {
        return error_response(StatusCode::BAD_REQUEST, "invalid email");
    }

    let password = SecretString::from(request.password);
    if password.expose_secret().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "missing password");
    }

    match state.backend.sign_in_with_password(email, &password).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(BackendError::Status {
            status: 400 | 401, ..
        }) => error_response(StatusCode::UNAUTHORIZED, "invalid credentials"),
        Err(err) => {
            error!("Sign in failed: {err}");
            error_response(StatusCode::BAD_GATEWAY, "auth service unavailable")
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/sign-out",
    responses(
        (status = 204, description = "Signed out; identity and role are cleared."),
        (status = 502, description = "Local session cleared, remote sign-out failed."),
    ),
    tag = "auth"
)]
pub async fn sign_out<B: Backend>(Extension(state): Extension<Arc<AppState<B>>>) -> Response {
    match state.backend.sign_out().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Sign out failed: {err}");
            error_response(StatusCode::BAD_GATEWAY, "remote sign-out failed")
        }
    }
}
