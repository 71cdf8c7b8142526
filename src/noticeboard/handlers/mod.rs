pub mod audit;
pub mod auth;
pub mod gate;
pub mod health;
pub mod navigation;
pub mod notices;
pub mod session;
pub mod settings;
pub mod users;

pub use self::health::health;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::actions::ActionError;

static EMAIL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(email))
}

/// Error body of every non-2xx response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::SessionPending => StatusCode::SERVICE_UNAVAILABLE,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Backend(err) => {
                error!("Backend request failed: {err}");
                StatusCode::BAD_GATEWAY
            }
        };

        error_response(status, self.to_string())
    }
}

pub(crate) fn parse_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id.trim())
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "invalid id"))
}
