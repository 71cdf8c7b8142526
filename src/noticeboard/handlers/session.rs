use axum::{extract::Extension, response::Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    access::{
        role::Role,
        session::{RoleStatus, Session},
    },
    backend::Backend,
    noticeboard::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unresolved,
    Anonymous,
    Authenticated,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionView {
    pub state: SessionState,
    pub resolved: bool,
    pub identity: Option<String>,
    pub email: Option<String>,
    /// `loading`, `assigned` or `unavailable`; absent without an identity.
    pub role_status: Option<String>,
    pub role: Option<Role>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let state = match session {
            Session::Unresolved => SessionState::Unresolved,
            Session::Anonymous => SessionState::Anonymous,
            Session::Authenticated(_) => SessionState::Authenticated,
        };

        Self {
            state,
            resolved: session.is_resolved(),
            identity: session.identity().map(ToString::to_string),
            email: session.visitor().and_then(|visitor| visitor.email.clone()),
            role_status: session
                .role_status()
                .map(RoleStatus::as_str)
                .map(str::to_string),
            role: session.role(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/session",
    responses(
        (status = 200, description = "Current session of the visitor", body = SessionView),
    ),
    tag = "session"
)]
pub async fn session<B: Backend>(Extension(state): Extension<Arc<AppState<B>>>) -> Json<SessionView> {
    Json(SessionView::from(&state.session.current()))
}
