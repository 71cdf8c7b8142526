use axum::{
    extract::{Extension, Query},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::{
    access::{role::MinimumRole, routes},
    backend::Backend,
    noticeboard::AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GateQuery {
    /// Destination path, e.g. `/notice/42/edit`.
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GateResponse {
    pub destination: String,
    pub requirement: MinimumRole,
    /// `pending`, `allow` or `redirect`.
    pub decision: String,
    pub redirect_to: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/gate",
    params(GateQuery),
    responses(
        (status = 200, description = "Gate decision for the destination", body = GateResponse),
    ),
    tag = "gate"
)]
pub async fn gate<B: Backend>(
    Extension(state): Extension<Arc<AppState<B>>>,
    Query(query): Query<GateQuery>,
) -> Json<GateResponse> {
    let (decision, requirement) = state.gate.navigate(&query.path);

    Json(GateResponse {
        destination: routes::normalize(&query.path).to_string(),
        requirement,
        decision: decision.as_str().to_string(),
        redirect_to: decision.redirect_target().map(str::to_string),
    })
}
