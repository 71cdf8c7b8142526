use axum::{extract::Extension, response::Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    access::capability::{self, BoardAffordances, Navigation},
    backend::Backend,
    noticeboard::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct NavigationResponse {
    pub navigation: Navigation,
    pub affordances: BoardAffordances,
}

#[utoipa::path(
    get,
    path = "/v1/navigation",
    responses(
        (status = 200, description = "Navigation and board controls visible to the visitor", body = NavigationResponse),
    ),
    tag = "navigation"
)]
pub async fn navigation<B: Backend>(
    Extension(state): Extension<Arc<AppState<B>>>,
) -> Json<NavigationResponse> {
    let session = state.session.current();

    Json(NavigationResponse {
        navigation: capability::navigation(&session),
        affordances: capability::board_affordances(&session),
    })
}
