//! HTTP surface of the access-control core.

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, patch, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

use crate::{
    access::{
        actions::{NoticeActions, SettingsActions, UserActions},
        audit::{AuditLog, AuditSink, FanOut, LogAuditSink},
        gate::{spawn_gate_refresh, ActiveGate},
        resolver::{SessionHandle, SessionResolver},
    },
    backend::Backend,
};

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Shared state of every handler.
pub struct AppState<B> {
    pub backend: Arc<B>,
    pub session: SessionHandle,
    pub gate: Arc<ActiveGate>,
    pub audit: Arc<AuditLog>,
    pub notices: NoticeActions<B>,
    pub users: UserActions<B>,
    pub settings: SettingsActions<B>,
}

impl<B: Backend> AppState<B> {
    /// Starts the session resolver and the gate refresh on the current runtime.
    pub fn start(backend: B, audit_capacity: usize) -> Arc<Self> {
        let backend = Arc::new(backend);
        let session = SessionResolver::spawn(Arc::clone(&backend), Arc::clone(&backend));

        let audit = Arc::new(AuditLog::new(audit_capacity));
        let sinks: Vec<Arc<dyn AuditSink>> = vec![
            Arc::new(LogAuditSink) as Arc<dyn AuditSink>,
            Arc::clone(&audit) as Arc<dyn AuditSink>,
        ];
        let gate = Arc::new(ActiveGate::new(session.clone(), Arc::new(FanOut::new(sinks))));
        spawn_gate_refresh(Arc::clone(&gate), &session);

        Arc::new(Self {
            notices: NoticeActions::new(Arc::clone(&backend), session.clone()),
            users: UserActions::new(Arc::clone(&backend), session.clone()),
            settings: SettingsActions::new(Arc::clone(&backend), session.clone()),
            backend,
            session,
            gate,
            audit,
        })
    }
}

/// Routes of the API, without the request-id and trace layers.
pub fn router<B: Backend>(state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health).options(handlers::health))
        .route("/v1/session", get(handlers::session::session::<B>))
        .route("/v1/auth/sign-in", post(handlers::auth::sign_in::<B>))
        .route("/v1/auth/sign-out", post(handlers::auth::sign_out::<B>))
        .route("/v1/gate", get(handlers::gate::gate::<B>))
        .route("/v1/navigation", get(handlers::navigation::navigation::<B>))
        .route("/v1/notices", post(handlers::notices::create::<B>))
        .route(
            "/v1/notices/:id",
            patch(handlers::notices::update::<B>).delete(handlers::notices::delete::<B>),
        )
        .route(
            "/v1/notices/:id/affordances",
            get(handlers::notices::affordances::<B>),
        )
        .route("/v1/notices/:id/archive", post(handlers::notices::archive::<B>))
        .route("/v1/notices/:id/restore", post(handlers::notices::restore::<B>))
        .route("/v1/users/:id/active", patch(handlers::users::set_active::<B>))
        .route("/v1/settings", patch(handlers::settings::update::<B>))
        .route("/v1/audit", get(handlers::audit::audit::<B>))
        .layer(Extension(state))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new<B: Backend>(port: u16, state: Arc<AppState<B>>) -> Result<()> {
    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
