use crate::middleware::{auth_middleware, AuthConfig};
use crate::router;
use axum::{
    middleware as axum_mw,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use phqscreen_session::ScreeningService;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
pub struct AppState {
    /// The service every handler drives.
    pub service: Arc<ScreeningService>,
}

/// The HTTP gateway in front of a [`ScreeningService`].
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway without auth.
    pub fn build(service: Arc<ScreeningService>) -> Router {
        Self::build_with_auth(service, AuthConfig::default())
    }

    /// Build the gateway; when `auth_config` has keys, every route except the
    /// liveness probes requires one.
    pub fn build_with_auth(service: Arc<ScreeningService>, auth_config: AuthConfig) -> Router {
        let state = Arc::new(AppState { service });
        let auth_enabled = auth_config.is_enabled();

        let api = Router::new()
            .route("/sessions", post(router::open_session).get(router::list_summaries))
            .route("/predict", post(router::predict))
            .route("/stop-session/{session_id}", post(router::stop_session))
            .route("/get-session/{session_id}", get(router::get_summary))
            .route("/sessions/{session_id}/report", get(router::report))
            .route("/sessions/{session_id}/reaggregate", post(router::reaggregate))
            .route("/sessions/{session_id}/persist", post(router::persist_unsaved))
            .route_layer(axum_mw::from_fn_with_state(
                Arc::new(auth_config),
                auth_middleware,
            ))
            .with_state(state);

        info!(auth_enabled, "Gateway routes built");

        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .merge(api)
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({"message": "PHQ-9 screening backend is alive"}))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "phqscreen"}))
}
