//! HTTP gateway for phqscreen.
//!
//! Exposes a [`ScreeningService`](phqscreen_session::ScreeningService) over
//! axum: per-turn prediction, session close, summary and report reads, and
//! the retry routes for closes that failed after the transition.

/// API-key auth middleware.
pub mod middleware;
/// Request handlers and error mapping.
pub mod router;
/// Router assembly.
pub mod server;

pub use middleware::AuthConfig;
pub use router::{resolve_session_param, ApiError, DEFAULT_SESSION_SENTINEL};
pub use server::{AppState, GatewayServer};
