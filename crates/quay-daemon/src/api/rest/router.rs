//! API Router configuration

use super::auth;
use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let protected = Router::new()
        // Services
        .route("/services", get(handlers::list_services))
        .route("/services", post(handlers::create_service))
        .route("/services/:service", get(handlers::get_service))
        .route("/services/:service/env", put(handlers::update_env))
        // Releases
        .route("/services/:service/releases", get(handlers::list_releases))
        .route("/services/:service/releases", post(handlers::upload_release))
        .route("/services/:service/releases/:release", delete(handlers::delete_release))
        .route(
            "/services/:service/releases/:release/activate",
            post(handlers::activate_release),
        )
        // Runtime
        .route("/services/:service/start", post(handlers::start_service))
        .route("/services/:service/stop", post(handlers::stop_service))
        .route("/services/:service/restart", post(handlers::restart_service))
        .route("/services/:service/status", get(handlers::service_status))
        // Logs
        .route("/services/:service/logs", get(handlers::get_logs))
        .route("/services/:service/logs/clear", post(handlers::clear_logs))
        .route("/services/:service/logs/stream", get(handlers::stream_logs))
        // Events
        .route("/events/stream", get(handlers::stream_events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(protected);

    // Build router with middleware
    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(TraceLayer::new_for_http());

    let router = if config.enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
