//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::ratelimit::{ip_rate_limit_middleware, login_rate_limit_middleware};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post, put};
use certfolio_core::config::ServerConfig;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and the text fields next to the file.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let rate_limit_state = state.rate_limit.clone();
    let body_limit = usize::try_from(
        state
            .config
            .server
            .max_upload_bytes
            .saturating_add(MULTIPART_OVERHEAD_BYTES),
    )
    .unwrap_or(usize::MAX);

    let api_routes = Router::new()
        // Login has its own, stricter per-IP budget
        .route(
            "/api/token",
            post(handlers::issue_token).layer(middleware::from_fn_with_state(
                rate_limit_state.clone(),
                login_rate_limit_middleware,
            )),
        )
        .route("/api/me", get(handlers::me))
        .route(
            "/api/certificates",
            get(handlers::list_certificates).post(handlers::create_certificate),
        )
        .route(
            "/api/certificates/{id}",
            get(handlers::get_certificate)
                .patch(handlers::update_certificate)
                .delete(handlers::delete_certificate),
        )
        .route(
            "/api/certificates/{id}/file",
            put(handlers::replace_certificate_file),
        )
        .layer(DefaultBodyLimit::max(body_limit));

    let public_routes = Router::new()
        // Health check (intentionally unauthenticated for load balancers)
        .route("/health", get(handlers::health_check))
        .route("/static/{*path}", get(handlers::serve_attachment));

    let mut router = Router::new().merge(api_routes).merge(public_routes);

    // SECURITY: restrict /metrics to scraper IPs at the network level.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Middleware layers are applied in reverse order (outermost last).
    // Order of execution: TraceLayer -> CORS -> IP rate limit -> Auth -> Handler
    let mut router = router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            rate_limit_state,
            ip_rate_limit_middleware,
        ));

    if let Some(cors) = cors_layer(&state.config.server) {
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// CORS for the configured origins; `None` when the list is empty.
fn cors_layer(config: &ServerConfig) -> Option<CorsLayer> {
    if config.cors_allowed_origins.is_empty() {
        return None;
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
