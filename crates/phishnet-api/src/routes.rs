//! API routes

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, health, tracking};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Campaign routes (owner-scoped)
    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/dashboard", get(campaigns::dashboard_stats))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id", put(campaigns::update_campaign))
        .route("/:campaign_id", delete(campaigns::delete_campaign))
        .route("/:campaign_id/launch", post(campaigns::launch_campaign))
        .route(
            "/:campaign_id/relaunch-failed",
            post(campaigns::relaunch_failed),
        )
        .route("/:campaign_id/stats", get(campaigns::get_campaign_stats));

    // Public tracking routes hit by recipients
    let tracking_routes = Router::new()
        .route("/click/:campaign_id/:token", get(tracking::track_click))
        .route(
            "/submit/:campaign_id/:token",
            post(tracking::track_submission),
        )
        .route("/pixel/:campaign_id/:token", get(tracking::track_pixel));

    Router::new()
        .nest("/health", health_routes)
        .nest(
            "/api/v1/campaigns",
            campaign_routes.with_state(state.clone()),
        )
        .nest("/track", tracking_routes.with_state(state))
        .layer(TraceLayer::new_for_http())
}
