use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    get_count, get_total_value, health_check, record_conversion, record_impression,
    record_variant_conversion, tracking_pixel, AppState,
};

pub fn create_api_router(state: Arc<AppState>, pixel_path: &str) -> Router {
    // Ingress is hit by beacons from tracked sites, so it accepts any origin
    let ingress_routes = Router::new()
        .route("/api/events/conversions", post(record_conversion))
        .route("/api/events/impressions", post(record_impression))
        .route(
            "/api/events/variant-conversions",
            post(record_variant_conversion),
        )
        .route(pixel_path, get(tracking_pixel))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    let stats_routes = Router::new()
        .route("/api/stats/count", get(get_count))
        .route("/api/stats/total-value", get(get_total_value))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .merge(ingress_routes)
        .merge(stats_routes)
        .layer(TraceLayer::new_for_http())
}
