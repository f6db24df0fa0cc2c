//! JSON HTTP surface: event ingress, stats queries and the tracking pixel.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_api_router;
