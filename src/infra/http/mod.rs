//! HTTP surface: the remote peer contract plus cache invalidation.

mod error;
mod handlers;
mod middleware;
mod state;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, ErrorReport};
pub use state::LookupState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use middleware::{log_responses, set_request_context};

pub fn build_router(state: LookupState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/labels", post(handlers::labels))
        .route("/api/v1/descriptions", post(handlers::descriptions))
        .route("/api/v1/cache/invalidate", post(handlers::invalidate))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
