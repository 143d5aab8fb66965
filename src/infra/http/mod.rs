pub mod api;
mod middleware;

pub use api::ApiState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use middleware::{log_responses, set_request_context};

/// Full HTTP surface: health probe plus the job API.
pub fn build_router(state: ApiState) -> Router {
    let body_limit = usize::try_from(state.limits.max_request_bytes.get()).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health))
        .merge(api::build_api_router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .with_state(state)
}

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
