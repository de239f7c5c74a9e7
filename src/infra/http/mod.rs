pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router, build_api_state};
pub use middleware::{RequestContext, log_responses, set_request_context};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Router, middleware as axum_middleware};

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;

/// Full application router: the API plus the health probe, wrapped in the
/// shared request-context and response-logging middleware.
pub fn build_router(state: ApiState) -> Router {
    let health = Router::new()
        .route("/health", get(health_check))
        .with_state(state.clone());

    build_api_router(state)
        .merge(health)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health_check(State(state): State<ApiState>) -> Response {
    store_health_response(state.health.ping().await)
}

fn store_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::store_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
