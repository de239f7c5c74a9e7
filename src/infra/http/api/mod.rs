pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::{ApiState, build_api_state};

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get},
};

pub fn build_api_router(state: ApiState) -> Router {
    let auth_state = state.clone();

    Router::new()
        .route(
            "/api/authors",
            get(handlers::list_authors).post(handlers::create_author),
        )
        .route(
            "/api/authors/{id}",
            get(handlers::get_author)
                .put(handlers::update_author)
                .delete(handlers::delete_author),
        )
        .route(
            "/api/books",
            get(handlers::list_books).post(handlers::create_book),
        )
        .route(
            "/api/books/{id}",
            get(handlers::get_book)
                .put(handlers::update_book)
                .delete(handlers::delete_book),
        )
        .route(
            "/api/cache",
            get(handlers::cache_stats).delete(handlers::clear_cache),
        )
        .route(
            "/api/cache/tags/{tag}",
            delete(handlers::invalidate_cache_tag),
        )
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::api_auth,
        ))
        .with_state(state)
}
