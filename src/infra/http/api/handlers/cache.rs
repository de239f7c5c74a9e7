//! Cache administration handlers

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use crate::application::api_keys::ApiPrincipal;
use crate::cache::CacheTag;
use crate::domain::api_keys::Capability;

use super::auth_to_api;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::TagInvalidated;
use crate::infra::http::api::state::ApiState;

pub async fn cache_stats(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
) -> Result<impl IntoResponse, ApiError> {
    principal
        .requires(Capability::Manage)
        .map_err(auth_to_api)?;

    Ok(Json(state.cache.stats()))
}

pub async fn clear_cache(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
) -> Result<impl IntoResponse, ApiError> {
    principal
        .requires(Capability::Manage)
        .map_err(auth_to_api)?;

    let removed = state.cache.invalidate_all();
    info!(actor = %principal.name, removed, "cache cleared through api");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn invalidate_cache_tag(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    Path(tag): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    principal
        .requires(Capability::Manage)
        .map_err(auth_to_api)?;
    let tag = tag
        .parse::<CacheTag>()
        .map_err(|_| ApiError::not_found("unknown cache tag"))?;

    let removed = state.cache.invalidate_tag(tag);
    info!(
        actor = %principal.name,
        tag = tag.as_str(),
        removed,
        "cache tag invalidated through api"
    );

    Ok(Json(TagInvalidated {
        tag: tag.as_str(),
        removed,
    }))
}
