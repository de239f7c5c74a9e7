//! Books handlers

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;

use crate::application::api_keys::ApiPrincipal;
use crate::cache::ResourceKind;
use crate::domain::api_keys::Capability;

use super::{auth_to_api, json_bytes, json_rejection, parse_id, resource_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn list_books(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    principal
        .requires(Capability::Read)
        .map_err(auth_to_api)?;

    let payload = state
        .books
        .list(query.page.as_deref(), query.limit.as_deref())
        .await
        .map_err(resource_to_api)?;

    Ok(json_bytes(payload))
}

pub async fn get_book(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    principal
        .requires(Capability::Read)
        .map_err(auth_to_api)?;
    let id = parse_id(&id)?;

    let book = state.books.get(id).await.map_err(resource_to_api)?;
    Ok(Json(book))
}

pub async fn create_book(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    payload: Result<Json<BookRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    principal
        .requires(Capability::Manage)
        .map_err(auth_to_api)?;
    let Json(payload) = payload.map_err(json_rejection)?;

    let book = state
        .books
        .create(payload.into())
        .await
        .map_err(resource_to_api)?;
    let location = state.location(ResourceKind::Books, book.id);

    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(book)))
}

pub async fn update_book(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    Path(id): Path<String>,
    payload: Result<Json<BookRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    principal
        .requires(Capability::Write)
        .map_err(auth_to_api)?;
    let id = parse_id(&id)?;
    let Json(payload) = payload.map_err(json_rejection)?;

    state
        .books
        .update(id, payload.into())
        .await
        .map_err(resource_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_book(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    principal
        .requires(Capability::Manage)
        .map_err(auth_to_api)?;
    let id = parse_id(&id)?;

    state.books.delete(id).await.map_err(resource_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}
