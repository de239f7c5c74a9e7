//! API handlers organized by resource type.
//!
//! Each submodule contains handlers for one resource. Helper functions for
//! error conversion are defined here and shared across modules.

mod authors;
mod books;
mod cache;

pub use authors::*;
pub use books::*;
pub use cache::*;

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::application::api_keys::ApiAuthError;
use crate::application::repos::RepoError;
use crate::application::resources::{PageLoadError, ResourceError};
use crate::cache::CacheError;
use crate::domain::validation::FieldViolation;

use super::error::{ApiError, codes};

/// Record ids that do not parse cannot exist.
pub(crate) fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::not_found("resource not found"))
}

/// A cached collection page, already serialized.
pub(crate) fn json_bytes(payload: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], payload).into_response()
}

pub(crate) fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request("Malformed JSON body", Some(rejection.body_text()))
}

pub(crate) fn auth_to_api(err: ApiAuthError) -> ApiError {
    match err {
        ApiAuthError::Missing | ApiAuthError::Invalid => ApiError::unauthorized(),
        ApiAuthError::Forbidden(_) => ApiError::forbidden(),
    }
}

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(msg) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(msg),
        ),
    }
}

pub(crate) fn cache_to_api(err: CacheError) -> ApiError {
    let load_error = err
        .producer_error()
        .and_then(|source| source.downcast_ref::<PageLoadError>());

    match (&err, load_error) {
        (CacheError::Timeout(elapsed), _) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::CACHE_TIMEOUT,
            "Timed out computing response",
            Some(format!("producer exceeded {elapsed:?}")),
        ),
        (_, Some(PageLoadError::Repo(RepoError::Timeout))) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        (_, Some(source)) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::CACHE,
            "Failed to compute response",
            Some(format!("{source}: {}", describe_source(source))),
        ),
        (_, None) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::CACHE,
            "Failed to compute response",
            Some(err.to_string()),
        ),
    }
}

fn describe_source(err: &PageLoadError) -> String {
    match err {
        PageLoadError::Repo(repo) => repo.to_string(),
        PageLoadError::Encode(encode) => encode.to_string(),
    }
}

pub(crate) fn resource_to_api(err: ResourceError) -> ApiError {
    match err {
        ResourceError::NotFound { .. } => ApiError::not_found("resource not found"),
        ResourceError::Validation(errors) => ApiError::validation(
            codes::VALIDATION_FAILED,
            "Validation failed",
            errors.violations,
        ),
        ResourceError::Pagination(err) => ApiError::validation(
            codes::INVALID_PAGINATION,
            "Invalid pagination parameters",
            vec![FieldViolation {
                field: err.field(),
                message: err.to_string(),
            }],
        ),
        ResourceError::Repo(repo) => repo_to_api(repo),
        ResourceError::Cache(cache) => cache_to_api(cache),
    }
}
