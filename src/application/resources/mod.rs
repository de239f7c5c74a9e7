//! Author and book services.
//!
//! Collection reads go through the shared [`TagCache`]; single-record reads
//! hit the store directly. Every write runs the store mutation first and then
//! invalidates the tag owned by its resource type, whether or not the
//! mutation succeeded.

use std::future::Future;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::application::pagination::{PageRequest, PaginationError};
use crate::application::repos::RepoError;
use crate::cache::{CacheError, CacheKey, CacheTag, ResourceKind, TagCache};
use crate::domain::validation::ValidationErrors;

mod authors;
mod books;

pub use authors::{AuthorCommand, AuthorService};
pub use books::{BookCommand, BookService, UnknownAuthorPolicy};

/// Tags carried by every collection page. Author pages embed books and book
/// pages embed authors, so a write to either type makes both stale.
pub const LIST_TAGS: [CacheTag; 2] = CacheTag::ALL;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{} not found", .resource.singular())]
    NotFound { resource: ResourceKind },
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error(transparent)]
    Repo(RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ResourceError {
    pub fn not_found(resource: ResourceKind) -> Self {
        Self::NotFound { resource }
    }

    /// Map a store error, turning missing rows into a resource-level not found.
    pub(crate) fn from_repo(resource: ResourceKind, err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found(resource),
            other => Self::Repo(other),
        }
    }
}

/// Failure raised while producing a cached page.
#[derive(Debug, Error)]
pub enum PageLoadError {
    #[error("failed to load page from the store")]
    Repo(#[source] RepoError),
    #[error("failed to encode page")]
    Encode(#[source] serde_json::Error),
}

/// Serve one collection page through the cache.
pub(crate) async fn cached_page<R, L, Fut>(
    cache: &TagCache,
    resource: ResourceKind,
    request: PageRequest,
    load: L,
) -> Result<Bytes, ResourceError>
where
    R: Serialize + Send + 'static,
    L: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<R>, RepoError>> + Send + 'static,
{
    let key = CacheKey::list(resource, request.page.get(), request.limit.get());

    cache
        .get_or_compute(key, &LIST_TAGS, move || async move {
            let records = load().await.map_err(PageLoadError::Repo)?;
            serde_json::to_vec(&records)
                .map(Bytes::from)
                .map_err(PageLoadError::Encode)
        })
        .await
        .map_err(ResourceError::from)
}

/// Collapse the outcome of a store mutation after its tag was invalidated.
pub(crate) fn settle<T>(
    resource: ResourceKind,
    outcome: Result<T, RepoError>,
) -> Result<T, ResourceError> {
    outcome.map_err(|err| ResourceError::from_repo(resource, err))
}

#[cfg(test)]
mod tests;
