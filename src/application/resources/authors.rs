use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::application::pagination::PaginationPolicy;
use crate::application::repos::{
    AuthorsRepo, AuthorsWriteRepo, CreateAuthorParams, UpdateAuthorParams,
};
use crate::cache::{ResourceKind, TagCache};
use crate::domain::entities::AuthorRecord;
use crate::domain::validation::validate_author;

use super::{ResourceError, cached_page, settle};

const RESOURCE: ResourceKind = ResourceKind::Authors;

/// Author fields supplied by a client. Absent fields are left unchanged on
/// update and treated as blank on create.
#[derive(Debug, Clone, Default)]
pub struct AuthorCommand {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Clone)]
pub struct AuthorService {
    reader: Arc<dyn AuthorsRepo>,
    writer: Arc<dyn AuthorsWriteRepo>,
    cache: TagCache,
    pagination: PaginationPolicy,
}

impl AuthorService {
    pub fn new(
        reader: Arc<dyn AuthorsRepo>,
        writer: Arc<dyn AuthorsWriteRepo>,
        cache: TagCache,
        pagination: PaginationPolicy,
    ) -> Self {
        Self {
            reader,
            writer,
            cache,
            pagination,
        }
    }

    /// Serialized page of authors, served from the cache when present.
    pub async fn list(
        &self,
        page: Option<&str>,
        limit: Option<&str>,
    ) -> Result<Bytes, ResourceError> {
        let request = self.pagination.parse(page, limit)?;
        let reader = Arc::clone(&self.reader);

        cached_page(&self.cache, RESOURCE, request, move || async move {
            reader.list_authors(request).await
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<AuthorRecord, ResourceError> {
        self.reader
            .find_author(id)
            .await
            .map_err(|err| ResourceError::from_repo(RESOURCE, err))?
            .ok_or_else(|| ResourceError::not_found(RESOURCE))
    }

    pub async fn create(&self, command: AuthorCommand) -> Result<AuthorRecord, ResourceError> {
        let first_name = command.first_name.unwrap_or_default();
        let last_name = command.last_name.unwrap_or_default();
        validate_author(&first_name, &last_name)?;

        let outcome = self
            .writer
            .create_author(CreateAuthorParams {
                first_name: first_name.trim().to_string(),
                last_name: last_name.trim().to_string(),
            })
            .await;
        self.invalidate();

        let record = settle(RESOURCE, outcome)?;
        debug!(author_id = record.id, "author created");
        Ok(record)
    }

    pub async fn update(
        &self,
        id: i64,
        command: AuthorCommand,
    ) -> Result<AuthorRecord, ResourceError> {
        let existing = self.get(id).await?;

        let first_name = command.first_name.unwrap_or(existing.first_name);
        let last_name = command.last_name.unwrap_or(existing.last_name);
        validate_author(&first_name, &last_name)?;

        let outcome = self
            .writer
            .update_author(UpdateAuthorParams {
                id,
                first_name: first_name.trim().to_string(),
                last_name: last_name.trim().to_string(),
            })
            .await;
        self.invalidate();

        settle(RESOURCE, outcome)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ResourceError> {
        let outcome = self.writer.delete_author(id).await;
        self.invalidate();

        settle(RESOURCE, outcome)?;
        debug!(author_id = id, "author deleted");
        Ok(())
    }

    fn invalidate(&self) {
        self.cache.invalidate_tag(RESOURCE.tag());
    }
}
