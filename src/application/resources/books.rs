use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::application::pagination::PaginationPolicy;
use crate::application::repos::{
    AuthorsRepo, BooksRepo, BooksWriteRepo, CreateBookParams, UpdateBookParams,
};
use crate::cache::{ResourceKind, TagCache};
use crate::domain::entities::BookRecord;
use crate::domain::validation::{ValidationErrors, validate_book};

use super::{ResourceError, cached_page, settle};

const RESOURCE: ResourceKind = ResourceKind::Books;

/// What to do when a book references an author that does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownAuthorPolicy {
    /// Store the book without an author.
    #[default]
    Detach,
    /// Fail validation on `idAuthor`.
    Reject,
}

/// Book fields supplied by a client.
///
/// The nullable fields distinguish "absent" (`None`) from "explicitly null"
/// (`Some(None)`): on update an absent `author_id` keeps the current author
/// while an explicit null detaches it.
#[derive(Debug, Clone, Default)]
pub struct BookCommand {
    pub title: Option<String>,
    pub cover_text: Option<Option<String>>,
    pub author_id: Option<Option<i64>>,
}

#[derive(Clone)]
pub struct BookService {
    reader: Arc<dyn BooksRepo>,
    writer: Arc<dyn BooksWriteRepo>,
    authors: Arc<dyn AuthorsRepo>,
    cache: TagCache,
    pagination: PaginationPolicy,
    author_policy: UnknownAuthorPolicy,
}

impl BookService {
    pub fn new(
        reader: Arc<dyn BooksRepo>,
        writer: Arc<dyn BooksWriteRepo>,
        authors: Arc<dyn AuthorsRepo>,
        cache: TagCache,
        pagination: PaginationPolicy,
    ) -> Self {
        Self {
            reader,
            writer,
            authors,
            cache,
            pagination,
            author_policy: UnknownAuthorPolicy::default(),
        }
    }

    pub fn with_author_policy(mut self, policy: UnknownAuthorPolicy) -> Self {
        self.author_policy = policy;
        self
    }

    /// Serialized page of books, served from the cache when present.
    pub async fn list(
        &self,
        page: Option<&str>,
        limit: Option<&str>,
    ) -> Result<Bytes, ResourceError> {
        let request = self.pagination.parse(page, limit)?;
        let reader = Arc::clone(&self.reader);

        cached_page(&self.cache, RESOURCE, request, move || async move {
            reader.list_books(request).await
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<BookRecord, ResourceError> {
        self.reader
            .find_book(id)
            .await
            .map_err(|err| ResourceError::from_repo(RESOURCE, err))?
            .ok_or_else(|| ResourceError::not_found(RESOURCE))
    }

    pub async fn create(&self, command: BookCommand) -> Result<BookRecord, ResourceError> {
        let title = command.title.unwrap_or_default();
        let cover_text = command.cover_text.flatten();

        let mut errors = collect(validate_book(&title, cover_text.as_deref()));
        let author_id = self
            .resolve_author(command.author_id.flatten(), &mut errors)
            .await?;
        errors.into_result()?;

        let outcome = self
            .writer
            .create_book(CreateBookParams {
                title: title.trim().to_string(),
                cover_text,
                author_id,
            })
            .await;
        self.invalidate();

        let record = settle(RESOURCE, outcome)?;
        debug!(book_id = record.id, author_id = ?record.author_id(), "book created");
        Ok(record)
    }

    pub async fn update(&self, id: i64, command: BookCommand) -> Result<BookRecord, ResourceError> {
        let existing = self.get(id).await?;

        let title = command.title.unwrap_or_else(|| existing.title.clone());
        let cover_text = command
            .cover_text
            .unwrap_or_else(|| existing.cover_text.clone());

        let mut errors = collect(validate_book(&title, cover_text.as_deref()));
        let author_id = match command.author_id {
            None => existing.author_id(),
            Some(requested) => self.resolve_author(requested, &mut errors).await?,
        };
        errors.into_result()?;

        let outcome = self
            .writer
            .update_book(UpdateBookParams {
                id,
                title: title.trim().to_string(),
                cover_text,
                author_id,
            })
            .await;
        self.invalidate();

        settle(RESOURCE, outcome)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ResourceError> {
        let outcome = self.writer.delete_book(id).await;
        self.invalidate();

        settle(RESOURCE, outcome)?;
        debug!(book_id = id, "book deleted");
        Ok(())
    }

    /// Look up a referenced author and apply the unknown-author policy.
    async fn resolve_author(
        &self,
        requested: Option<i64>,
        errors: &mut ValidationErrors,
    ) -> Result<Option<i64>, ResourceError> {
        let Some(author_id) = requested else {
            return Ok(None);
        };

        let found = self
            .authors
            .find_author(author_id)
            .await
            .map_err(ResourceError::Repo)?;
        if found.is_some() {
            return Ok(Some(author_id));
        }

        match self.author_policy {
            UnknownAuthorPolicy::Detach => {
                warn!(author_id, "book references unknown author; storing without author");
                Ok(None)
            }
            UnknownAuthorPolicy::Reject => {
                errors.push("idAuthor", format!("author {author_id} does not exist"));
                Ok(None)
            }
        }
    }

    fn invalidate(&self) {
        self.cache.invalidate_tag(RESOURCE.tag());
    }
}

fn collect(outcome: Result<(), ValidationErrors>) -> ValidationErrors {
    outcome.err().unwrap_or_default()
}
