//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::PageRequest;
use crate::domain::entities::{AuthorRecord, BookRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateAuthorParams {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone)]
pub struct UpdateAuthorParams {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone)]
pub struct CreateBookParams {
    pub title: String,
    pub cover_text: Option<String>,
    pub author_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct UpdateBookParams {
    pub id: i64,
    pub title: String,
    pub cover_text: Option<String>,
    pub author_id: Option<i64>,
}

#[async_trait]
pub trait AuthorsRepo: Send + Sync {
    async fn find_author(&self, id: i64) -> Result<Option<AuthorRecord>, RepoError>;

    /// One page of authors ordered by id, each with its books.
    async fn list_authors(&self, page: PageRequest) -> Result<Vec<AuthorRecord>, RepoError>;
}

#[async_trait]
pub trait AuthorsWriteRepo: Send + Sync {
    async fn create_author(&self, params: CreateAuthorParams) -> Result<AuthorRecord, RepoError>;

    async fn update_author(&self, params: UpdateAuthorParams) -> Result<AuthorRecord, RepoError>;

    /// Remove an author. Books written by the author are kept and detached.
    async fn delete_author(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait BooksRepo: Send + Sync {
    async fn find_book(&self, id: i64) -> Result<Option<BookRecord>, RepoError>;

    /// One page of books ordered by id, each with its author.
    async fn list_books(&self, page: PageRequest) -> Result<Vec<BookRecord>, RepoError>;
}

#[async_trait]
pub trait BooksWriteRepo: Send + Sync {
    async fn create_book(&self, params: CreateBookParams) -> Result<BookRecord, RepoError>;

    async fn update_book(&self, params: UpdateBookParams) -> Result<BookRecord, RepoError>;

    async fn delete_book(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}

/// Every persistence concern a store backend must provide.
pub trait EntityStore:
    AuthorsRepo + AuthorsWriteRepo + BooksRepo + BooksWriteRepo + StoreHealth + 'static
{
}

impl<T> EntityStore for T where
    T: AuthorsRepo + AuthorsWriteRepo + BooksRepo + BooksWriteRepo + StoreHealth + 'static
{
}
