//! In-process store used when no database is configured.
//!
//! Mirrors the Postgres schema: books reference authors by id and are
//! detached when their author is deleted.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::pagination::PageRequest;
use crate::application::repos::{
    AuthorsRepo, AuthorsWriteRepo, BooksRepo, BooksWriteRepo, CreateAuthorParams,
    CreateBookParams, RepoError, StoreHealth, UpdateAuthorParams, UpdateBookParams,
};
use crate::domain::entities::{AuthorRecord, AuthorSummary, BookRecord, BookSummary};

#[derive(Debug, Clone)]
struct AuthorRow {
    first_name: String,
    last_name: String,
}

#[derive(Debug, Clone)]
struct BookRow {
    title: String,
    cover_text: Option<String>,
    author_id: Option<i64>,
}

#[derive(Debug, Default)]
struct MemoryState {
    authors: BTreeMap<i64, AuthorRow>,
    books: BTreeMap<i64, BookRow>,
    next_author_id: i64,
    next_book_id: i64,
}

impl MemoryState {
    fn author_record(&self, id: i64, row: &AuthorRow) -> AuthorRecord {
        let books = self
            .books
            .iter()
            .filter(|(_, book)| book.author_id == Some(id))
            .map(|(book_id, book)| BookSummary {
                id: *book_id,
                title: book.title.clone(),
                cover_text: book.cover_text.clone(),
            })
            .collect();

        AuthorRecord {
            id,
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            books,
        }
    }

    fn book_record(&self, id: i64, row: &BookRow) -> BookRecord {
        let author = row.author_id.and_then(|author_id| {
            self.authors.get(&author_id).map(|author| AuthorSummary {
                id: author_id,
                first_name: author.first_name.clone(),
                last_name: author.last_name.clone(),
            })
        });

        BookRecord {
            id,
            title: row.title.clone(),
            cover_text: row.cover_text.clone(),
            author,
        }
    }

    fn ensure_author(&self, author_id: Option<i64>) -> Result<(), RepoError> {
        match author_id {
            Some(id) if !self.authors.contains_key(&id) => Err(RepoError::InvalidInput {
                message: format!("author {id} does not exist"),
            }),
            _ => Ok(()),
        }
    }
}

fn page_window(page: PageRequest) -> (usize, usize) {
    let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let take = usize::try_from(page.limit.get()).unwrap_or(usize::MAX);
    (skip, take)
}

#[derive(Debug, Default)]
pub struct InMemoryRepositories {
    state: RwLock<MemoryState>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorsRepo for InMemoryRepositories {
    async fn find_author(&self, id: i64) -> Result<Option<AuthorRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .authors
            .get(&id)
            .map(|row| state.author_record(id, row)))
    }

    async fn list_authors(&self, page: PageRequest) -> Result<Vec<AuthorRecord>, RepoError> {
        let state = self.state.read().await;
        let (skip, take) = page_window(page);
        Ok(state
            .authors
            .iter()
            .skip(skip)
            .take(take)
            .map(|(id, row)| state.author_record(*id, row))
            .collect())
    }
}

#[async_trait]
impl AuthorsWriteRepo for InMemoryRepositories {
    async fn create_author(&self, params: CreateAuthorParams) -> Result<AuthorRecord, RepoError> {
        let mut state = self.state.write().await;
        state.next_author_id += 1;
        let id = state.next_author_id;
        let row = AuthorRow {
            first_name: params.first_name,
            last_name: params.last_name,
        };
        let record = state.author_record(id, &row);
        state.authors.insert(id, row);
        Ok(record)
    }

    async fn update_author(&self, params: UpdateAuthorParams) -> Result<AuthorRecord, RepoError> {
        let mut state = self.state.write().await;
        let row = state
            .authors
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        row.first_name = params.first_name;
        row.last_name = params.last_name;
        let row = row.clone();
        Ok(state.author_record(params.id, &row))
    }

    async fn delete_author(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        state.authors.remove(&id).ok_or(RepoError::NotFound)?;
        for book in state.books.values_mut() {
            if book.author_id == Some(id) {
                book.author_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BooksRepo for InMemoryRepositories {
    async fn find_book(&self, id: i64) -> Result<Option<BookRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.books.get(&id).map(|row| state.book_record(id, row)))
    }

    async fn list_books(&self, page: PageRequest) -> Result<Vec<BookRecord>, RepoError> {
        let state = self.state.read().await;
        let (skip, take) = page_window(page);
        Ok(state
            .books
            .iter()
            .skip(skip)
            .take(take)
            .map(|(id, row)| state.book_record(*id, row))
            .collect())
    }
}

#[async_trait]
impl BooksWriteRepo for InMemoryRepositories {
    async fn create_book(&self, params: CreateBookParams) -> Result<BookRecord, RepoError> {
        let mut state = self.state.write().await;
        state.ensure_author(params.author_id)?;
        state.next_book_id += 1;
        let id = state.next_book_id;
        let row = BookRow {
            title: params.title,
            cover_text: params.cover_text,
            author_id: params.author_id,
        };
        let record = state.book_record(id, &row);
        state.books.insert(id, row);
        Ok(record)
    }

    async fn update_book(&self, params: UpdateBookParams) -> Result<BookRecord, RepoError> {
        let mut state = self.state.write().await;
        if !state.books.contains_key(&params.id) {
            return Err(RepoError::NotFound);
        }
        state.ensure_author(params.author_id)?;

        let row = BookRow {
            title: params.title,
            cover_text: params.cover_text,
            author_id: params.author_id,
        };
        let record = state.book_record(params.id, &row);
        state.books.insert(params.id, row);
        Ok(record)
    }

    async fn delete_book(&self, id: i64) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        state
            .books
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl StoreHealth for InMemoryRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    fn page(page: u32, limit: u32) -> PageRequest {
        PageRequest::new(
            NonZeroU32::new(page).expect("page"),
            NonZeroU32::new(limit).expect("limit"),
        )
    }

    async fn seeded() -> InMemoryRepositories {
        let store = InMemoryRepositories::new();
        for i in 1..=2 {
            store
                .create_author(CreateAuthorParams {
                    first_name: format!("Prénom {i}"),
                    last_name: format!("Nom {i}"),
                })
                .await
                .expect("author");
        }
        for i in 1..=5 {
            store
                .create_book(CreateBookParams {
                    title: format!("Live {i}"),
                    cover_text: Some(format!("Quatrième de couverture numéro : {i}")),
                    author_id: Some(if i % 2 == 0 { 2 } else { 1 }),
                })
                .await
                .expect("book");
        }
        store
    }

    #[tokio::test]
    async fn list_pages_are_ordered_and_bounded() {
        let store = seeded().await;

        let first = store.list_books(page(1, 3)).await.expect("page 1");
        let ids: Vec<_> = first.iter().map(|book| book.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let second = store.list_books(page(2, 3)).await.expect("page 2");
        let ids: Vec<_> = second.iter().map(|book| book.id).collect();
        assert_eq!(ids, vec![4, 5]);

        assert!(store.list_books(page(3, 3)).await.expect("page 3").is_empty());
    }

    #[tokio::test]
    async fn authors_embed_their_books() {
        let store = seeded().await;
        let author = store.find_author(1).await.expect("find").expect("exists");
        let titles: Vec<_> = author.books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Live 1", "Live 3", "Live 5"]);
    }

    #[tokio::test]
    async fn deleting_author_detaches_books() {
        let store = seeded().await;
        store.delete_author(2).await.expect("delete");

        let book = store.find_book(2).await.expect("find").expect("exists");
        assert_eq!(book.author, None);
        assert!(matches!(
            store.delete_author(2).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_author_reference_is_rejected() {
        let store = seeded().await;
        let err = store
            .create_book(CreateBookParams {
                title: "Orphan".to_string(),
                cover_text: None,
                author_id: Some(99),
            })
            .await
            .expect_err("unknown author");
        assert!(matches!(err, RepoError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn missing_rows_report_not_found() {
        let store = seeded().await;
        assert!(store.find_book(42).await.expect("find").is_none());
        assert!(matches!(store.delete_book(42).await, Err(RepoError::NotFound)));
        assert!(matches!(
            store
                .update_author(UpdateAuthorParams {
                    id: 42,
                    first_name: "A".to_string(),
                    last_name: "B".to_string(),
                })
                .await,
            Err(RepoError::NotFound)
        ));
    }
}
