use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use super::*;
use crate::application::pagination::PaginationPolicy;
use crate::application::repos::{
    AuthorsRepo, AuthorsWriteRepo, BooksRepo, CreateAuthorParams,
};
use crate::cache::{CacheConfig, TagCache};
use crate::domain::entities::{AuthorRecord, BookRecord};
use crate::infra::memory::InMemoryRepositories;

/// Read side that counts list queries reaching the store.
struct CountingReads {
    inner: Arc<InMemoryRepositories>,
    author_lists: AtomicUsize,
    book_lists: AtomicUsize,
    delay: Duration,
}

impl CountingReads {
    fn new(inner: Arc<InMemoryRepositories>, delay: Duration) -> Self {
        Self {
            inner,
            author_lists: AtomicUsize::new(0),
            book_lists: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl AuthorsRepo for CountingReads {
    async fn find_author(&self, id: i64) -> Result<Option<AuthorRecord>, RepoError> {
        self.inner.find_author(id).await
    }

    async fn list_authors(&self, page: PageRequest) -> Result<Vec<AuthorRecord>, RepoError> {
        self.author_lists.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.list_authors(page).await
    }
}

#[async_trait]
impl BooksRepo for CountingReads {
    async fn find_book(&self, id: i64) -> Result<Option<BookRecord>, RepoError> {
        self.inner.find_book(id).await
    }

    async fn list_books(&self, page: PageRequest) -> Result<Vec<BookRecord>, RepoError> {
        self.book_lists.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.list_books(page).await
    }
}

struct Fixture {
    store: Arc<InMemoryRepositories>,
    reads: Arc<CountingReads>,
    cache: TagCache,
    authors: AuthorService,
    books: BookService,
}

fn fixture_with(delay: Duration, policy: UnknownAuthorPolicy) -> Fixture {
    let store = Arc::new(InMemoryRepositories::new());
    let reads = Arc::new(CountingReads::new(store.clone(), delay));
    let cache = TagCache::new(CacheConfig::default());
    let pagination = PaginationPolicy::default();

    let authors = AuthorService::new(reads.clone(), store.clone(), cache.clone(), pagination);
    let books = BookService::new(
        reads.clone(),
        store.clone(),
        reads.clone(),
        cache.clone(),
        pagination,
    )
    .with_author_policy(policy);

    Fixture {
        store,
        reads,
        cache,
        authors,
        books,
    }
}

fn fixture() -> Fixture {
    fixture_with(Duration::ZERO, UnknownAuthorPolicy::Detach)
}

fn author(first: &str, last: &str) -> AuthorCommand {
    AuthorCommand {
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
    }
}

fn book(title: &str, author_id: Option<i64>) -> BookCommand {
    BookCommand {
        title: Some(title.to_string()),
        cover_text: None,
        author_id: Some(author_id),
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &Bytes) -> T {
    serde_json::from_slice(bytes).expect("valid json page")
}

#[tokio::test]
async fn repeated_list_is_served_from_cache() {
    let fx = fixture();
    fx.authors.create(author("Ada", "Lovelace")).await.unwrap();

    let first = fx.authors.list(None, None).await.unwrap();
    let second = fx.authors.list(Some("1"), Some("3")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fx.reads.author_lists.load(Ordering::SeqCst), 1);
    assert!(fx.cache.contains_key(&CacheKey::list(ResourceKind::Authors, 1, 3)));
}

#[tokio::test]
async fn author_write_refreshes_both_collections() {
    let fx = fixture();
    let ada = fx.authors.create(author("Ada", "Lovelace")).await.unwrap();
    fx.books.create(book("Notes", Some(ada.id))).await.unwrap();

    fx.authors.list(None, None).await.unwrap();
    fx.books.list(None, None).await.unwrap();

    fx.authors
        .update(
            ada.id,
            AuthorCommand {
                first_name: Some("Augusta".to_string()),
                last_name: None,
            },
        )
        .await
        .unwrap();

    let authors: serde_json::Value = decode(&fx.authors.list(None, None).await.unwrap());
    let books: serde_json::Value = decode(&fx.books.list(None, None).await.unwrap());

    assert_eq!(authors[0]["firstName"], "Augusta");
    assert_eq!(authors[0]["lastName"], "Lovelace");
    assert_eq!(books[0]["author"]["firstName"], "Augusta");
    assert_eq!(fx.reads.author_lists.load(Ordering::SeqCst), 2);
    assert_eq!(fx.reads.book_lists.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_write_still_invalidates() {
    let fx = fixture();
    fx.authors.list(None, None).await.unwrap();

    let err = fx.authors.delete(404).await.unwrap_err();
    assert!(matches!(err, ResourceError::NotFound { .. }));

    fx.authors.list(None, None).await.unwrap();
    assert_eq!(fx.reads.author_lists.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_lists_share_one_store_query() {
    let fx = fixture_with(Duration::from_millis(50), UnknownAuthorPolicy::Detach);
    fx.store
        .create_author(CreateAuthorParams {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        })
        .await
        .unwrap();

    let pages = join_all((0..8).map(|_| fx.authors.list(None, None))).await;

    let first = pages[0].as_ref().unwrap().clone();
    assert!(pages.iter().all(|page| page.as_ref().unwrap() == &first));
    assert_eq!(fx.reads.author_lists.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_pagination_never_reaches_store() {
    let fx = fixture();

    let err = fx.books.list(Some("0"), None).await.unwrap_err();
    assert!(matches!(err, ResourceError::Pagination(_)));

    let err = fx.books.list(None, Some("1000")).await.unwrap_err();
    assert!(matches!(err, ResourceError::Pagination(_)));

    assert_eq!(fx.reads.book_lists.load(Ordering::SeqCst), 0);
    assert!(fx.cache.is_empty());
}

#[tokio::test]
async fn create_rejects_blank_names() {
    let fx = fixture();

    let err = fx.authors.create(author("  ", "")).await.unwrap_err();
    let ResourceError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    let fields: Vec<_> = errors.violations.iter().map(|v| v.field).collect();
    assert_eq!(fields, ["firstName", "lastName"]);
}

#[tokio::test]
async fn book_update_keeps_author_when_absent() {
    let fx = fixture();
    let ada = fx.authors.create(author("Ada", "Lovelace")).await.unwrap();
    let created = fx.books.create(book("Notes", Some(ada.id))).await.unwrap();

    let updated = fx
        .books
        .update(
            created.id,
            BookCommand {
                title: Some("Sketch of the Analytical Engine".to_string()),
                cover_text: Some(Some("Translated, with notes".to_string())),
                author_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.author_id(), Some(ada.id));
    assert_eq!(updated.cover_text.as_deref(), Some("Translated, with notes"));
}

#[tokio::test]
async fn book_update_can_clear_author() {
    let fx = fixture();
    let ada = fx.authors.create(author("Ada", "Lovelace")).await.unwrap();
    let created = fx.books.create(book("Notes", Some(ada.id))).await.unwrap();

    let updated = fx
        .books
        .update(
            created.id,
            BookCommand {
                author_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.author_id(), None);
    assert_eq!(updated.title, "Notes");
}

#[tokio::test]
async fn unknown_author_is_detached_by_default() {
    let fx = fixture();

    let created = fx.books.create(book("Orphan", Some(77))).await.unwrap();
    assert!(created.author.is_none());
}

#[tokio::test]
async fn unknown_author_can_be_rejected() {
    let fx = fixture_with(Duration::ZERO, UnknownAuthorPolicy::Reject);

    let err = fx.books.create(book("Orphan", Some(77))).await.unwrap_err();
    let ResourceError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.violations[0].field, "idAuthor");
}

#[tokio::test]
async fn get_missing_record_is_not_found() {
    let fx = fixture();

    let err = fx.books.get(9).await.unwrap_err();
    assert!(matches!(
        err,
        ResourceError::NotFound {
            resource: ResourceKind::Books
        }
    ));
}
