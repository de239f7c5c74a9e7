use std::sync::Arc;

use crate::application::api_keys::{ApiKeyService, ConfiguredKey};
use crate::application::pagination::PaginationPolicy;
use crate::application::repos::{
    AuthorsRepo, AuthorsWriteRepo, BooksRepo, BooksWriteRepo, EntityStore, StoreHealth,
};
use crate::application::resources::{AuthorService, BookService};
use crate::cache::{CacheConfig, ResourceKind, TagCache};
use crate::config::Settings;

#[derive(Clone)]
pub struct ApiState {
    pub api_keys: Arc<ApiKeyService>,
    pub authors: Arc<AuthorService>,
    pub books: Arc<BookService>,
    pub cache: TagCache,
    pub health: Arc<dyn StoreHealth>,
    pub public_base_url: String,
}

impl ApiState {
    /// Canonical URL of a single record, used for `Location` headers.
    pub fn location(&self, resource: ResourceKind, id: i64) -> String {
        format!(
            "{}/api/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            resource,
            id
        )
    }
}

/// Wire services over a store backend using the resolved settings.
pub fn build_api_state<S: EntityStore>(store: Arc<S>, settings: &Settings) -> ApiState {
    let authors_repo: Arc<dyn AuthorsRepo> = store.clone();
    let authors_write_repo: Arc<dyn AuthorsWriteRepo> = store.clone();
    let books_repo: Arc<dyn BooksRepo> = store.clone();
    let books_write_repo: Arc<dyn BooksWriteRepo> = store.clone();
    let health: Arc<dyn StoreHealth> = store;

    let cache = TagCache::new(CacheConfig::from(&settings.cache));
    let pagination = PaginationPolicy {
        default_limit: settings.pagination.default_limit,
        max_limit: settings.pagination.max_limit,
    };

    let authors = AuthorService::new(
        authors_repo.clone(),
        authors_write_repo,
        cache.clone(),
        pagination,
    );
    let books = BookService::new(
        books_repo,
        books_write_repo,
        authors_repo,
        cache.clone(),
        pagination,
    )
    .with_author_policy(settings.books.unknown_author);

    let keys = settings
        .auth
        .keys
        .iter()
        .map(|key| ConfiguredKey {
            name: key.name.clone(),
            token: key.token.clone(),
            role: key.role,
        })
        .collect();

    ApiState {
        api_keys: Arc::new(ApiKeyService::new(keys, settings.auth.public_reads)),
        authors: Arc::new(authors),
        books: Arc::new(books),
        cache,
        health,
        public_base_url: settings.server.public_base_url.clone(),
    }
}
