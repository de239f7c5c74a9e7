use async_trait::async_trait;

use crate::{
    application::pagination::PageRequest,
    application::repos::{
        BooksRepo, BooksWriteRepo, CreateBookParams, RepoError, UpdateBookParams,
    },
    domain::entities::{AuthorSummary, BookRecord},
};

use super::{PostgresRepositories, map_sqlx_error, page_bounds};

const BOOK_PROJECTION: &str = "b.id, b.title, b.cover_text, \
    a.id AS author_id, a.first_name AS author_first_name, a.last_name AS author_last_name";

#[derive(sqlx::FromRow)]
struct BookRow {
    id: i64,
    title: String,
    cover_text: Option<String>,
    author_id: Option<i64>,
    author_first_name: Option<String>,
    author_last_name: Option<String>,
}

impl From<BookRow> for BookRecord {
    fn from(row: BookRow) -> Self {
        let author = match (row.author_id, row.author_first_name, row.author_last_name) {
            (Some(id), Some(first_name), Some(last_name)) => Some(AuthorSummary {
                id,
                first_name,
                last_name,
            }),
            _ => None,
        };

        Self {
            id: row.id,
            title: row.title,
            cover_text: row.cover_text,
            author,
        }
    }
}

#[async_trait]
impl BooksRepo for PostgresRepositories {
    async fn find_book(&self, id: i64) -> Result<Option<BookRecord>, RepoError> {
        let sql = format!(
            "SELECT {BOOK_PROJECTION} FROM books b \
             LEFT JOIN authors a ON a.id = b.author_id \
             WHERE b.id = $1"
        );

        let row = sqlx::query_as::<_, BookRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(BookRecord::from))
    }

    async fn list_books(&self, page: PageRequest) -> Result<Vec<BookRecord>, RepoError> {
        let (limit, offset) = page_bounds(page)?;
        let sql = format!(
            "SELECT {BOOK_PROJECTION} FROM books b \
             LEFT JOIN authors a ON a.id = b.author_id \
             ORDER BY b.id \
             LIMIT $1 OFFSET $2"
        );

        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(BookRecord::from).collect())
    }
}

#[async_trait]
impl BooksWriteRepo for PostgresRepositories {
    async fn create_book(&self, params: CreateBookParams) -> Result<BookRecord, RepoError> {
        let sql = format!(
            "WITH b AS ( \
                INSERT INTO books (title, cover_text, author_id) \
                VALUES ($1, $2, $3) \
                RETURNING id, title, cover_text, author_id \
             ) \
             SELECT {BOOK_PROJECTION} FROM b \
             LEFT JOIN authors a ON a.id = b.author_id"
        );

        let row = sqlx::query_as::<_, BookRow>(&sql)
            .bind(&params.title)
            .bind(&params.cover_text)
            .bind(params.author_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_book(&self, params: UpdateBookParams) -> Result<BookRecord, RepoError> {
        let sql = format!(
            "WITH b AS ( \
                UPDATE books \
                SET title = $2, cover_text = $3, author_id = $4 \
                WHERE id = $1 \
                RETURNING id, title, cover_text, author_id \
             ) \
             SELECT {BOOK_PROJECTION} FROM b \
             LEFT JOIN authors a ON a.id = b.author_id"
        );

        let row = sqlx::query_as::<_, BookRow>(&sql)
            .bind(params.id)
            .bind(&params.title)
            .bind(&params.cover_text)
            .bind(params.author_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn delete_book(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
