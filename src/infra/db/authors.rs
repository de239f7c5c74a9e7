use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    application::pagination::PageRequest,
    application::repos::{
        AuthorsRepo, AuthorsWriteRepo, CreateAuthorParams, RepoError, UpdateAuthorParams,
    },
    domain::entities::{AuthorRecord, BookSummary},
};

use super::{PostgresRepositories, map_sqlx_error, page_bounds};

#[derive(sqlx::FromRow)]
struct AuthorRow {
    id: i64,
    first_name: String,
    last_name: String,
}

#[derive(sqlx::FromRow)]
struct AuthorBookRow {
    id: i64,
    title: String,
    cover_text: Option<String>,
    author_id: i64,
}

impl AuthorRow {
    fn into_record(self, books: Vec<BookSummary>) -> AuthorRecord {
        AuthorRecord {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            books,
        }
    }
}

impl From<AuthorBookRow> for BookSummary {
    fn from(row: AuthorBookRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            cover_text: row.cover_text,
        }
    }
}

impl PostgresRepositories {
    async fn books_by_author(
        &self,
        author_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<BookSummary>>, RepoError> {
        if author_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, AuthorBookRow>(
            r#"
            SELECT id, title, cover_text, author_id
            FROM books
            WHERE author_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(author_ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut grouped: HashMap<i64, Vec<BookSummary>> = HashMap::new();
        for row in rows {
            grouped.entry(row.author_id).or_default().push(row.into());
        }
        Ok(grouped)
    }

    async fn attach_books(&self, row: AuthorRow) -> Result<AuthorRecord, RepoError> {
        let mut books = self.books_by_author(&[row.id]).await?;
        let own = books.remove(&row.id).unwrap_or_default();
        Ok(row.into_record(own))
    }
}

#[async_trait]
impl AuthorsRepo for PostgresRepositories {
    async fn find_author(&self, id: i64) -> Result<Option<AuthorRecord>, RepoError> {
        let row = sqlx::query_as::<_, AuthorRow>(
            r#"
            SELECT id, first_name, last_name
            FROM authors
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => self.attach_books(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_authors(&self, page: PageRequest) -> Result<Vec<AuthorRecord>, RepoError> {
        let (limit, offset) = page_bounds(page)?;

        let rows = sqlx::query_as::<_, AuthorRow>(
            r#"
            SELECT id, first_name, last_name
            FROM authors
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut books = self.books_by_author(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let own = books.remove(&row.id).unwrap_or_default();
                row.into_record(own)
            })
            .collect())
    }
}

#[async_trait]
impl AuthorsWriteRepo for PostgresRepositories {
    async fn create_author(&self, params: CreateAuthorParams) -> Result<AuthorRecord, RepoError> {
        let row = sqlx::query_as::<_, AuthorRow>(
            r#"
            INSERT INTO authors (first_name, last_name)
            VALUES ($1, $2)
            RETURNING id, first_name, last_name
            "#,
        )
        .bind(&params.first_name)
        .bind(&params.last_name)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into_record(Vec::new()))
    }

    async fn update_author(&self, params: UpdateAuthorParams) -> Result<AuthorRecord, RepoError> {
        let row = sqlx::query_as::<_, AuthorRow>(
            r#"
            UPDATE authors
            SET first_name = $2, last_name = $3
            WHERE id = $1
            RETURNING id, first_name, last_name
            "#,
        )
        .bind(params.id)
        .bind(&params.first_name)
        .bind(&params.last_name)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        self.attach_books(row).await
    }

    async fn delete_author(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
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
