//! Domain entities mirrored from persistent storage.
//!
//! Records serialize directly into the API projections: authors embed their
//! books and books embed their author, each as a flat summary.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub books: Vec<BookSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub id: i64,
    pub title: String,
    pub cover_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub cover_text: Option<String>,
    pub author: Option<AuthorSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl AuthorRecord {
    pub fn summary(&self) -> AuthorSummary {
        AuthorSummary {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

impl BookRecord {
    pub fn summary(&self) -> BookSummary {
        BookSummary {
            id: self.id,
            title: self.title.clone(),
            cover_text: self.cover_text.clone(),
        }
    }

    pub fn author_id(&self) -> Option<i64> {
        self.author.as_ref().map(|author| author.id)
    }
}
