use serde::{Deserialize, Deserializer, Serialize};

use crate::application::resources::{AuthorCommand, BookCommand};

/// Distinguish an explicit `null` from an absent field.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Required text sent as `null` becomes blank so validation rejects it.
fn null_as_blank(field: Option<Option<String>>) -> Option<String> {
    field.map(Option::unwrap_or_default)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub last_name: Option<Option<String>>,
}

impl From<AuthorRequest> for AuthorCommand {
    fn from(request: AuthorRequest) -> Self {
        Self {
            first_name: null_as_blank(request.first_name),
            last_name: null_as_blank(request.last_name),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub cover_text: Option<Option<String>>,
    #[serde(default, rename = "idAuthor", deserialize_with = "nullable")]
    pub author_id: Option<Option<i64>>,
}

impl From<BookRequest> for BookCommand {
    fn from(request: BookRequest) -> Self {
        Self {
            title: null_as_blank(request.title),
            cover_text: request.cover_text,
            author_id: request.author_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TagInvalidated {
    pub tag: &'static str,
    pub removed: usize,
}
