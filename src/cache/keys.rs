//! Cache key and tag definitions.
//!
//! `CacheKey` identifies one cached response; `CacheTag` groups keys so a
//! writer can invalidate every response that depends on a resource type.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Resource types exposed by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Authors,
    Books,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authors => "authors",
            Self::Books => "books",
        }
    }

    /// Singular label used in error messages.
    pub fn singular(self) -> &'static str {
        match self {
            Self::Authors => "author",
            Self::Books => "book",
        }
    }

    /// The invalidation tag owned by this resource type.
    pub fn tag(self) -> CacheTag {
        match self {
            Self::Authors => CacheTag::Authors,
            Self::Books => CacheTag::Books,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalidation group label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheTag {
    Authors,
    Books,
}

impl CacheTag {
    pub const ALL: [CacheTag; 2] = [CacheTag::Authors, CacheTag::Books];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authors => "authorsCache",
            Self::Books => "booksCache",
        }
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown cache tag `{0}`")]
pub struct UnknownTag(pub String);

impl FromStr for CacheTag {
    type Err = UnknownTag;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CacheTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == value)
            .ok_or_else(|| UnknownTag(value.to_string()))
    }
}

/// Cache entry identifier, derived from the shape of the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One page of a resource collection.
    List {
        resource: ResourceKind,
        page: u32,
        limit: u32,
    },
}

impl CacheKey {
    pub fn list(resource: ResourceKind, page: u32, limit: u32) -> Self {
        Self::List {
            resource,
            page,
            limit,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List {
                resource,
                page,
                limit,
            } => write!(f, "{resource}-{page}-{limit}"),
        }
    }
}
