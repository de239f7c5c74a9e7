//! Page-number pagination for collection endpoints.

use std::num::NonZeroU32;

use thiserror::Error;

pub const DEFAULT_PAGE: NonZeroU32 = NonZeroU32::MIN;
pub const DEFAULT_LIMIT: NonZeroU32 = match NonZeroU32::new(3) {
    Some(limit) => limit,
    None => NonZeroU32::MIN,
};
pub const DEFAULT_MAX_LIMIT: NonZeroU32 = match NonZeroU32::new(100) {
    Some(limit) => limit,
    None => NonZeroU32::MIN,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("`{field}` must be a positive integer, got `{value}`")]
    NotPositiveInteger { field: &'static str, value: String },
    #[error("`limit` must be at most {max}, got {value}")]
    LimitTooLarge { max: u32, value: u32 },
}

impl PaginationError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::NotPositiveInteger { field, .. } => field,
            Self::LimitTooLarge { .. } => "limit",
        }
    }
}

/// A validated page request. Page numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: NonZeroU32,
    pub limit: NonZeroU32,
}

impl PageRequest {
    pub fn new(page: NonZeroU32, limit: NonZeroU32) -> Self {
        Self { page, limit }
    }

    /// Number of rows preceding this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.get() - 1) * u64::from(self.limit.get())
    }
}

/// Defaults and bounds applied to raw query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationPolicy {
    pub default_limit: NonZeroU32,
    pub max_limit: NonZeroU32,
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

impl PaginationPolicy {
    /// Resolve optional `page`/`limit` query values.
    ///
    /// Absent values take their defaults. Present values must parse as
    /// positive integers; they are never clamped.
    pub fn parse(
        &self,
        page: Option<&str>,
        limit: Option<&str>,
    ) -> Result<PageRequest, PaginationError> {
        let page = match page {
            Some(raw) => positive("page", raw)?,
            None => DEFAULT_PAGE,
        };
        let limit = match limit {
            Some(raw) => positive("limit", raw)?,
            None => self.default_limit,
        };

        if limit > self.max_limit {
            return Err(PaginationError::LimitTooLarge {
                max: self.max_limit.get(),
                value: limit.get(),
            });
        }

        Ok(PageRequest::new(page, limit))
    }
}

fn positive(field: &'static str, raw: &str) -> Result<NonZeroU32, PaginationError> {
    raw.trim()
        .parse::<NonZeroU32>()
        .map_err(|_| PaginationError::NotPositiveInteger {
            field,
            value: raw.to_string(),
        })
}
