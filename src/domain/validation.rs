//! Field-level validation rules for authors and books.

use serde::Serialize;
use thiserror::Error;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_COVER_TEXT_LEN: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

/// Collected rule violations for one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("validation failed on {} field(s)", violations.len())]
pub struct ValidationErrors {
    pub violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Required text: present after trimming and within `max` characters.
pub fn require_text(errors: &mut ValidationErrors, field: &'static str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.push(field, "must not be blank");
    } else {
        check_length(errors, field, value, max);
    }
}

pub fn check_length(errors: &mut ValidationErrors, field: &'static str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.push(field, format!("must be at most {max} characters"));
    }
}

pub fn validate_author(first_name: &str, last_name: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    require_text(&mut errors, "firstName", first_name, MAX_NAME_LEN);
    require_text(&mut errors, "lastName", last_name, MAX_NAME_LEN);
    errors.into_result()
}

pub fn validate_book(title: &str, cover_text: Option<&str>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    require_text(&mut errors, "title", title, MAX_TITLE_LEN);
    if let Some(cover_text) = cover_text {
        check_length(&mut errors, "coverText", cover_text, MAX_COVER_TEXT_LEN);
    }
    errors.into_result()
}
