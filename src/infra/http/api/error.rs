use crate::application::error::ErrorReport;
use crate::domain::validation::FieldViolation;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const INVALID_PAGINATION: &str = "invalid_pagination";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const CACHE_TIMEOUT: &str = "cache_timeout";
    pub const CACHE: &str = "cache_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    violations: Vec<FieldViolation>,
    empty_body: bool,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            violations: Vec::new(),
            empty_body: false,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn validation(
        code: &'static str,
        message: &'static str,
        violations: Vec<FieldViolation>,
    ) -> Self {
        Self {
            violations,
            ..Self::new(StatusCode::BAD_REQUEST, code, message, None)
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "API key required",
            None,
        )
    }

    pub fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            codes::FORBIDDEN,
            "API key lacks required role",
            None,
        )
    }

    /// Not found responses carry no body.
    pub fn not_found(message: &'static str) -> Self {
        Self {
            empty_body: true,
            ..Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = format!(
            "{}: {}",
            self.code,
            self.hint.as_deref().unwrap_or(self.message)
        );

        let mut response = if self.empty_body {
            self.status.into_response()
        } else {
            let body = ApiErrorBody {
                error: ApiErrorMessage {
                    code: self.code.to_string(),
                    message: self.message.to_string(),
                    hint: self.hint,
                    violations: self.violations,
                },
            };
            (self.status, Json(body)).into_response()
        };
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        ErrorReport::from_message("infra::http::api", self.status, detail).attach(&mut response);
        response
    }
}
