use sqlx::error::{DatabaseError, ErrorKind};

use crate::application::repos::RepoError;

/// Postgres SQLSTATE for a malformed literal (e.g. a bad integer).
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
/// Raised when `statement_timeout` cancels a query.
const QUERY_CANCELED: &str = "57014";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => map_database_error(db.as_ref()),
        other => RepoError::from_persistence(other),
    }
}

fn map_database_error(db: &dyn DatabaseError) -> RepoError {
    let message = db.message().to_string();
    match (db.kind(), db.code().as_deref()) {
        // Dangling author id.
        (ErrorKind::ForeignKeyViolation, _) | (_, Some(INVALID_TEXT_REPRESENTATION)) => {
            RepoError::InvalidInput { message }
        }
        (
            ErrorKind::UniqueViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation,
            _,
        ) => RepoError::Integrity { message },
        (_, Some(QUERY_CANCELED)) => RepoError::Timeout,
        _ => RepoError::Persistence(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RepoError::NotFound
        ));
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }

    #[test]
    fn other_driver_errors_are_persistence_failures() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            RepoError::Persistence(_)
        ));
    }
}
