//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use stockpost_domain::StockpostError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub StockpostError);

impl From<InfraError> for StockpostError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<StockpostError> for InfraError {
    fn from(value: StockpostError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoStockpostError {
    fn into_stockpost(self) -> StockpostError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → StockpostError */
/* -------------------------------------------------------------------------- */

impl IntoStockpostError for SqlError {
    fn into_stockpost(self) -> StockpostError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        StockpostError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        StockpostError::Database("database is locked".into())
                    }
                    // SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
                    (ErrorCode::ConstraintViolation, 1555 | 2067) => {
                        StockpostError::Conflict(format!("unique constraint violation: {message}"))
                    }
                    _ => StockpostError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => StockpostError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                StockpostError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                StockpostError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                StockpostError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidPath(path) => StockpostError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => StockpostError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_stockpost())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → StockpostError */
/* -------------------------------------------------------------------------- */

impl IntoStockpostError for r2d2::Error {
    fn into_stockpost(self) -> StockpostError {
        StockpostError::Database(format!("connection pool unavailable: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_stockpost())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → StockpostError */
/* -------------------------------------------------------------------------- */

impl IntoStockpostError for HttpError {
    fn into_stockpost(self) -> StockpostError {
        if self.is_timeout() {
            return StockpostError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return StockpostError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                404 => StockpostError::NotFound(message),
                400..=499 => StockpostError::InvalidInput(message),
                _ => StockpostError::Network(message),
            };
        }

        StockpostError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_stockpost())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
