//! Conversions from external infrastructure errors into `CommonError`.
//!
//! Adapters return `CommonResult` through the core ports, so every driver
//! error funnels through [`InfraError`] before it crosses that boundary.

use fieldsync_common::error::CommonError;
use fieldsync_domain::FieldSyncError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the shared error type.
#[derive(Debug)]
pub struct InfraError(pub CommonError);

impl From<InfraError> for CommonError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CommonError> for InfraError {
    fn from(value: CommonError) -> Self {
        Self(value)
    }
}

impl From<InfraError> for FieldSyncError {
    fn from(value: InfraError) -> Self {
        match value.0 {
            CommonError::Config { message, .. } => Self::Config(message),
            CommonError::Backend { message, .. } => Self::Network(message),
            CommonError::NotFound { resource_type, identifier } => Self::NotFound(match identifier {
                Some(id) => format!("{resource_type} '{id}'"),
                None => resource_type,
            }),
            CommonError::Validation { message, .. } => Self::InvalidInput(message),
            err @ (CommonError::Storage { .. } | CommonError::Persistence { .. }) => {
                Self::Storage(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CommonError */
/* -------------------------------------------------------------------------- */

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        let err = match value {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => CommonError::storage("database is busy"),
                    ErrorCode::DatabaseLocked => CommonError::storage("database is locked"),
                    ErrorCode::DiskFull => CommonError::storage("disk is full"),
                    ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => {
                        CommonError::storage(format!("database file is unreadable: {message}"))
                    }
                    _ => CommonError::storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CommonError::not_found("sqlite row"),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CommonError::serialization_format("sqlite", cause.to_string())
            }
            RE::InvalidPath(path) => CommonError::config_field(
                "storage.path",
                format!("invalid database path: {}", path.to_string_lossy()),
            ),
            other => CommonError::storage(other.to_string()),
        };
        Self(err)
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        Self(CommonError::storage_op("acquire_connection", value.to_string()))
    }
}

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        if value.is_cancelled() {
            Self(CommonError::task_cancelled("blocking storage task"))
        } else {
            Self(CommonError::internal_with_context(value.to_string(), "blocking storage task"))
        }
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CommonError */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        if value.is_timeout() {
            return Self(CommonError::backend("http", "request timed out", true));
        }

        if value.is_connect() {
            return Self(CommonError::backend("http", "connection failure", true));
        }

        if let Some(status) = value.status() {
            let message = format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status")
            );
            return Self(CommonError::backend("http", message, status.is_server_error()));
        }

        Self(CommonError::backend("http", value.to_string(), false))
    }
}

#[cfg(test)]
mod tests {
    use fieldsync_common::error::ErrorClassification;
    use rusqlite::ffi::{Error as FfiError, ErrorCode};

    use super::*;

    #[test]
    fn test_sqlite_busy_maps_to_storage_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );

        let InfraError(common) = err.into();
        assert!(matches!(common, CommonError::Storage { ref message, .. } if message == "database is busy"));
    }

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let InfraError(common) = SqlError::QueryReturnedNoRows.into();
        assert_eq!(common.error_type_name(), "not_found");
    }

    #[tokio::test]
    async fn test_connect_failure_is_retryable() {
        // Nothing listens on port 9 locally
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let err = client.get("http://127.0.0.1:9/").send().await.unwrap_err();

        let InfraError(common) = err.into();
        assert!(common.is_retryable());
    }

    #[test]
    fn test_storage_errors_become_domain_storage_errors() {
        let domain: FieldSyncError =
            InfraError(CommonError::persistence_op("save", "disk full")).into();
        assert!(matches!(domain, FieldSyncError::Storage(_)));
    }
}
