//! Conversions from external infrastructure errors into domain errors.

use fieldlink_domain::{CacheError, TimeoutKind, TransportError};
use keyring::Error as KeyringError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use thiserror::Error;

/// Error newtype that keeps storage conversions on the infrastructure side
/// and converts back into the domain [`CacheError`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct InfraError(pub CacheError);

impl From<InfraError> for CacheError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CacheError> for InfraError {
    fn from(value: CacheError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoCacheError {
    fn into_cache(self) -> CacheError;
}

/// Maps client-side HTTP failures onto the transport taxonomy
pub(crate) trait IntoTransportError {
    fn into_transport(self) -> TransportError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CacheError */
/* -------------------------------------------------------------------------- */

impl IntoCacheError for SqlError {
    fn into_cache(self) -> CacheError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        CacheError::StorageUnavailable("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CacheError::StorageUnavailable("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        CacheError::Corrupted("unique constraint violation".into())
                    }
                    (ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase, _) => {
                        CacheError::Corrupted(format!("database file unreadable: {message}"))
                    }
                    _ => CacheError::StorageUnavailable(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CacheError::Corrupted("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CacheError::Corrupted(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                CacheError::Corrupted(format!("invalid column type for {name}: {ty}"))
            }
            RE::Utf8Error(_) => CacheError::Corrupted("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidPath(path) => CacheError::StorageUnavailable(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => CacheError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_cache())
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(CacheError::StorageUnavailable(format!("connection pool: {value}")))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(CacheError::Corrupted(format!("invalid stored JSON: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* keyring::Error → CacheError */
/* -------------------------------------------------------------------------- */

impl IntoCacheError for KeyringError {
    fn into_cache(self) -> CacheError {
        use KeyringError::*;

        let description = self.to_string();

        match self {
            NoEntry => CacheError::StorageUnavailable("keychain entry not found".into()),
            BadEncoding(_) => {
                CacheError::Corrupted("credential in keychain is not valid UTF-8".into())
            }
            TooLong(name, limit) => CacheError::StorageUnavailable(format!(
                "keychain attribute '{name}' exceeds platform limit ({limit})"
            )),
            Ambiguous(entries) => CacheError::Corrupted(format!(
                "multiple keychain entries matched request ({} results)",
                entries.len()
            )),
            PlatformFailure(err) => {
                CacheError::StorageUnavailable(format!("keychain platform error: {err}"))
            }
            NoStorageAccess(err) => {
                CacheError::StorageUnavailable(format!("unable to access secure storage: {err}"))
            }
            _ => CacheError::StorageUnavailable(description),
        }
    }
}

impl From<KeyringError> for InfraError {
    fn from(value: KeyringError) -> Self {
        InfraError(value.into_cache())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TransportError */
/* -------------------------------------------------------------------------- */

impl IntoTransportError for HttpError {
    fn into_transport(self) -> TransportError {
        if self.is_timeout() {
            let kind = if self.is_connect() { TimeoutKind::Connect } else { TimeoutKind::Receive };
            return TransportError::Timeout(kind);
        }

        if self.is_connect() {
            return TransportError::ConnectionError(format!("HTTP connection failure: {self}"));
        }

        if let Some(status) = self.status() {
            return TransportError::bad_response(status.as_u16());
        }

        if self.is_body() || self.is_decode() {
            return TransportError::ConnectionError(format!("HTTP response unreadable: {self}"));
        }

        TransportError::ConnectionError(self.to_string())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
