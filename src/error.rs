//! Crate-wide error taxonomy (spec §7).
//!
//! Each component surfaces only the error categories it is allowed to: the
//! repository facade never leaks `rusqlite::Error` across its boundary, the
//! probe executors never panic on transport failure, and the dispatcher
//! distinguishes configuration errors (never retried) from transient ones
//! (retried with backoff).

use thiserror::Error;

/// Errors returned by the repository facade (component A).
///
/// Transient errors are worth retrying at the call site (scheduler retries
/// on the next tick); integrity errors indicate a constraint violation and
/// are logged and dropped; `NotFound` is a plain miss.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("not found")]
    NotFound,
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound,
            rusqlite::Error::SqliteFailure(sqlite_err, msg) => {
                use rusqlite::ErrorCode::*;
                match sqlite_err.code {
                    ConstraintViolation => {
                        RepositoryError::Integrity(msg.clone().unwrap_or_else(|| err.to_string()))
                    }
                    DatabaseBusy | DatabaseLocked => RepositoryError::Transient(err.to_string()),
                    _ => RepositoryError::Transient(err.to_string()),
                }
            }
            _ => RepositoryError::Transient(err.to_string()),
        }
    }
}

/// The canonical short failure-taxonomy strings a probe executor may
/// produce (spec §4.2). Carried as `error_message` on a failed check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("dns_failure")]
    DnsFailure,
    #[error("connect_timeout")]
    ConnectTimeout,
    #[error("read_timeout")]
    ReadTimeout,
    #[error("tls_failure_expired")]
    TlsExpired,
    #[error("tls_failure_unknown_ca")]
    TlsUnknownCa,
    #[error("tls_failure_hostname_mismatch")]
    TlsHostnameMismatch,
    #[error("tls_failure")]
    TlsOther,
    #[error("protocol_error: {0}")]
    ProtocolError(String),
    #[error("keyword_missing")]
    KeywordMissing,
    #[error("non_success_status: {0}")]
    NonSuccessStatus(u16),
    #[error("connection_refused")]
    ConnectionRefused,
    #[error("icmp_unavailable_tcp_fallback")]
    IcmpUnavailableTcpFallback,
    #[error("unreachable")]
    Unreachable,
}

impl ProbeError {
    /// The canonical short string stored as `error_message`.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

/// Errors from notification dispatch (component E).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid channel configuration: {0}")]
    ConfigError(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("dispatch timed out")]
    Timeout,
}
