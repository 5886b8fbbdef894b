use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use deploylog_core::{LedgerError, StorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a failure should be surfaced to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateEntity,
    NotFound,
    Validation,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::DuplicateEntity => "duplicate_entity",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Failure of a store operation.
///
/// Domain rejections come through [`StoreError::Ledger`]; every other
/// variant is an internal failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("mutation not acknowledged within {0:?}")]
    Timeout(Duration),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("background task failed: {0}")]
    Join(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Ledger(LedgerError::DuplicateEntity(_)) => ErrorKind::DuplicateEntity,
            StoreError::Ledger(LedgerError::NotFound { .. }) => ErrorKind::NotFound,
            StoreError::Ledger(LedgerError::Validation(_)) => ErrorKind::Validation,
            _ => ErrorKind::Internal,
        }
    }

    /// Message safe to hand to a caller: domain errors verbatim, internal
    /// failures without detail.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Error surface for the daemon runtime and the socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    /// The daemon answered with a failure.
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploylog_core::ProjectName;

    #[test]
    fn domain_errors_keep_their_message() {
        let err = StoreError::from(LedgerError::DuplicateEntity(ProjectName::from("shop")));
        assert_eq!(err.kind(), ErrorKind::DuplicateEntity);
        assert_eq!(err.public_message(), "project 'shop' already exists");
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = StoreError::Storage(StorageError::Io {
            path: PathBuf::from("/secret/path.yaml"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "internal error");
        assert_eq!(StoreError::Timeout(Duration::from_secs(5)).kind(), ErrorKind::Internal);
    }
}
