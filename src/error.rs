//! Error taxonomy for ledger-facing operations.
//!
//! Every error carries a `retryable` flag computed once, when the error is
//! constructed. The retry executor reads that flag and nothing else.

use crate::ledger::types::TxRef;
use std::fmt;

/// HTTP-style status codes that indicate a permanent client error.
const PERMANENT_STATUS_CODES: [u16; 2] = [403, 404];

/// Status reported when a resource being created already exists.
pub const CONFLICT_STATUS: u16 = 409;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Classified failure kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller misconfiguration. Never retried.
    InvalidInput,
    /// The funding identity cannot cover the required amount.
    InsufficientFunds,
    /// Transport-level failure (connection reset, timeout, ...).
    TransientNetwork,
    /// A remote API answered with an error, optionally carrying its status.
    RemoteApi { status: Option<u16> },
    /// A submitted transaction reverted or could not be confirmed.
    TransactionFailed { tx_ref: Option<TxRef> },
    /// A failure that has not been mapped onto one of the kinds above.
    Unclassified,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput => write!(f, "invalid input"),
            Self::InsufficientFunds => write!(f, "insufficient funds"),
            Self::TransientNetwork => write!(f, "transient network error"),
            Self::RemoteApi { status: Some(code) } => write!(f, "remote API error ({})", code),
            Self::RemoteApi { status: None } => write!(f, "remote API error"),
            Self::TransactionFailed { tx_ref: Some(tx) } => {
                write!(f, "transaction failed ({})", tx)
            }
            Self::TransactionFailed { tx_ref: None } => write!(f, "transaction failed"),
            Self::Unclassified => write!(f, "unclassified error"),
        }
    }
}

/// A ledger-layer error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LedgerError {
    kind: ErrorKind,
    message: String,
    retryable: bool,
}

impl LedgerError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let retryable = match &kind {
            ErrorKind::TransientNetwork | ErrorKind::Unclassified => true,
            ErrorKind::RemoteApi { status } => {
                !matches!(status, Some(code) if PERMANENT_STATUS_CODES.contains(code))
            }
            ErrorKind::InvalidInput
            | ErrorKind::InsufficientFunds
            | ErrorKind::TransactionFailed { .. } => false,
        };
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn insufficient_funds(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientFunds, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientNetwork, message)
    }

    pub fn remote_api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteApi { status }, message)
    }

    /// The resource already exists. Retryable: the next attempt's lookup
    /// finds it.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::remote_api(Some(CONFLICT_STATUS), message)
    }

    pub fn transaction_failed(tx_ref: Option<TxRef>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransactionFailed { tx_ref }, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified, message)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the retry executor may attempt the operation again.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Re-raise a fatal spend-path error as `TransactionFailed`, carrying the
    /// operation that was being attempted.
    ///
    /// Retryable errors and funding shortfalls pass through unchanged so the
    /// retry executor and callers still see their original kind.
    pub(crate) fn into_transaction_failure(self, operation: &str, tx_ref: Option<TxRef>) -> Self {
        if self.retryable || self.kind == ErrorKind::InsufficientFunds {
            return self;
        }
        if let ErrorKind::TransactionFailed { tx_ref: inner } = self.kind {
            return Self::transaction_failed(
                inner.or(tx_ref),
                format!("{}: {}", operation, self.message),
            );
        }
        Self::transaction_failed(tx_ref, format!("{} failed: {}", operation, self))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::unclassified(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::unclassified(format!("serialization error: {}", err))
    }
}
