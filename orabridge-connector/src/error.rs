use std::fmt;

use orabridge_core::err::Error;

use crate::DriverStatus;

/// Classification of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Auth/connect/disconnect failures
    Connection,
    /// Prepare/execute/fetch failures not classified more specifically
    Execution,
    /// The describe probe reported the object-not-found diagnostic
    TableNotFound,
    /// Allocation failure for a remote handle or buffer
    OutOfMemory,
    /// Lock-timeout/deadlock-class diagnostic; retryable by the caller
    Serialization,
    /// Type compatibility rejection at plan build time
    InvalidDataType,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connection => "connection error",
            Self::Execution => "remote execution error",
            Self::TableNotFound => "table not found",
            Self::OutOfMemory => "out of memory",
            Self::Serialization => "serialization failure",
            Self::InvalidDataType => "invalid data type",
        };
        write!(f, "{}", s)
    }
}

/// Diagnostic text is capped at this many characters; overflow is cut off
/// rather than failing the error path itself.
pub const MAX_DETAIL_CHARS: usize = 1024;

/// A normalized remote error record
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
    /// Verbatim remote diagnostic text, truncated at [`MAX_DETAIL_CHARS`]
    pub detail: Option<String>,
    /// Actionable advice for configuration-level failures
    pub hint: Option<String>,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
            hint: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(truncate_detail(detail.into()));
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Serialization
    }
}

// Remote diagnostic codes with a dedicated classification
const CODE_OBJECT_NOT_FOUND: i32 = 942;
const CODE_DEADLOCK: i32 = 60;
const CODE_LOCK_TIMEOUT: i32 = 2049;
const CODE_CANT_SERIALIZE: i32 = 8177;

// SQLSTATE class reported for client-side allocation failures
const STATE_NO_MEMORY: &str = "HY001";

/// The single normalization point for raw driver statuses.
///
/// Extracts and classifies the diagnostic, falling back to `default_kind`
/// when no code matches a dedicated class. Callers never branch on raw
/// status codes.
pub fn from_status(default_kind: ErrorKind, message: impl Into<String>, status: DriverStatus) -> Error {
    let kind = classify(&status).unwrap_or(default_kind);

    let mut detail = status.message;
    if let Some(state) = status.sqlstate.as_deref() {
        detail = format!("{} (SQLSTATE {})", detail, state);
    }

    RemoteError::new(kind, message).with_detail(detail).into()
}

fn classify(status: &DriverStatus) -> Option<ErrorKind> {
    if status.sqlstate.as_deref() == Some(STATE_NO_MEMORY) {
        return Some(ErrorKind::OutOfMemory);
    }

    match status.code {
        CODE_OBJECT_NOT_FOUND => Some(ErrorKind::TableNotFound),
        CODE_DEADLOCK | CODE_LOCK_TIMEOUT | CODE_CANT_SERIALIZE => Some(ErrorKind::Serialization),
        _ => None,
    }
}

fn truncate_detail(detail: String) -> String {
    if detail.chars().count() <= MAX_DETAIL_CHARS {
        return detail;
    }
    detail.chars().take(MAX_DETAIL_CHARS).collect()
}
