//! Error types for zero-psql.

use std::time::Duration;

use thiserror::Error;

/// Result type for zero-psql operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Fields of a server ErrorResponse or NoticeResponse.
///
/// Values are kept exactly as the server sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG (may be localized)
    pub severity: Option<String>,
    /// Non-localized severity
    pub severity_non_localized: Option<String>,
    /// SQLSTATE code (5 characters)
    pub code: Option<String>,
    /// Primary message
    pub message: Option<String>,
    /// Detailed explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the problem
    pub hint: Option<String>,
    /// Cursor position in the query string (1-based)
    pub position: Option<u32>,
    /// Context / call stack
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
}

impl ServerError {
    /// Severity, preferring the non-localized form.
    pub fn severity(&self) -> Option<&str> {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
    }

    /// Primary message, or an empty string.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    /// FATAL and PANIC end the backend session.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity(), Some("FATAL") | Some("PANIC"))
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for zero-psql.
#[derive(Debug, Error)]
pub enum Error {
    /// Server unreachable, authentication rejected, or session setup failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected a command
    #[error("Query error: {0}")]
    Query(ServerError),

    /// Unexpected protocol state (operation while copying, results pending, unexpected message)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Parameter count does not match the statement's arity.
    ///
    /// Raised before anything is sent, or after the server described a
    /// prepared statement with a different count.
    #[error("Statement {statement:?} expects {expected} parameters, got {actual}")]
    ParamCount {
        /// Statement name (empty for ad-hoc statements)
        statement: String,
        /// Declared arity
        expected: usize,
        /// Supplied count, or the count the server described
        actual: usize,
    },

    /// Socket read, write or flush failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Caller-supplied deadline elapsed
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The connection can no longer be used and must be re-established
    #[error("Fatal connection error: {0}")]
    Fatal(String),

    /// Invalid usage (bad index, unknown statement, bad options)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl From<std::convert::Infallible> for Error {
    fn from(e: std::convert::Infallible) -> Self {
        match e {}
    }
}

impl Error {
    /// Returns true if the error leaves the connection unusable.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Fatal(_) => true,
            Error::Query(fields) => fields.is_fatal(),
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(fields) => fields.code.as_deref(),
            _ => None,
        }
    }

    /// Returns true if the error was raised locally before anything was sent.
    pub fn is_local(&self) -> bool {
        matches!(self, Error::ParamCount { .. } | Error::InvalidUsage(_))
    }
}
