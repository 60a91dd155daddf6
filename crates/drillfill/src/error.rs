//! Error types for drillfill
//!
//! Two layers:
//!
//! - [`SinkError`] is produced by sink adapters. It carries a closed
//!   [`SinkErrorKind`] so the pipeline never has to look at raw server text.
//! - [`LoaderError`] is what crosses the batch-insert boundary. Only fatal
//!   conditions ever become a `LoaderError`; retryable sink errors are
//!   absorbed by the insert executor.

use std::fmt;
use thiserror::Error;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Result type alias for sink operations
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Category of a sink failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkErrorKind {
    /// Connection reset, broken pipe or an aborted stream
    ConnectionReset,
    /// Server-side memory limit or resource exhaustion (e.g. too many parts)
    ResourceExhausted,
    /// Transient timeout (client or server side)
    Timeout,
    /// The sink could not be reached at all (refused, DNS)
    Unreachable,
    /// Authentication or authorization failure
    Auth,
    /// Unknown table, missing column or type mismatch
    Schema,
    /// The server could not parse the submitted rows
    Malformed,
    /// Any other server rejection
    Rejected,
}

impl SinkErrorKind {
    /// Check if failures of this kind are safe to retry
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ConnectionReset | Self::ResourceExhausted | Self::Timeout
        )
    }

    /// Kind of a failed socket operation
    pub fn from_io(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind;
        match kind {
            ErrorKind::ConnectionReset
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof => Self::ConnectionReset,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout,
            ErrorKind::ConnectionRefused | ErrorKind::NotConnected => Self::Unreachable,
            _ => Self::Rejected,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionReset => "connection_reset",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::Auth => "auth",
            Self::Schema => "schema",
            Self::Malformed => "malformed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure reported by a sink
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}{}: {message}", code_suffix(.code))]
pub struct SinkError {
    /// Failure category
    pub kind: SinkErrorKind,
    /// Sink-native error code, when the server supplied one
    pub code: Option<u32>,
    /// Human-readable message
    pub message: String,
}

fn code_suffix(code: &Option<u32>) -> String {
    code.map(|c| format!(" (code {})", c)).unwrap_or_default()
}

impl SinkError {
    /// Create a new sink error
    pub fn new(kind: SinkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Attach a sink-native error code
    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn connection_reset(msg: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::ConnectionReset, msg)
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::ResourceExhausted, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Timeout, msg)
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Unreachable, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Auth, msg)
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Schema, msg)
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Malformed, msg)
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Rejected, msg)
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        Self::new(SinkErrorKind::from_io(err.kind()), err.to_string())
    }
}

/// Main error type for the loader
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-retryable sink failure while inserting a batch
    #[error("Insert of batch at offset {offset} failed: {source}")]
    Insert {
        offset: u64,
        #[source]
        source: SinkError,
    },

    /// A bounded retry policy gave up on a retryable failure
    #[error("Insert of batch at offset {offset} gave up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        offset: u64,
        attempts: u32,
        #[source]
        source: SinkError,
    },

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LoaderError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The sink failure behind this error, if any
    pub fn sink_error(&self) -> Option<&SinkError> {
        match self {
            Self::Insert { source, .. } | Self::RetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}
