//! Error types for pg-wire.

use thiserror::Error;

/// Result type for pg-wire operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice field type codes (wire byte, not ASCII name).
pub mod field_type {
    pub const SEVERITY: u8 = b'S';
    pub const SEVERITY_NON_LOCALIZED: u8 = b'V';
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    pub const POSITION: u8 = b'P';
    pub const INTERNAL_POSITION: u8 = b'p';
    pub const INTERNAL_QUERY: u8 = b'q';
    pub const CONTEXT: u8 = b'W';
    pub const SCHEMA: u8 = b's';
    pub const TABLE: u8 = b't';
    pub const COLUMN: u8 = b'c';
    pub const DATA_TYPE: u8 = b'd';
    pub const CONSTRAINT: u8 = b'n';
    pub const FILE: u8 = b'F';
    pub const LINE: u8 = b'L';
    pub const ROUTINE: u8 = b'R';
}

/// Severity of a server error or notice.
///
/// PostgreSQL reports this as a string; we classify it into a small enum with an
/// `Unknown` sentinel so callers never match against raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Fatal,
    Panic,
    Warning,
    Notice,
    Debug,
    Info,
    Log,
    Unknown,
}

impl Severity {
    pub fn parse(s: &str) -> Self {
        match s {
            "ERROR" => Severity::Error,
            "FATAL" => Severity::Fatal,
            "PANIC" => Severity::Panic,
            "WARNING" => Severity::Warning,
            "NOTICE" => Severity::Notice,
            "DEBUG" => Severity::Debug,
            "INFO" => Severity::Info,
            "LOG" => Severity::Log,
            _ => Severity::Unknown,
        }
    }

    /// FATAL and PANIC sever the connection; ERROR does not.
    pub fn is_connection_fatal(self) -> bool {
        matches!(self, Severity::Fatal | Severity::Panic)
    }
}

/// A parsed PostgreSQL error or notice field stream (`ErrorResponse` / `NoticeResponse` body).
#[derive(Debug, Clone, Default)]
pub struct ErrorDesc {
    /// Localized severity string as sent by the server (required).
    pub severity: String,
    /// Non-localized severity, present on PostgreSQL 9.6+.
    pub severity_non_localized: Option<String>,
    /// SQLSTATE code (required).
    pub code: String,
    /// Primary human-readable message (required).
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<u32>,
    pub internal_position: Option<u32>,
    pub internal_query: Option<String>,
    pub context: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub data_type: Option<String>,
    pub constraint: Option<String>,
    pub source_filename: Option<String>,
    pub source_line: Option<u32>,
    pub source_routine: Option<String>,
}

impl ErrorDesc {
    /// The severity, preferring the non-localized field when present (matches the
    /// `severity_v`/`severity` precedence PostgreSQL clients commonly apply).
    pub fn severity(&self) -> Severity {
        Severity::parse(
            self.severity_non_localized
                .as_deref()
                .unwrap_or(&self.severity),
        )
    }
}

impl std::fmt::Display for ErrorDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.code, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

/// Error type for pg-wire.
#[derive(Debug, Error)]
pub enum Error {
    /// Server refused the login with a structured `ErrorResponse` during the auth phase.
    #[error("authentication rejected by server: {0}")]
    AuthPostgresError(Box<ErrorDesc>),

    /// Server requested an authentication mechanism this driver does not implement.
    #[error("unsupported authentication mechanism: {0}")]
    AuthNotSupported(String),

    /// Host/port resolved to no usable address.
    #[error("no usable address for connection")]
    AuthInvalidAddress,

    /// OS-level failure while resolving or connecting to an address.
    #[error("address resolution/connect failed: {0}")]
    AuthAddressException(#[source] std::io::Error),

    /// Server returned a structured error outside the auth phase.
    #[error("server error: {0}")]
    PostgresError(Box<ErrorDesc>),

    /// Malformed wire data, missing required fields, unknown tags, or illegal state.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Terminal failure of the background receiver worker, delivered through the
    /// outbound queue exactly once.
    #[error("receiver failed: {0}")]
    ReceiverException(String),

    /// I/O error from the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection has already been closed.
    #[error("connection is closed")]
    Closed,
}

impl Error {
    /// Returns true if this error means the connection can no longer be used.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::ReceiverException(_) | Error::Closed => true,
            Error::PostgresError(desc) | Error::AuthPostgresError(desc) => {
                desc.as_ref().severity().is_connection_fatal()
            }
            _ => false,
        }
    }
}
