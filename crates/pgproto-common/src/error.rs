use std::fmt;
use std::fmt::Formatter;

/// Result type for operations that could result in [`PgProtoError`].
pub type Result<T> = std::result::Result<T, PgProtoError>;

/// Transport-level and internal errors.
///
/// This is distinct from [`ProtoError`](crate::proto_error::ProtoError): a
/// `PgProtoError` means the connection itself is unusable (the socket is
/// gone, a buffer was malformed beyond repair) and the session must close.
/// A `ProtoError` means the client sent something the protocol layer can
/// reject gracefully with an `ErrorResponse`.
#[derive(Debug)]
pub enum PgProtoError {
    /// The underlying socket failed or hit EOF unexpectedly.
    Io(std::io::Error),
    /// A string field on the wire was not valid UTF-8.
    InvalidUtf8(std::str::Utf8Error),
    /// An internal invariant was violated. Should not happen in normal use.
    Internal(String),
}

impl fmt::Display for PgProtoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::InvalidUtf8(e) => write!(f, "invalid utf-8: {e}"),
            Self::Internal(desc) => write!(f, "internal error: {desc}"),
        }
    }
}

impl std::error::Error for PgProtoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidUtf8(e) => Some(e),
            Self::Internal(_) => None,
        }
    }
}

impl From<std::io::Error> for PgProtoError {
    fn from(e: std::io::Error) -> Self {
        PgProtoError::Io(e)
    }
}

impl From<std::str::Utf8Error> for PgProtoError {
    fn from(e: std::str::Utf8Error) -> Self {
        PgProtoError::InvalidUtf8(e)
    }
}
