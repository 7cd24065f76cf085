use std::fmt;

/// The SQLSTATE code carried on an `ErrorResponse`.
///
/// Real PostgreSQL has a five-character code per condition; this
/// implementation only ever emits the two codes the reference server
/// distinguishes on.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SqlState(pub &'static str);

impl SqlState {
    /// Default code when a handler doesn't care to be more specific.
    pub const GENERIC: SqlState = SqlState("0");
    /// `invalid_authorization_specification`.
    pub const INVALID_AUTHORIZATION_SPECIFICATION: SqlState = SqlState("28000");

    pub fn code(&self) -> &'static str {
        self.0
    }
}

/// Severity of a [`ProtoError`], mirroring the subset of PostgreSQL's
/// error-severity levels this server can emit.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Severity {
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }
}

/// A recoverable protocol-level failure: the client did something the
/// server can reject with an `ErrorResponse` without tearing down the
/// connection (unless `severity` is [`Severity::Fatal`]).
#[derive(Debug)]
pub struct ProtoError {
    pub severity: Severity,
    pub code: SqlState,
    pub message: String,
}

impl ProtoError {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: SqlState::GENERIC,
            message: message.into(),
        }
    }

    pub fn error_with_code(code: SqlState, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            code: SqlState::GENERIC,
            message: message.into(),
        }
    }

    pub fn fatal_with_code(code: SqlState, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            code,
            message: message.into(),
        }
    }

    /// Syntax errors raised by the tokenizer/clause-splitter are surfaced
    /// with a fixed "Syntax error: " prefix, matching the reference server.
    pub fn syntax(message: impl fmt::Display) -> Self {
        Self::error(format!("Syntax error: {message}"))
    }
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.severity.as_str(), self.code.code(), self.message)
    }
}

impl std::error::Error for ProtoError {}
