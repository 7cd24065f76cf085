//! Frontend and backend message types, decoupled from their wire
//! representation (which lives in [`crate::codec`]).

use std::collections::HashMap;

use pgproto_common::ProtoError;

/// A column descriptor as announced in a `RowDescription` message.
///
/// All values are serialized as text regardless of `type_id`; the type
/// table is a display hint only, matching the reference server's
/// `POSTGRES_TYPE_MAPPING`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub type_id: i32,
    pub type_size: i16,
}

impl ColumnDescriptor {
    /// OID 23, size 4: PostgreSQL `int4`.
    pub const INT4_TYPE_ID: i32 = 23;
    pub const INT4_TYPE_SIZE: i16 = 4;
    /// OID 25, size -1: PostgreSQL `text`.
    pub const TEXT_TYPE_ID: i32 = 25;
    pub const TEXT_TYPE_SIZE: i16 = -1;

    /// Every column this server reports is declared as `text`, since the
    /// app hooks never declare a type and all values travel as strings.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: Self::TEXT_TYPE_ID,
            type_size: Self::TEXT_TYPE_SIZE,
        }
    }
}

/// Which kind of object a `Describe`/`Close` message names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Portal,
    Statement,
}

/// A decoded message arriving before the startup handshake completes.
#[derive(Debug)]
pub enum FrontendStartupMessage {
    Startup {
        version: i32,
        params: HashMap<String, String>,
    },
    SslRequest,
    GssEncRequest,
    CancelRequest { conn_id: u32, secret_key: u32 },
}

/// A decoded frontend message, as seen after the startup handshake.
///
/// [message formats]: https://www.postgresql.org/docs/13/protocol-message-formats.html
#[derive(Debug)]
pub enum FrontendMessage {
    /// `Q`: execute the given SQL via the simple query protocol.
    Query { sql: String },
    /// `P`: create a prepared statement.
    Parse {
        name: String,
        query: String,
        param_types: Vec<i32>,
    },
    /// `B`: bind a prepared statement to a portal with concrete parameters.
    Bind {
        portal: String,
        statement: String,
        param_formats: Vec<i16>,
        params: Vec<Option<Vec<u8>>>,
        result_formats: Vec<i16>,
    },
    /// `E`: execute a bound portal.
    Execute { portal: String, max_rows: i32 },
    /// `D`: describe a portal or statement.
    Describe { kind: ObjectKind, name: String },
    /// `C`: close a portal or statement.
    Close { kind: ObjectKind, name: String },
    /// `p`: a password sent in response to an authentication request.
    PasswordMessage { password: String },
    /// `S`: request a `ReadyForQuery`.
    Sync,
    /// `H`: request the output buffer be flushed.
    Flush,
    /// `X`: end the session.
    Terminate,
    /// Any tag this codec doesn't recognize. Carried through rather than
    /// failed at decode time so the session can reply with an
    /// `ErrorResponse` and keep going instead of tearing down the
    /// connection over one unsupported command.
    Unknown { tag: u8 },
}

/// A message the server sends to the client.
pub enum BackendMessage {
    AuthenticationCleartextPassword,
    AuthenticationOk,
    ParameterStatus { name: String, value: String },
    ReadyForQuery(TransactionStatus),
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    EmptyQueryResponse,
    CommandComplete { tag: String },
    RowDescription(Vec<ColumnDescriptor>),
    /// Each row is a sequence of already-stringified field values, one per
    /// column. Nulls are not represented; the result shaper renders a
    /// missing value as an empty string before it ever reaches here.
    DataRow(Vec<String>),
    ErrorResponse(ProtoError),
}

impl From<ProtoError> for BackendMessage {
    fn from(e: ProtoError) -> Self {
        BackendMessage::ErrorResponse(e)
    }
}

/// The one-byte transaction-status indicator carried by `ReadyForQuery`.
///
/// This server never runs real transactions (see Non-goals), so in
/// practice only `Idle` is ever produced, but the type exists so the wire
/// layer matches the real protocol's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,
    InTransaction,
    Failed,
}

impl TransactionStatus {
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Idle => b'I',
            Self::InTransaction => b'T',
            Self::Failed => b'E',
        }
    }
}
