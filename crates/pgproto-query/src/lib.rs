//! Recognizes driver probe queries, routes everything else to the
//! embedding application, and shapes the result into wire-ready rows.

mod application;
mod dispatch;
mod probes;
mod shaper;

/// Result type for query-dispatch operations: a recoverable protocol
/// failure that should become an `ErrorResponse`, not a transport error.
pub type Result<T> = std::result::Result<T, pgproto_common::ProtoError>;

pub use application::{Application, Row};
pub use dispatch::{execute_query, QueryResult};
