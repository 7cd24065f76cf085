mod error;
mod proto_error;

pub use error::{PgProtoError, Result};
pub use proto_error::{ProtoError, Severity, SqlState};
