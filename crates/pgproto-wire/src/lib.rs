//! Message-level encoding and decoding for the PostgreSQL v3
//! frontend/backend wire protocol.
//!
//! This crate only knows about bytes and message shapes. It has no
//! opinion on session state, SQL semantics, or authentication policy —
//! those live in `pgproto-session` and `pgproto-query`.

mod codec;
mod message;
mod version;

pub use codec::{decode_startup, FramedConn, ACCEPT_GSSENC, ACCEPT_SSL, REJECT_ENCRYPTION};
pub use message::{
    BackendMessage, ColumnDescriptor, FrontendMessage, FrontendStartupMessage, ObjectKind,
    TransactionStatus,
};
pub use version::{VERSION_3, VERSION_CANCEL, VERSION_GSSENC, VERSION_SSL};
