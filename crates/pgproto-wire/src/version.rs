//! Protocol version numbers and the pseudo-versions PostgreSQL overloads
//! onto the same field to signal SSL/GSSAPI negotiation and cancellation.
//!
//! The protocol changes very infrequently: v3.0 is still current (it first
//! shipped with PostgreSQL 7.4 in 2003), so there is no negotiation beyond
//! recognizing these four values.

pub const VERSION_3: i32 = 0x0003_0000;
pub const VERSION_CANCEL: i32 = (1234 << 16) + 5678;
pub const VERSION_SSL: i32 = (1234 << 16) + 5679;
pub const VERSION_GSSENC: i32 = (1234 << 16) + 5680;
