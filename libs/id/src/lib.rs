//! # checkin-id
//!
//! Typed identifiers for the check-in service.
//!
//! Every identifier has the form `{prefix}_{ulid}`:
//!
//! - `evt_01HV4Z2WQXKJNM8GPQY6VBKC3D` for an event
//! - `ent_01HV4Z3MXNKPQR9HSTZ7WCLD4E` for an entry point
//! - `usr_01HV4Z4NYPLTRS0JTUA8XDME5F` for a user (and door-keepers)
//!
//! The prefix keeps an entry id from being passed where an event id is expected,
//! both in Rust and on the wire.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
