//! # checkin-model
//!
//! The event aggregate of the check-in service.
//!
//! ## Hierarchy
//!
//! - [`Event`] is the root. It owns its entries and notifications outright.
//! - [`Entry`] is one physical access point with in/out counters. An event has at
//!   most [`MAX_ENTRIES_PER_EVENT`].
//! - [`DoorKeeper`] staffs an entry. At most [`MAX_DOOR_KEEPERS_PER_ENTRY`] per entry,
//!   and an email appears at most once across all entries of an event.
//!
//! Everything here is pure: mutations operate on an in-memory aggregate and
//! report rule violations as [`ModelError`]. Loading, locking and persisting
//! belong to the service.

mod aggregate;
mod error;
mod types;

pub use aggregate::{EventPatch, NewEvent};
pub use error::ModelError;
pub use types::*;
