//! Aggregate rule violations.

use checkin_id::{EntryId, UserId};
use thiserror::Error;

use crate::{EventStatus, MAX_DOOR_KEEPERS_PER_ENTRY};

/// A mutation was rejected by the event aggregate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// No entry with this id exists in the event.
    #[error("entry {0} not found")]
    EntryNotFound(EntryId),

    /// No door-keeper with this id exists where it was looked up.
    #[error("door-keeper {0} not found")]
    KeeperNotFound(UserId),

    /// The email already staffs an entry of this event.
    #[error("{0} is already assigned as a door-keeper")]
    DuplicateKeeperEmail(String),

    /// Every entry already has the maximum number of door-keepers.
    #[error("no entry has room for another door-keeper (limit {MAX_DOOR_KEEPERS_PER_ENTRY})")]
    NoEntryCapacity,

    /// Guests cannot be admitted through a closed entry.
    #[error("cannot add guests once entry {0} is closed")]
    EntryClosed(EntryId),

    /// The lifecycle only moves forward.
    #[error("cannot move event from {from} to {to}")]
    InvalidTransition { from: EventStatus, to: EventStatus },

    /// A supplied field failed validation.
    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: &'static str,
    },
}

impl ModelError {
    /// True for errors caused by a reference to something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::EntryNotFound(_) | ModelError::KeeperNotFound(_))
    }
}
