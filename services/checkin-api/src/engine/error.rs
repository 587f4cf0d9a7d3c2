//! Mutation engine errors.

use checkin_id::{EntryId, EventId, UserId};
use checkin_model::ModelError;
use thiserror::Error;

use crate::db::DbError;

/// Why an engine operation did not commit.
///
/// Each variant carries a stable machine-readable `code` for the HTTP error
/// body alongside the human-readable message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    /// Storage or other unexpected failure. Already logged where it happened.
    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub fn event_not_found(event_id: &EventId) -> Self {
        Self::NotFound {
            code: "event_not_found",
            message: format!("Event {event_id} not found"),
        }
    }

    pub fn entry_not_found(entry_id: &EntryId) -> Self {
        Self::NotFound {
            code: "entry_not_found",
            message: format!("Entry {entry_id} not found"),
        }
    }

    pub fn keeper_not_found(keeper_id: &UserId) -> Self {
        Self::NotFound {
            code: "keeper_not_found",
            message: format!("Door-keeper {keeper_id} not found"),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: "forbidden",
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::BadRequest { code, .. }
            | Self::Forbidden { code, .. } => code,
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        match &err {
            ModelError::EntryNotFound(entry_id) => Self::entry_not_found(entry_id),
            ModelError::KeeperNotFound(keeper_id) => Self::keeper_not_found(keeper_id),
            ModelError::DuplicateKeeperEmail(_) => Self::Conflict {
                code: "keeper_email_taken",
                message: err.to_string(),
            },
            ModelError::NoEntryCapacity => Self::Conflict {
                code: "no_entry_capacity",
                message: err.to_string(),
            },
            ModelError::EntryClosed(_) => Self::bad_request("entry_closed", err.to_string()),
            ModelError::InvalidTransition { .. } => {
                Self::bad_request("invalid_status_transition", err.to_string())
            }
            ModelError::InvalidField { .. } => Self::bad_request("invalid_field", err.to_string()),
        }
    }
}

/// Map a storage failure to [`EngineError::Internal`], logging it first.
pub(crate) fn storage(operation: &'static str) -> impl FnOnce(DbError) -> EngineError {
    move |e| {
        tracing::error!(error = %e, operation, "Storage operation failed");
        EngineError::Internal(format!("Failed to {operation}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkin_model::EventStatus;
    use rstest::rstest;

    #[rstest]
    #[case(ModelError::EntryNotFound(EntryId::new()), "entry_not_found")]
    #[case(ModelError::KeeperNotFound(UserId::new()), "keeper_not_found")]
    #[case(ModelError::DuplicateKeeperEmail("a@x.com".into()), "keeper_email_taken")]
    #[case(ModelError::NoEntryCapacity, "no_entry_capacity")]
    #[case(ModelError::EntryClosed(EntryId::new()), "entry_closed")]
    #[case(
        ModelError::InvalidTransition { from: EventStatus::Completed, to: EventStatus::Ongoing },
        "invalid_status_transition"
    )]
    fn test_model_error_codes(#[case] err: ModelError, #[case] code: &str) {
        assert_eq!(EngineError::from(err).code(), code);
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let err = EngineError::from(ModelError::DuplicateKeeperEmail("a@x.com".into()));
        assert!(matches!(err, EngineError::Conflict { .. }));
        assert!(err.to_string().contains("a@x.com"));
    }

    #[test]
    fn test_storage_maps_to_internal() {
        let err = storage("load event")(DbError::Duplicate("x".into()));
        assert_eq!(err, EngineError::Internal("Failed to load event".into()));
    }
}
