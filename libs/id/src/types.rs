//! Identifier types for every resource the service stores.

use crate::define_id;

define_id!(
    /// Identifies an event aggregate.
    EventId,
    "evt"
);

define_id!(
    /// Identifies an entry point embedded in an event.
    EntryId,
    "ent"
);

define_id!(
    /// Identifies a user account. Door-keepers reuse this type: a keeper either
    /// carries the id of the user with the same email or a freshly minted one.
    UserId,
    "usr"
);

define_id!(
    /// Correlates log lines and error bodies for a single HTTP request.
    RequestId,
    "req"
);
