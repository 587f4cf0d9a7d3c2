//! In-memory mutations on the event aggregate.

use checkin_id::{EntryId, EventId, UserId};
use chrono::{DateTime, Utc};

use crate::{
    DoorKeeper, Entry, EntryStatus, Event, EventStatus, ModelError, MAX_DOOR_KEEPERS_PER_ENTRY,
    MAX_ENTRIES_PER_EVENT,
};

fn check_entry_count(count: u32) -> Result<(), ModelError> {
    if count > MAX_ENTRIES_PER_EVENT {
        return Err(ModelError::InvalidField {
            field: "numberOfEntries",
            message: "exceeds the per-event entry limit",
        });
    }
    Ok(())
}

/// Input for creating an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub venue: String,
    pub max_participants: u32,
    pub alert_point: u32,
    pub number_of_entries: u32,
}

/// Partial update of an event. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub venue: Option<String>,
    pub max_participants: Option<u32>,
    pub alert_point: Option<u32>,
    pub number_of_entries: Option<u32>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Entry {
    /// A fresh open entry at 1-based `position`, named `Entry #<position>`.
    pub fn numbered(position: usize) -> Self {
        Self {
            id: EntryId::new(),
            name: format!("Entry #{position}"),
            total_in: 0,
            total_out: 0,
            status: EntryStatus::Open,
            door_keepers: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == EntryStatus::Open
    }

    pub fn has_keeper_capacity(&self) -> bool {
        self.door_keepers.len() < MAX_DOOR_KEEPERS_PER_ENTRY
    }
}

impl Event {
    /// Builds a scheduled event with `number_of_entries` open entries.
    pub fn create(new: NewEvent) -> Result<Self, ModelError> {
        check_entry_count(new.number_of_entries)?;
        let now = Utc::now();
        Ok(Self {
            id: EventId::new(),
            title: new.title,
            venue: new.venue,
            max_participants: new.max_participants,
            alert_point: new.alert_point,
            start_time: None,
            end_time: None,
            description: String::new(),
            status: EventStatus::Scheduled,
            entries: (1..=new.number_of_entries as usize)
                .map(Entry::numbered)
                .collect(),
            notifications: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a patch. Validation happens before anything is changed.
    pub fn apply_patch(&mut self, patch: EventPatch) -> Result<(), ModelError> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ModelError::InvalidField {
                field: "title",
                message: "cannot be empty",
            });
        }
        if patch.venue.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(ModelError::InvalidField {
                field: "venue",
                message: "cannot be empty",
            });
        }

        if let Some(count) = patch.number_of_entries {
            check_entry_count(count)?;
        }

        let start = patch.start_time.or(self.start_time);
        let end = patch.end_time.or(self.end_time);
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(ModelError::InvalidField {
                    field: "endTime",
                    message: "must not be before startTime",
                });
            }
        }

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(venue) = patch.venue {
            self.venue = venue;
        }
        if let Some(max) = patch.max_participants {
            self.max_participants = max;
        }
        if let Some(alert) = patch.alert_point {
            self.alert_point = alert;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        self.start_time = start;
        self.end_time = end;
        if let Some(count) = patch.number_of_entries {
            self.resize_entries(count as usize);
        }
        Ok(())
    }

    /// Grows by appending numbered open entries, or shrinks by dropping from
    /// the end. Dropped entries take their counters and staff with them.
    /// Callers check the count against [`MAX_ENTRIES_PER_EVENT`] first.
    fn resize_entries(&mut self, count: usize) {
        let current = self.entries.len();
        if count > current {
            self.entries
                .extend((current + 1..=count).map(Entry::numbered));
        } else {
            self.entries.truncate(count);
        }
    }

    /// Moves the lifecycle forward. Returns `false` when already in `next`.
    pub fn transition_to(&mut self, next: EventStatus) -> Result<bool, ModelError> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(true)
    }

    pub fn entry(&self, entry_id: &EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.id == entry_id)
    }

    fn entry_mut(&mut self, entry_id: &EntryId) -> Result<&mut Entry, ModelError> {
        self.entries
            .iter_mut()
            .find(|e| &e.id == entry_id)
            .ok_or(ModelError::EntryNotFound(*entry_id))
    }

    fn keepers(&self) -> impl Iterator<Item = &DoorKeeper> {
        self.entries.iter().flat_map(|e| e.door_keepers.iter())
    }

    /// Door-keepers across all entries.
    pub fn keeper_count(&self) -> usize {
        self.entries.iter().map(|e| e.door_keepers.len()).sum()
    }

    pub fn keeper_by_email(&self, email: &str) -> Option<&DoorKeeper> {
        self.keepers().find(|k| k.email == email)
    }

    /// Whether the given identity staffs any entry, matched by id or email.
    pub fn has_keeper(&self, id: &UserId, email: Option<&str>) -> bool {
        self.keepers()
            .any(|k| &k.id == id || email.is_some_and(|email| k.email == email))
    }

    /// Name for a keeper that has no user account: `Keeper <n+1>`.
    pub fn next_keeper_name(&self) -> String {
        format!("Keeper {}", self.keeper_count() + 1)
    }

    /// Staffs the first entry, in list order, that still has room.
    pub fn assign_keeper(&mut self, keeper: DoorKeeper) -> Result<EntryId, ModelError> {
        if self.keeper_by_email(&keeper.email).is_some() {
            return Err(ModelError::DuplicateKeeperEmail(keeper.email));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.has_keeper_capacity())
            .ok_or(ModelError::NoEntryCapacity)?;
        entry.door_keepers.push(keeper);
        Ok(entry.id)
    }

    /// Replaces the email of an existing keeper, wherever it is posted.
    pub fn update_keeper_email(
        &mut self,
        keeper_id: &UserId,
        email: String,
    ) -> Result<(), ModelError> {
        if self
            .keeper_by_email(&email)
            .is_some_and(|other| &other.id != keeper_id)
        {
            return Err(ModelError::DuplicateKeeperEmail(email));
        }
        let keeper = self
            .entries
            .iter_mut()
            .flat_map(|e| e.door_keepers.iter_mut())
            .find(|k| &k.id == keeper_id)
            .ok_or(ModelError::KeeperNotFound(*keeper_id))?;
        keeper.email = email;
        Ok(())
    }

    pub fn remove_keeper(
        &mut self,
        entry_id: &EntryId,
        keeper_id: &UserId,
    ) -> Result<DoorKeeper, ModelError> {
        let entry = self.entry_mut(entry_id)?;
        let index = entry
            .door_keepers
            .iter()
            .position(|k| &k.id == keeper_id)
            .ok_or(ModelError::KeeperNotFound(*keeper_id))?;
        Ok(entry.door_keepers.remove(index))
    }

    pub fn remove_entry(&mut self, entry_id: &EntryId) -> Result<Entry, ModelError> {
        let index = self
            .entries
            .iter()
            .position(|e| &e.id == entry_id)
            .ok_or(ModelError::EntryNotFound(*entry_id))?;
        Ok(self.entries.remove(index))
    }

    pub fn set_entry_status(
        &mut self,
        entry_id: &EntryId,
        status: EntryStatus,
    ) -> Result<(), ModelError> {
        self.entry_mut(entry_id)?.status = status;
        Ok(())
    }

    /// Admits one guest. Closed entries refuse.
    pub fn record_in(&mut self, entry_id: &EntryId) -> Result<&Entry, ModelError> {
        let entry = self.entry_mut(entry_id)?;
        if !entry.is_open() {
            return Err(ModelError::EntryClosed(*entry_id));
        }
        entry.total_in += 1;
        Ok(entry)
    }

    /// Records one guest leaving. Counted whether or not the entry is open.
    pub fn record_out(&mut self, entry_id: &EntryId) -> Result<&Entry, ModelError> {
        let entry = self.entry_mut(entry_id)?;
        entry.total_out += 1;
        Ok(entry)
    }

    /// Guests currently inside: everything in minus everything out, floored at 0.
    pub fn occupancy(&self) -> u64 {
        let total_in: u64 = self.entries.iter().map(|e| e.total_in).sum();
        let total_out: u64 = self.entries.iter().map(|e| e.total_out).sum();
        total_in.saturating_sub(total_out)
    }

    /// True when occupancy has just reached the alert point on this admission.
    pub fn alert_point_reached(&self) -> bool {
        self.alert_point > 0 && self.occupancy() == u64::from(self.alert_point)
    }
}
