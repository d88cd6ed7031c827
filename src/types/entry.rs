use chrono::{DateTime, Utc};

use super::{ItemRef, UserId};

/// A user's membership record for one catalog item. Only `notes` ever
/// changes after creation.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionEntry {
    pub id: i64,
    pub owner: UserId,
    pub item: ItemRef,
    pub notes: String,
    pub added_at: DateTime<Utc>,
}

/// Result of asking the store to create an entry. `Duplicate` means the
/// store's uniqueness constraint rejected the row and nothing was written.
#[derive(Clone, Debug, PartialEq)]
pub enum InsertOutcome {
    Created(CollectionEntry),
    Duplicate,
}
