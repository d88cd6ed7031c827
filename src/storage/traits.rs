use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::types::{
    CatalogItem, CollectionEntry, InsertOutcome, ItemDraft, ItemKind, ItemRef, UserId, Viewer,
};

/// Filter for catalog listings. Rows come back newest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemQuery {
    pub kind: ItemKind,
    /// Only items this viewer may see.
    pub visible_to: Viewer,
    /// Drop items already in this user's collection.
    pub exclude_collected_by: Option<UserId>,
    /// Only published items flagged for the home page.
    pub featured_only: bool,
}

impl ItemQuery {
    pub fn visible(kind: ItemKind, viewer: Viewer) -> Self {
        Self {
            kind,
            visible_to: viewer,
            exclude_collected_by: None,
            featured_only: false,
        }
    }

    pub fn available_to_add(kind: ItemKind, owner: UserId) -> Self {
        Self {
            kind,
            visible_to: Viewer::User(owner),
            exclude_collected_by: Some(owner),
            featured_only: false,
        }
    }

    pub fn featured(kind: ItemKind) -> Self {
        Self {
            kind,
            visible_to: Viewer::Anonymous,
            exclude_collected_by: None,
            featured_only: true,
        }
    }
}

pub trait StorageRead {
    fn load_item(&self, item: ItemRef) -> Result<Option<CatalogItem>>;
    fn count_items(&self, query: &ItemQuery) -> Result<u64>;
    fn list_items(&self, query: &ItemQuery, limit: u64, offset: u64) -> Result<Vec<CatalogItem>>;

    fn load_entry(&self, entry_id: i64) -> Result<Option<CollectionEntry>>;
    fn find_entry(&self, owner: UserId, item: ItemRef) -> Result<Option<CollectionEntry>>;
    fn entry_exists(&self, owner: UserId, item: ItemRef) -> Result<bool> {
        Ok(self.find_entry(owner, item)?.is_some())
    }
    /// The owner's whole collection, newest first.
    fn list_entries_for(&self, owner: UserId) -> Result<Vec<CollectionEntry>>;
    fn count_entries_for(&self, owner: UserId) -> Result<u64>;
    fn list_entries_page(
        &self,
        owner: UserId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<CollectionEntry>>;
}

pub trait StorageWrite {
    fn insert_item(
        &self,
        draft: &ItemDraft,
        author: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<CatalogItem>;
    fn update_item(&self, item: ItemRef, draft: &ItemDraft, now: DateTime<Utc>) -> Result<bool>;
    /// Collection entries pointing at the item go with it.
    fn delete_item(&self, item: ItemRef) -> Result<bool>;

    /// Uniqueness of (owner, item) is decided here by the database, not by
    /// a prior lookup.
    fn insert_entry(
        &self,
        owner: UserId,
        item: ItemRef,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome>;
    fn update_entry_notes(&self, entry_id: i64, notes: &str) -> Result<bool>;
    fn delete_entry(&self, entry_id: i64) -> Result<bool>;
}

pub trait StorageTx: StorageRead + StorageWrite {
    fn commit(self) -> Result<()>;
}

pub trait Storage: StorageRead {
    type Tx: StorageTx;

    fn begin_tx(&self) -> Result<Self::Tx>;
}
