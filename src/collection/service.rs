use chrono::Utc;

use super::Notice;
use crate::{
    error::{MonetaError, Result},
    storage::{ItemQuery, Storage, StorageRead, StorageTx, StorageWrite},
    types::{
        CatalogItem, CollectionEntry, InsertOutcome, ItemKind, ItemRef, Page, PageRequest, UserId,
        Viewer,
    },
    visibility::is_visible,
};

pub const AVAILABLE_PAGE_SIZE: u64 = 6;
pub const COLLECTION_PAGE_SIZE: u64 = 12;

#[derive(Clone, Debug, PartialEq)]
pub enum AddOutcome {
    Added {
        entry: CollectionEntry,
        item: CatalogItem,
        notice: Notice,
    },
    /// The store already held this (owner, item) pair. Nothing was written;
    /// the caller re-renders its form with the submitted notes.
    Duplicate {
        item: CatalogItem,
        notes: String,
        notice: Notice,
    },
}

impl AddOutcome {
    pub fn notice(&self) -> &Notice {
        match self {
            AddOutcome::Added { notice, .. } | AddOutcome::Duplicate { notice, .. } => notice,
        }
    }
}

/// A completed remove or notes edit.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    pub entry: CollectionEntry,
    pub notice: Notice,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AvailableItems {
    pub coins: Page<CatalogItem>,
    pub banknotes: Page<CatalogItem>,
}

/// An entry paired with the item it points at, for rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedItem {
    pub entry: CollectionEntry,
    pub item: CatalogItem,
}

/// Add, remove and edit operations on a user's collection. There is no
/// locking here: concurrent adds of the same pair are settled by the store's
/// uniqueness constraint.
#[derive(Clone)]
pub struct CollectionService<S> {
    storage: S,
}

impl<S: Storage> CollectionService<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn add(
        &self,
        viewer: &Viewer,
        item_kind: &str,
        item_id: i64,
        notes: &str,
    ) -> Result<AddOutcome> {
        let kind: ItemKind = item_kind.parse()?;
        self.add_item(viewer, kind.item_ref(item_id), notes)
    }

    pub fn add_item(&self, viewer: &Viewer, item: ItemRef, notes: &str) -> Result<AddOutcome> {
        let owner = viewer.user().ok_or_else(|| {
            MonetaError::Forbidden("Please sign in to add items to your collection.".to_string())
        })?;

        let tx = self.storage.begin_tx()?;
        let found = tx.load_item(item)?.ok_or_else(|| {
            MonetaError::NotFound(format!("{} {} not found", item.kind(), item.id()))
        })?;
        if !is_visible(viewer, &found) {
            log::warn!("⛔ {} tried to collect hidden {}", owner, item);
            return Err(MonetaError::Forbidden(
                "You do not have access to this item.".to_string(),
            ));
        }

        match tx.insert_entry(owner, item, notes, Utc::now())? {
            InsertOutcome::Created(entry) => {
                tx.commit()?;
                log::info!("➕ {} added {} as entry {}", owner, item, entry.id);
                let notice = Notice::success(format!(
                    "\"{}\" was added to your collection!",
                    found.name
                ));
                Ok(AddOutcome::Added {
                    entry,
                    item: found,
                    notice,
                })
            }
            InsertOutcome::Duplicate => {
                // Dropping the transaction discards it.
                drop(tx);
                log::warn!("🔁 {} already holds {}", owner, item);
                Ok(AddOutcome::Duplicate {
                    item: found,
                    notes: notes.to_string(),
                    notice: Notice::warning("This item is already in your collection."),
                })
            }
        }
    }

    pub fn remove(&self, requester: &Viewer, entry_id: i64) -> Result<Mutation> {
        let owner = require_user(requester)?;
        let tx = self.storage.begin_tx()?;
        let entry = load_owned_entry(&tx, owner, entry_id, "remove this item from")?;
        let name = item_name(&tx, entry.item)?;

        tx.delete_entry(entry.id)?;
        tx.commit()?;
        log::info!("➖ {} removed entry {} ({})", owner, entry.id, entry.item);

        Ok(Mutation {
            notice: Notice::success(format!("\"{name}\" was removed from your collection.")),
            entry,
        })
    }

    pub fn edit_notes(&self, requester: &Viewer, entry_id: i64, notes: &str) -> Result<Mutation> {
        let owner = require_user(requester)?;
        let tx = self.storage.begin_tx()?;
        let mut entry = load_owned_entry(&tx, owner, entry_id, "edit this item in")?;

        tx.update_entry_notes(entry.id, notes)?;
        tx.commit()?;
        log::info!("📝 {} edited notes on entry {}", owner, entry.id);

        entry.notes = notes.to_string();
        Ok(Mutation {
            entry,
            notice: Notice::success("Notes updated."),
        })
    }

    /// Visible items the viewer has not collected yet, one page per kind.
    /// Reads are not isolated from concurrent adds.
    pub fn list_available_to_add(
        &self,
        viewer: &Viewer,
        coin_page: PageRequest,
        banknote_page: PageRequest,
    ) -> Result<AvailableItems> {
        let owner = require_user(viewer)?;
        Ok(AvailableItems {
            coins: self.available_page(owner, ItemKind::Coin, coin_page)?,
            banknotes: self.available_page(owner, ItemKind::Banknote, banknote_page)?,
        })
    }

    fn available_page(
        &self,
        owner: UserId,
        kind: ItemKind,
        page: PageRequest,
    ) -> Result<Page<CatalogItem>> {
        let query = ItemQuery::available_to_add(kind, owner);
        let total = self.storage.count_items(&query)?;
        let page = Page::load(page, total, AVAILABLE_PAGE_SIZE, |limit, offset| {
            self.storage.list_items(&query, limit, offset)
        })?;
        Ok(page)
    }

    /// The viewer's own entries, newest first.
    pub fn my_collection(&self, viewer: &Viewer, page: PageRequest) -> Result<Page<OwnedItem>> {
        let owner = require_user(viewer)?;
        let total = self.storage.count_entries_for(owner)?;
        let entries = Page::load(page, total, COLLECTION_PAGE_SIZE, |limit, offset| {
            self.storage.list_entries_page(owner, limit, offset)
        })?;

        let mut items = Vec::with_capacity(entries.items.len());
        for entry in &entries.items {
            // The item can vanish between the two reads; its entry went with it.
            if let Some(item) = self.storage.load_item(entry.item)? {
                items.push(OwnedItem {
                    entry: entry.clone(),
                    item,
                });
            }
        }
        Ok(Page {
            items,
            number: entries.number,
            num_pages: entries.num_pages,
            total: entries.total,
            per_page: entries.per_page,
        })
    }
}

fn require_user(viewer: &Viewer) -> Result<UserId> {
    viewer.user().ok_or_else(|| {
        MonetaError::Forbidden("Please sign in to manage your collection.".to_string())
    })
}

fn load_owned_entry<T: StorageRead>(
    tx: &T,
    owner: UserId,
    entry_id: i64,
    action: &str,
) -> Result<CollectionEntry> {
    let entry = tx.load_entry(entry_id)?.ok_or_else(|| {
        MonetaError::NotFound(format!("collection entry {entry_id} not found"))
    })?;
    if entry.owner != owner {
        log::warn!(
            "⛔ {} tried to {} entry {} owned by {}",
            owner,
            action,
            entry_id,
            entry.owner
        );
        return Err(MonetaError::Forbidden(format!(
            "You do not have permission to {action} this collection."
        )));
    }
    Ok(entry)
}

fn item_name<T: StorageRead>(tx: &T, item: ItemRef) -> Result<String> {
    Ok(tx
        .load_item(item)?
        .map(|found| found.name)
        .unwrap_or_else(|| item.to_string()))
}
