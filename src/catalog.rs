use std::cmp::Ordering;

use chrono::{Datelike, Utc};

use crate::{
    error::{MonetaError, Result},
    storage::{ItemQuery, Storage, StorageRead, StorageTx, StorageWrite},
    types::{CatalogItem, ItemDetails, ItemDraft, ItemKind, ItemRef, Page, PageRequest, Viewer},
    visibility::{can_modify, is_visible},
};

pub const CATALOG_PAGE_SIZE: u64 = 12;
pub const FEATURED_LIMIT: u64 = 3;

const MAX_NAME_LEN: usize = 200;
const MAX_YEARS_AHEAD: i32 = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct FeaturedItems {
    pub coins: Vec<CatalogItem>,
    pub banknotes: Vec<CatalogItem>,
}

/// Read and author-side write access to coins and banknotes. Every read
/// goes through the visibility policy; writes require authorship.
#[derive(Clone)]
pub struct CatalogService<S> {
    storage: S,
}

impl<S: Storage> CatalogService<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Published items flagged for the front page, newest first.
    pub fn featured(&self) -> Result<FeaturedItems> {
        let fetch = |kind| {
            self.storage
                .list_items(&ItemQuery::featured(kind), FEATURED_LIMIT, 0)
        };
        Ok(FeaturedItems {
            coins: fetch(ItemKind::Coin)?,
            banknotes: fetch(ItemKind::Banknote)?,
        })
    }

    pub fn list(
        &self,
        viewer: &Viewer,
        kind: ItemKind,
        page: PageRequest,
    ) -> Result<Page<CatalogItem>> {
        let query = ItemQuery::visible(kind, *viewer);
        let total = self.storage.count_items(&query)?;
        let page = Page::load(page, total, CATALOG_PAGE_SIZE, |limit, offset| {
            self.storage.list_items(&query, limit, offset)
        })?;
        Ok(page)
    }

    /// Hidden items are reported as missing so their existence does not leak.
    pub fn detail(&self, viewer: &Viewer, item: ItemRef) -> Result<CatalogItem> {
        match self.storage.load_item(item)? {
            Some(found) if is_visible(viewer, &found) => Ok(found),
            _ => Err(not_found(item)),
        }
    }

    pub fn create(&self, viewer: &Viewer, kind: ItemKind, draft: ItemDraft) -> Result<CatalogItem> {
        let author = viewer.user().ok_or_else(|| {
            MonetaError::Forbidden("Please sign in to add items to the catalog.".to_string())
        })?;
        check_kind(kind, &draft)?;
        validate_draft(&draft)?;

        let tx = self.storage.begin_tx()?;
        let item = tx.insert_item(&draft, Some(author), Utc::now())?;
        tx.commit()?;
        log::info!("🪙 {} created {} ({:?})", author, item.item_ref(), item.name);
        Ok(item)
    }

    /// Existence and authorship are checked before the draft itself, so a
    /// bad body never hides a 404 or 403.
    pub fn update(&self, viewer: &Viewer, item: ItemRef, draft: ItemDraft) -> Result<CatalogItem> {
        let tx = self.storage.begin_tx()?;
        let existing = tx.load_item(item)?.ok_or_else(|| not_found(item))?;
        if !can_modify(viewer, &existing) {
            log::warn!("⛔ {} tried to edit {}", viewer, item);
            return Err(MonetaError::Forbidden(
                "You do not have permission to edit this item.".to_string(),
            ));
        }
        check_kind(item.kind(), &draft)?;
        validate_draft(&draft)?;

        tx.update_item(item, &draft, Utc::now())?;
        let updated = tx.load_item(item)?.ok_or_else(|| not_found(item))?;
        tx.commit()?;
        log::info!("✏️ {} updated {}", viewer, item);
        Ok(updated)
    }

    /// Removes the item and, through the schema, every collection entry that
    /// references it.
    pub fn delete(&self, viewer: &Viewer, item: ItemRef) -> Result<CatalogItem> {
        let tx = self.storage.begin_tx()?;
        let existing = tx.load_item(item)?.ok_or_else(|| not_found(item))?;
        if !can_modify(viewer, &existing) {
            log::warn!("⛔ {} tried to delete {}", viewer, item);
            return Err(MonetaError::Forbidden(
                "You do not have permission to delete this item.".to_string(),
            ));
        }
        tx.delete_item(item)?;
        tx.commit()?;
        log::info!("🗑️ {} deleted {}", viewer, item);
        Ok(existing)
    }

    /// Bulk load of authorless items. Either every draft is stored or none.
    pub fn import(&self, drafts: &[ItemDraft]) -> Result<Vec<CatalogItem>> {
        for (idx, draft) in drafts.iter().enumerate() {
            validate_draft(draft)
                .map_err(|err| MonetaError::Validation(format!("item #{}: {}", idx + 1, err)))?;
        }

        let tx = self.storage.begin_tx()?;
        let now = Utc::now();
        let items = drafts
            .iter()
            .map(|draft| tx.insert_item(draft, None, now))
            .collect::<anyhow::Result<Vec<_>>>()?;
        tx.commit()?;
        log::info!("📦 Imported {} catalog items", items.len());
        Ok(items)
    }
}

fn not_found(item: ItemRef) -> MonetaError {
    MonetaError::NotFound(format!("{} {} not found", item.kind(), item.id()))
}

fn check_kind(kind: ItemKind, draft: &ItemDraft) -> Result<()> {
    if draft.details.kind() != kind {
        return Err(MonetaError::Validation(format!(
            "expected {} details, got {}",
            kind,
            draft.details.kind()
        )));
    }
    Ok(())
}

pub fn validate_draft(draft: &ItemDraft) -> Result<()> {
    validate_draft_for_year(draft, Utc::now().year())
}

fn validate_draft_for_year(draft: &ItemDraft, current_year: i32) -> Result<()> {
    let invalid = |msg: String| Err(MonetaError::Validation(msg));

    if draft.name.trim().is_empty() {
        return invalid("name must not be empty".to_string());
    }
    if draft.name.chars().count() > MAX_NAME_LEN {
        return invalid(format!("name must be at most {MAX_NAME_LEN} characters"));
    }
    if draft.country.trim().is_empty() {
        return invalid("country must not be empty".to_string());
    }
    if draft.denomination.trim().is_empty() {
        return invalid("denomination must not be empty".to_string());
    }
    if let Some(year) = draft.year {
        if year < 0 {
            return invalid("year cannot be negative".to_string());
        }
        let latest = current_year + MAX_YEARS_AHEAD;
        if year > latest {
            return invalid(format!("year cannot be later than {latest}"));
        }
    }

    match &draft.details {
        ItemDetails::Coin {
            weight_grams,
            diameter_mm,
            ..
        } => {
            positive_f64("weight_grams", *weight_grams)?;
            positive_f64("diameter_mm", *diameter_mm)?;
        }
        ItemDetails::Banknote {
            width_mm,
            height_mm,
            ..
        } => {
            positive_i64("width_mm", *width_mm)?;
            positive_i64("height_mm", *height_mm)?;
        }
    }
    Ok(())
}

fn positive_f64(field: &str, value: Option<f64>) -> Result<()> {
    match value {
        // NaN compares as None and is rejected too.
        Some(v) if v.partial_cmp(&0.0) != Some(Ordering::Greater) => {
            Err(MonetaError::Validation(format!("{field} must be positive")))
        }
        _ => Ok(()),
    }
}

fn positive_i64(field: &str, value: Option<i64>) -> Result<()> {
    match value {
        Some(v) if v <= 0 => Err(MonetaError::Validation(format!("{field} must be positive"))),
        _ => Ok(()),
    }
}
