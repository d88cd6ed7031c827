use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    collection::{Notice, OwnedItem},
    types::{CatalogItem, CollectionEntry, ItemDetails, ItemKind, Page, UserId},
};

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    /// Where a browser client should go instead, for requests that make no
    /// sense at all (such as an unknown item kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub kind: ItemKind,
    pub id: i64,
    pub name: String,
    pub description: String,
    pub year: Option<i32>,
    pub country: String,
    pub category: Option<String>,
    pub denomination: String,
    pub currency: Option<String>,
    pub author: Option<UserId>,
    pub is_published: bool,
    pub is_on_main: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_grams: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_mm: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_mm: Option<i64>,
}

impl From<CatalogItem> for ItemResponse {
    fn from(item: CatalogItem) -> Self {
        let mut response = ItemResponse {
            kind: item.kind(),
            id: item.id,
            name: item.name,
            description: item.description,
            year: item.year,
            country: item.country,
            category: item.category,
            denomination: item.denomination,
            currency: item.currency,
            author: item.author,
            is_published: item.is_published,
            is_on_main: item.is_on_main,
            created_at: item.created_at,
            updated_at: item.updated_at,
            material: None,
            weight_grams: None,
            mint: None,
            diameter_mm: None,
            serial_number: None,
            width_mm: None,
            height_mm: None,
        };
        match item.details {
            ItemDetails::Coin {
                material,
                weight_grams,
                mint,
                diameter_mm,
            } => {
                response.material = material;
                response.weight_grams = weight_grams;
                response.mint = mint;
                response.diameter_mm = diameter_mm;
            }
            ItemDetails::Banknote {
                serial_number,
                width_mm,
                height_mm,
            } => {
                response.serial_number = serial_number;
                response.width_mm = width_mm;
                response.height_mm = height_mm;
            }
        }
        response
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedResponse {
    pub coins: Vec<ItemResponse>,
    pub banknotes: Vec<ItemResponse>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub num_pages: u64,
    pub total: u64,
    pub per_page: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> PageResponse<T> {
    pub fn from_page<U: Into<T>>(page: Page<U>) -> Self {
        let has_next = page.has_next();
        let has_previous = page.has_previous();
        PageResponse {
            items: page.items.into_iter().map(Into::into).collect(),
            page: page.number,
            num_pages: page.num_pages,
            total: page.total,
            per_page: page.per_page,
            has_next,
            has_previous,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableResponse {
    pub coins: PageResponse<ItemResponse>,
    pub banknotes: PageResponse<ItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub id: i64,
    pub owner: UserId,
    pub item_kind: ItemKind,
    pub item_id: i64,
    pub notes: String,
    pub added_at: DateTime<Utc>,
}

impl From<CollectionEntry> for EntryResponse {
    fn from(entry: CollectionEntry) -> Self {
        EntryResponse {
            id: entry.id,
            owner: entry.owner,
            item_kind: entry.item.kind(),
            item_id: entry.item.id(),
            notes: entry.notes,
            added_at: entry.added_at,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedItemResponse {
    pub entry: EntryResponse,
    pub item: ItemResponse,
}

impl From<OwnedItem> for OwnedItemResponse {
    fn from(owned: OwnedItem) -> Self {
        OwnedItemResponse {
            entry: owned.entry.into(),
            item: owned.item.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedResponse {
    pub entry: EntryResponse,
    pub item: ItemResponse,
    pub notice: Notice,
}

/// The soft-duplicate reply. `notes` echoes what the client submitted so the
/// form can be shown again unchanged.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateResponse {
    pub duplicate: bool,
    pub item: ItemResponse,
    pub notes: String,
    pub notice: Notice,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub entry: EntryResponse,
    pub notice: Notice,
}

#[derive(Default, Serialize, Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: String,
}

#[derive(Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct AvailableQuery {
    pub coin_page: Option<String>,
    pub banknote_page: Option<String>,
}
