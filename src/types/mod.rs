mod entry;
mod item;
mod page;
mod viewer;

pub use entry::{CollectionEntry, InsertOutcome};
pub use item::{CatalogItem, ItemDetails, ItemDraft, ItemKind, ItemKindParseError, ItemRef};
pub use page::{Page, PageRequest};
pub use viewer::{UserId, Viewer};
