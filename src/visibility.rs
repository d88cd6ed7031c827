use crate::types::{CatalogItem, Viewer};

/// Published items are visible to everyone; unpublished ones only to their
/// author.
pub fn is_visible(viewer: &Viewer, item: &CatalogItem) -> bool {
    item.is_published || is_author(viewer, item)
}

/// Edit and delete rights on a catalog item, independent of publication.
pub fn can_modify(viewer: &Viewer, item: &CatalogItem) -> bool {
    is_author(viewer, item)
}

fn is_author(viewer: &Viewer, item: &CatalogItem) -> bool {
    match (viewer.user(), item.author) {
        (Some(user), Some(author)) => user == author,
        _ => false,
    }
}
