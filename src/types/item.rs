use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Coin,
    Banknote,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Coin => "coin",
            ItemKind::Banknote => "banknote",
        }
    }

    pub fn item_ref(&self, id: i64) -> ItemRef {
        match self {
            ItemKind::Coin => ItemRef::Coin(id),
            ItemKind::Banknote => ItemRef::Banknote(id),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown item kind: {0:?}")]
pub struct ItemKindParseError(pub String);

impl FromStr for ItemKind {
    type Err = ItemKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coin" => Ok(ItemKind::Coin),
            "banknote" => Ok(ItemKind::Banknote),
            other => Err(ItemKindParseError(other.to_string())),
        }
    }
}

/// Reference to exactly one catalog item. A collection entry carries one of
/// these instead of a pair of nullable ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemRef {
    Coin(i64),
    Banknote(i64),
}

impl ItemRef {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemRef::Coin(_) => ItemKind::Coin,
            ItemRef::Banknote(_) => ItemKind::Banknote,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ItemRef::Coin(id) | ItemRef::Banknote(id) => *id,
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Fields that only exist for one kind of item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemDetails {
    Coin {
        #[serde(default)]
        material: Option<String>,
        #[serde(default)]
        weight_grams: Option<f64>,
        #[serde(default)]
        mint: Option<String>,
        #[serde(default)]
        diameter_mm: Option<f64>,
    },
    Banknote {
        #[serde(default)]
        serial_number: Option<String>,
        #[serde(default)]
        width_mm: Option<i64>,
        #[serde(default)]
        height_mm: Option<i64>,
    },
}

impl ItemDetails {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemDetails::Coin { .. } => ItemKind::Coin,
            ItemDetails::Banknote { .. } => ItemKind::Banknote,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub year: Option<i32>,
    pub country: String,
    pub category: Option<String>,
    pub denomination: String,
    pub currency: Option<String>,
    /// Unset for rows that came in through a bulk import.
    pub author: Option<UserId>,
    pub is_published: bool,
    pub is_on_main: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub details: ItemDetails,
}

impl CatalogItem {
    pub fn kind(&self) -> ItemKind {
        self.details.kind()
    }

    pub fn item_ref(&self) -> ItemRef {
        self.kind().item_ref(self.id)
    }
}

/// Writable shape of a catalog item, used for create, update and import.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub year: Option<i32>,
    pub country: String,
    #[serde(default)]
    pub category: Option<String>,
    pub denomination: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "default_published")]
    pub is_published: bool,
    #[serde(default)]
    pub is_on_main: bool,
    #[serde(flatten)]
    pub details: ItemDetails,
}

fn default_published() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_kind_parses_known_values() {
        assert_eq!("coin".parse::<ItemKind>().unwrap(), ItemKind::Coin);
        assert_eq!("banknote".parse::<ItemKind>().unwrap(), ItemKind::Banknote);
    }

    #[test]
    fn item_kind_rejects_unknown_and_case_variants() {
        assert_eq!(
            "stamp".parse::<ItemKind>().unwrap_err(),
            ItemKindParseError("stamp".to_string())
        );
        assert!("Coin".parse::<ItemKind>().is_err());
    }

    #[test]
    fn item_ref_display_and_accessors() {
        let r = ItemKind::Banknote.item_ref(42);
        assert_eq!(r, ItemRef::Banknote(42));
        assert_eq!(r.to_string(), "banknote:42");
        assert_eq!(r.kind(), ItemKind::Banknote);
        assert_eq!(r.id(), 42);
    }

    #[test]
    fn draft_deserializes_with_kind_tag_and_defaults() {
        let draft: ItemDraft = serde_json::from_str(
            r#"{"kind":"coin","name":"Ruble","country":"Russia","denomination":"1","weight_grams":3.25}"#,
        )
        .unwrap();
        assert_eq!(draft.details.kind(), ItemKind::Coin);
        assert!(draft.is_published);
        assert!(!draft.is_on_main);
        assert_eq!(draft.description, "");
        match draft.details {
            ItemDetails::Coin { weight_grams, .. } => assert_eq!(weight_grams, Some(3.25)),
            other => panic!("unexpected details {:?}", other),
        }
    }
}
