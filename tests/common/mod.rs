#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use chrono::Utc;
use moneta::storage::{SqliteStorage, Storage, StorageTx, StorageWrite};
use moneta::types::{CatalogItem, ItemDetails, ItemDraft, ItemKind, UserId};
use tempfile::TempDir;

/// A fresh, migrated database in its own temp dir.
pub fn storage() -> (TempDir, SqliteStorage) {
    let dir = TempDir::new().expect("temp dir");
    let storage = SqliteStorage::new(dir.path().join("moneta.sqlite"));
    storage.init().expect("init storage");
    (dir, storage)
}

pub fn draft(kind: ItemKind, name: &str, published: bool) -> ItemDraft {
    let details = match kind {
        ItemKind::Coin => ItemDetails::Coin {
            material: Some("silver".to_string()),
            weight_grams: Some(20.0),
            mint: None,
            diameter_mm: Some(37.0),
        },
        ItemKind::Banknote => ItemDetails::Banknote {
            serial_number: Some("AA 0000001".to_string()),
            width_mm: Some(157),
            height_mm: Some(69),
        },
    };
    ItemDraft {
        name: name.to_string(),
        description: String::new(),
        year: Some(1924),
        country: "USSR".to_string(),
        category: None,
        denomination: "1".to_string(),
        currency: Some("ruble".to_string()),
        is_published: published,
        is_on_main: false,
        details,
    }
}

pub fn seed(
    storage: &SqliteStorage,
    kind: ItemKind,
    name: &str,
    published: bool,
    author: Option<i64>,
) -> CatalogItem {
    let tx = storage.begin_tx().expect("begin tx");
    let item = tx
        .insert_item(
            &draft(kind, name, published),
            author.map(UserId),
            Utc::now(),
        )
        .expect("insert item");
    tx.commit().expect("commit");
    item
}

/// The daemon binary pointed at `data_dir`, with no `.env` leaking in.
pub fn base_cmd(data_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_moneta"));
    cmd.env("DOTENV_PATH", data_dir.join("missing.env"))
        .env_remove("MONETA_DATA_DIR")
        .env_remove("MONETA_LOG_FILE")
        .env_remove("MONETA_API_LISTEN")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}
