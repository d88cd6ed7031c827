use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{
    params, params_from_iter,
    types::{Type, Value},
    Connection, OptionalExtension,
};
use std::{path::Path, time::Duration};

use super::traits::{ItemQuery, Storage, StorageRead, StorageTx, StorageWrite};
use crate::types::{
    CatalogItem, CollectionEntry, InsertOutcome, ItemDetails, ItemDraft, ItemKind, ItemRef,
    UserId,
};

const DB_SCHEMA_VERSION: i64 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ITEM_COLUMNS: &str = "id, name, description, year, country, category, denomination, \
     currency, author_id, is_published, is_on_main, created_at, updated_at";
const COIN_COLUMNS: &str = "material, weight_grams, mint, diameter_mm";
const BANKNOTE_COLUMNS: &str = "serial_number, width_mm, height_mm";

const ENTRY_COLUMNS: &str = "id, user_id, coin_id, banknote_id, notes, added_at";

#[derive(Clone)]
pub struct SqliteStorage {
    pub path: String,
}

pub struct SqliteTx {
    conn: Connection,
}

impl StorageTx for SqliteTx {
    fn commit(self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }
}

fn item_table(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Coin => "coins",
        ItemKind::Banknote => "banknotes",
    }
}

fn entry_column(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Coin => "coin_id",
        ItemKind::Banknote => "banknote_id",
    }
}

fn item_select(kind: ItemKind) -> String {
    let extra = match kind {
        ItemKind::Coin => COIN_COLUMNS,
        ItemKind::Banknote => BANKNOTE_COLUMNS,
    };
    format!("SELECT {ITEM_COLUMNS}, {extra} FROM {}", item_table(kind))
}

fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_sql(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn map_item_row(kind: ItemKind, row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogItem> {
    let author_id: Option<i64> = row.get(8)?;
    let details = match kind {
        ItemKind::Coin => ItemDetails::Coin {
            material: row.get(13)?,
            weight_grams: row.get(14)?,
            mint: row.get(15)?,
            diameter_mm: row.get(16)?,
        },
        ItemKind::Banknote => ItemDetails::Banknote {
            serial_number: row.get(13)?,
            width_mm: row.get(14)?,
            height_mm: row.get(15)?,
        },
    };
    Ok(CatalogItem {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        year: row.get(3)?,
        country: row.get(4)?,
        category: row.get(5)?,
        denomination: row.get(6)?,
        currency: row.get(7)?,
        author: author_id.map(UserId),
        is_published: row.get::<_, i64>(9)? != 0,
        is_on_main: row.get::<_, i64>(10)? != 0,
        created_at: ts_from_sql(row, 11)?,
        updated_at: ts_from_sql(row, 12)?,
        details,
    })
}

fn map_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CollectionEntry> {
    let coin_id: Option<i64> = row.get(2)?;
    let banknote_id: Option<i64> = row.get(3)?;
    let item = match (coin_id, banknote_id) {
        (Some(id), None) => ItemRef::Coin(id),
        (None, Some(id)) => ItemRef::Banknote(id),
        _ => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Integer,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "collection entry must reference exactly one item",
                )),
            ))
        }
    };
    Ok(CollectionEntry {
        id: row.get(0)?,
        owner: UserId(row.get(1)?),
        item,
        notes: row.get(4)?,
        added_at: ts_from_sql(row, 5)?,
    })
}

fn db_load_item(conn: &Connection, item: ItemRef) -> rusqlite::Result<Option<CatalogItem>> {
    let kind = item.kind();
    conn.query_row(
        &format!("{} WHERE id = ?1", item_select(kind)),
        params![item.id()],
        |row| map_item_row(kind, row),
    )
    .optional()
}

/// WHERE clause and its positional parameters for an item listing.
fn item_filter(query: &ItemQuery) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if query.featured_only {
        clauses.push("is_published = 1 AND is_on_main = 1".to_string());
    }
    match query.visible_to.user() {
        Some(user) => {
            clauses.push("(is_published = 1 OR author_id = ?)".to_string());
            values.push(Value::Integer(user.0));
        }
        None => clauses.push("is_published = 1".to_string()),
    }
    if let Some(owner) = query.exclude_collected_by {
        clauses.push(format!(
            "NOT EXISTS (SELECT 1 FROM collection_items ci WHERE ci.user_id = ? AND ci.{} = {}.id)",
            entry_column(query.kind),
            item_table(query.kind)
        ));
        values.push(Value::Integer(owner.0));
    }

    (clauses.join(" AND "), values)
}

fn db_count_items(conn: &Connection, query: &ItemQuery) -> rusqlite::Result<u64> {
    let (filter, values) = item_filter(query);
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {filter}",
        item_table(query.kind)
    );
    let count: i64 = conn.query_row(&sql, params_from_iter(&values), |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

fn db_list_items(
    conn: &Connection,
    query: &ItemQuery,
    limit: u64,
    offset: u64,
) -> rusqlite::Result<Vec<CatalogItem>> {
    let (filter, mut values) = item_filter(query);
    let sql = format!(
        "{} WHERE {filter} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        item_select(query.kind)
    );
    values.push(Value::Integer(to_sql_int(limit)));
    values.push(Value::Integer(to_sql_int(offset)));

    let kind = query.kind;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(&values), |row| map_item_row(kind, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn db_insert_item(
    conn: &Connection,
    draft: &ItemDraft,
    author: Option<UserId>,
    now: DateTime<Utc>,
) -> rusqlite::Result<CatalogItem> {
    let kind = draft.details.kind();
    let created = ts_to_sql(now);
    let author_id = author.map(|a| a.0);
    match &draft.details {
        ItemDetails::Coin {
            material,
            weight_grams,
            mint,
            diameter_mm,
        } => conn.execute(
            r#"
            INSERT INTO coins (
                name, description, year, country, category, denomination, currency,
                author_id, is_published, is_on_main, created_at, updated_at,
                material, weight_grams, mint, diameter_mm
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                draft.name,
                draft.description,
                draft.year,
                draft.country,
                draft.category,
                draft.denomination,
                draft.currency,
                author_id,
                draft.is_published as i64,
                draft.is_on_main as i64,
                created,
                material,
                weight_grams,
                mint,
                diameter_mm
            ],
        )?,
        ItemDetails::Banknote {
            serial_number,
            width_mm,
            height_mm,
        } => conn.execute(
            r#"
            INSERT INTO banknotes (
                name, description, year, country, category, denomination, currency,
                author_id, is_published, is_on_main, created_at, updated_at,
                serial_number, width_mm, height_mm
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12, ?13, ?14)
            "#,
            params![
                draft.name,
                draft.description,
                draft.year,
                draft.country,
                draft.category,
                draft.denomination,
                draft.currency,
                author_id,
                draft.is_published as i64,
                draft.is_on_main as i64,
                created,
                serial_number,
                width_mm,
                height_mm
            ],
        )?,
    };

    let id = conn.last_insert_rowid();
    db_load_item(conn, kind.item_ref(id))?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

fn db_update_item(
    conn: &Connection,
    item: ItemRef,
    draft: &ItemDraft,
    now: DateTime<Utc>,
) -> Result<bool> {
    if draft.details.kind() != item.kind() {
        anyhow::bail!(
            "cannot update {} with {} details",
            item,
            draft.details.kind()
        );
    }
    let updated = ts_to_sql(now);
    let rows = match &draft.details {
        ItemDetails::Coin {
            material,
            weight_grams,
            mint,
            diameter_mm,
        } => conn.execute(
            r#"
            UPDATE coins
            SET name = ?1, description = ?2, year = ?3, country = ?4, category = ?5,
                denomination = ?6, currency = ?7, is_published = ?8, is_on_main = ?9,
                updated_at = ?10, material = ?11, weight_grams = ?12, mint = ?13,
                diameter_mm = ?14
            WHERE id = ?15
            "#,
            params![
                draft.name,
                draft.description,
                draft.year,
                draft.country,
                draft.category,
                draft.denomination,
                draft.currency,
                draft.is_published as i64,
                draft.is_on_main as i64,
                updated,
                material,
                weight_grams,
                mint,
                diameter_mm,
                item.id()
            ],
        )?,
        ItemDetails::Banknote {
            serial_number,
            width_mm,
            height_mm,
        } => conn.execute(
            r#"
            UPDATE banknotes
            SET name = ?1, description = ?2, year = ?3, country = ?4, category = ?5,
                denomination = ?6, currency = ?7, is_published = ?8, is_on_main = ?9,
                updated_at = ?10, serial_number = ?11, width_mm = ?12, height_mm = ?13
            WHERE id = ?14
            "#,
            params![
                draft.name,
                draft.description,
                draft.year,
                draft.country,
                draft.category,
                draft.denomination,
                draft.currency,
                draft.is_published as i64,
                draft.is_on_main as i64,
                updated,
                serial_number,
                width_mm,
                height_mm,
                item.id()
            ],
        )?,
    };
    Ok(rows > 0)
}

fn db_delete_item(conn: &Connection, item: ItemRef) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", item_table(item.kind())),
        params![item.id()],
    )?;
    Ok(rows > 0)
}

fn db_load_entry(conn: &Connection, entry_id: i64) -> rusqlite::Result<Option<CollectionEntry>> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM collection_items WHERE id = ?1"),
        params![entry_id],
        map_entry_row,
    )
    .optional()
}

fn db_find_entry(
    conn: &Connection,
    owner: UserId,
    item: ItemRef,
) -> rusqlite::Result<Option<CollectionEntry>> {
    conn.query_row(
        &format!(
            "SELECT {ENTRY_COLUMNS} FROM collection_items WHERE user_id = ?1 AND {} = ?2",
            entry_column(item.kind())
        ),
        params![owner.0, item.id()],
        map_entry_row,
    )
    .optional()
}

fn db_list_entries(
    conn: &Connection,
    owner: UserId,
    window: Option<(u64, u64)>,
) -> rusqlite::Result<Vec<CollectionEntry>> {
    let (limit, offset) = window
        .map(|(limit, offset)| (to_sql_int(limit), to_sql_int(offset)))
        .unwrap_or((-1, 0));
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {ENTRY_COLUMNS}
        FROM collection_items
        WHERE user_id = ?1
        ORDER BY added_at DESC, id DESC
        LIMIT ?2 OFFSET ?3
        "#
    ))?;
    let rows = stmt
        .query_map(params![owner.0, limit, offset], map_entry_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn db_count_entries(conn: &Connection, owner: UserId) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM collection_items WHERE user_id = ?1",
        params![owner.0],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

fn db_insert_entry(
    conn: &Connection,
    owner: UserId,
    item: ItemRef,
    notes: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<InsertOutcome> {
    let (coin_id, banknote_id) = match item {
        ItemRef::Coin(id) => (Some(id), None),
        ItemRef::Banknote(id) => (None, Some(id)),
    };
    let inserted = conn.execute(
        r#"
        INSERT INTO collection_items (user_id, coin_id, banknote_id, notes, added_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![owner.0, coin_id, banknote_id, notes, ts_to_sql(now)],
    );
    match inserted {
        Ok(_) => Ok(InsertOutcome::Created(CollectionEntry {
            id: conn.last_insert_rowid(),
            owner,
            item,
            notes: notes.to_string(),
            added_at: now,
        })),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Duplicate),
        Err(err) => Err(err),
    }
}

fn db_update_entry_notes(conn: &Connection, entry_id: i64, notes: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE collection_items SET notes = ?1 WHERE id = ?2",
        params![notes, entry_id],
    )?;
    Ok(rows > 0)
}

fn db_delete_entry(conn: &Connection, entry_id: i64) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "DELETE FROM collection_items WHERE id = ?1",
        params![entry_id],
    )?;
    Ok(rows > 0)
}

impl StorageRead for SqliteTx {
    fn load_item(&self, item: ItemRef) -> Result<Option<CatalogItem>> {
        Ok(db_load_item(&self.conn, item)?)
    }

    fn count_items(&self, query: &ItemQuery) -> Result<u64> {
        Ok(db_count_items(&self.conn, query)?)
    }

    fn list_items(&self, query: &ItemQuery, limit: u64, offset: u64) -> Result<Vec<CatalogItem>> {
        Ok(db_list_items(&self.conn, query, limit, offset)?)
    }

    fn load_entry(&self, entry_id: i64) -> Result<Option<CollectionEntry>> {
        Ok(db_load_entry(&self.conn, entry_id)?)
    }

    fn find_entry(&self, owner: UserId, item: ItemRef) -> Result<Option<CollectionEntry>> {
        Ok(db_find_entry(&self.conn, owner, item)?)
    }

    fn list_entries_for(&self, owner: UserId) -> Result<Vec<CollectionEntry>> {
        Ok(db_list_entries(&self.conn, owner, None)?)
    }

    fn count_entries_for(&self, owner: UserId) -> Result<u64> {
        Ok(db_count_entries(&self.conn, owner)?)
    }

    fn list_entries_page(
        &self,
        owner: UserId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<CollectionEntry>> {
        Ok(db_list_entries(&self.conn, owner, Some((limit, offset)))?)
    }
}

impl StorageWrite for SqliteTx {
    fn insert_item(
        &self,
        draft: &ItemDraft,
        author: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<CatalogItem> {
        Ok(db_insert_item(&self.conn, draft, author, now)?)
    }

    fn update_item(&self, item: ItemRef, draft: &ItemDraft, now: DateTime<Utc>) -> Result<bool> {
        db_update_item(&self.conn, item, draft, now)
    }

    fn delete_item(&self, item: ItemRef) -> Result<bool> {
        Ok(db_delete_item(&self.conn, item)?)
    }

    fn insert_entry(
        &self,
        owner: UserId,
        item: ItemRef,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome> {
        Ok(db_insert_entry(&self.conn, owner, item, notes, now)?)
    }

    fn update_entry_notes(&self, entry_id: i64, notes: &str) -> Result<bool> {
        Ok(db_update_entry_notes(&self.conn, entry_id, notes)?)
    }

    fn delete_entry(&self, entry_id: i64) -> Result<bool> {
        Ok(db_delete_entry(&self.conn, entry_id)?)
    }
}

impl Storage for SqliteStorage {
    type Tx = SqliteTx;

    fn begin_tx(&self) -> Result<Self::Tx> {
        let conn = Self::open(&self.path)?;
        conn.execute("BEGIN IMMEDIATE", [])?;
        Ok(SqliteTx { conn })
    }
}

impl SqliteStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// Delete the database file along with its WAL sidecars.
    pub fn reset_all(&self) -> Result<()> {
        for suffix in ["", "-wal", "-shm"] {
            let path = format!("{}{}", self.path, suffix);
            if Path::new(&path).exists() {
                std::fs::remove_file(&path)?;
            }
        }
        log::warn!("🧹 Deleted database at {}", self.path);
        Ok(())
    }

    pub fn init(&self) -> Result<()> {
        self.with_conn(|_conn| Ok(()))?;
        Ok(())
    }

    fn open(path: &str) -> rusqlite::Result<Connection> {
        let conn = Connection::open(path)?;
        // Set first so the pragmas below also wait out a concurrent writer.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    fn with_conn<F, T>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = Self::open(&self.path)?;
        Self::migrate(&conn)?;
        f(&conn)
    }

    fn migrate(conn: &Connection) -> rusqlite::Result<()> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version == DB_SCHEMA_VERSION {
            return Ok(());
        }

        log::info!(
            "SQLite schema migration: {} -> {}",
            version,
            DB_SCHEMA_VERSION
        );

        if version == 0 {
            conn.execute_batch(
                r#"
            CREATE TABLE coins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                year INTEGER,
                country TEXT NOT NULL,
                category TEXT,
                denomination TEXT NOT NULL,
                currency TEXT,
                author_id INTEGER,
                is_published INTEGER NOT NULL DEFAULT 1 CHECK (is_published IN (0, 1)),
                is_on_main INTEGER NOT NULL DEFAULT 0 CHECK (is_on_main IN (0, 1)),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                material TEXT,
                weight_grams REAL,
                mint TEXT,
                diameter_mm REAL
            );
            CREATE TABLE banknotes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                year INTEGER,
                country TEXT NOT NULL,
                category TEXT,
                denomination TEXT NOT NULL,
                currency TEXT,
                author_id INTEGER,
                is_published INTEGER NOT NULL DEFAULT 1 CHECK (is_published IN (0, 1)),
                is_on_main INTEGER NOT NULL DEFAULT 0 CHECK (is_on_main IN (0, 1)),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                serial_number TEXT,
                width_mm INTEGER,
                height_mm INTEGER
            );
            CREATE TABLE collection_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                coin_id INTEGER REFERENCES coins(id) ON DELETE CASCADE,
                banknote_id INTEGER REFERENCES banknotes(id) ON DELETE CASCADE,
                notes TEXT NOT NULL DEFAULT '',
                added_at TEXT NOT NULL,
                CHECK ((coin_id IS NULL) <> (banknote_id IS NULL))
            );
            CREATE UNIQUE INDEX collection_items_user_coin_uniq
                ON collection_items(user_id, coin_id)
                WHERE coin_id IS NOT NULL;
            CREATE UNIQUE INDEX collection_items_user_banknote_uniq
                ON collection_items(user_id, banknote_id)
                WHERE banknote_id IS NOT NULL;
            CREATE INDEX collection_items_user_added_idx
                ON collection_items(user_id, added_at);
            CREATE INDEX collection_items_coin_idx ON collection_items(coin_id);
            CREATE INDEX collection_items_banknote_idx ON collection_items(banknote_id);
            CREATE INDEX coins_created_idx ON coins(created_at);
            CREATE INDEX banknotes_created_idx ON banknotes(created_at);
        "#,
            )?;
            conn.pragma_update(None, "user_version", DB_SCHEMA_VERSION)?;
            return Ok(());
        }

        Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::ErrorCode::SchemaChanged as i32),
            Some("database schema version mismatch; please run with --reset option".to_string()),
        ))
    }
}

impl StorageRead for SqliteStorage {
    fn load_item(&self, item: ItemRef) -> Result<Option<CatalogItem>> {
        Ok(self.with_conn(|conn| db_load_item(conn, item))?)
    }

    fn count_items(&self, query: &ItemQuery) -> Result<u64> {
        Ok(self.with_conn(|conn| db_count_items(conn, query))?)
    }

    fn list_items(&self, query: &ItemQuery, limit: u64, offset: u64) -> Result<Vec<CatalogItem>> {
        let rows = self.with_conn(|conn| db_list_items(conn, query, limit, offset))?;
        Ok(rows)
    }

    fn load_entry(&self, entry_id: i64) -> Result<Option<CollectionEntry>> {
        Ok(self.with_conn(|conn| db_load_entry(conn, entry_id))?)
    }

    fn find_entry(&self, owner: UserId, item: ItemRef) -> Result<Option<CollectionEntry>> {
        Ok(self.with_conn(|conn| db_find_entry(conn, owner, item))?)
    }

    fn list_entries_for(&self, owner: UserId) -> Result<Vec<CollectionEntry>> {
        Ok(self.with_conn(|conn| db_list_entries(conn, owner, None))?)
    }

    fn count_entries_for(&self, owner: UserId) -> Result<u64> {
        Ok(self.with_conn(|conn| db_count_entries(conn, owner))?)
    }

    fn list_entries_page(
        &self,
        owner: UserId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<CollectionEntry>> {
        let rows = self.with_conn(|conn| db_list_entries(conn, owner, Some((limit, offset))))?;
        Ok(rows)
    }
}
