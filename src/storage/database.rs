//! `SQLite`-backed project file.
//!
//! One file per project with four tables:
//!
//! | Table | Columns | Notes |
//! |-------|---------|-------|
//! | `meta` | `key`, `value` | value is JSON |
//! | `assets` | `id`, `path`, `data`, `original_size`, `compressed_size` | path unique, data compressed |
//! | `items` | `id`, `data` | data is the item JSON without its id |
//! | `rules` | `id`, `type`, `data` | one row per entry; text rules store `{"text": ...}` |
//!
//! Every public method is a self-contained transaction. Nothing is cached
//! here; see [`crate::services`] for the cache tiers.
//!
//! # Connection modes
//!
//! By default each call opens its own connection, which keeps the handle
//! safe to share between threads. During write bursts (an active
//! translation run) callers switch to a long-lived connection with
//! [`ProjectDatabase::open`] and release it with [`ProjectDatabase::close`],
//! which also lets `SQLite` checkpoint the WAL.

use super::connection::{acquire_lock, open_connection};
use crate::models::meta::{
    KEY_CREATED_AT, KEY_NAME, KEY_SCHEMA_VERSION, KEY_SOURCE_LANGUAGE, KEY_TARGET_LANGUAGE,
    KEY_TRANSLATION_EXTRAS, KEY_UPDATED_AT, SCHEMA_VERSION,
};
use crate::models::{BatchUpdate, Item, ProjectSummary, RuleEntry, RuleType};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::instrument;

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS assets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL UNIQUE,
        data BLOB NOT NULL,
        original_size INTEGER NOT NULL,
        compressed_size INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        data TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_assets_path ON assets(path);
    CREATE INDEX IF NOT EXISTS idx_rules_type ON rules(type);
";

fn storage_err<E: Display>(operation: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::Storage {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn now_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Transactional store for one project file.
pub struct ProjectDatabase {
    /// Path to the project file.
    db_path: PathBuf,
    /// Long-lived connection, present between `open` and `close`.
    keep_alive: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for ProjectDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectDatabase")
            .field("db_path", &self.db_path)
            .field("long_lived", &self.is_open())
            .finish()
    }
}

impl ProjectDatabase {
    /// Creates a handle for the file at `db_path`.
    ///
    /// Nothing is touched on disk until the first call; the schema is
    /// created lazily by whichever connection opens the file first.
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            keep_alive: Mutex::new(None),
        }
    }

    /// Creates a new project file and writes the initial metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be created or written.
    pub fn create(db_path: impl Into<PathBuf>, name: &str) -> Result<Self> {
        let db = Self::new(db_path);
        let now = now_timestamp();

        let batch = BatchUpdate::new()
            .with_meta(KEY_SCHEMA_VERSION, json!(SCHEMA_VERSION))
            .with_meta(KEY_NAME, json!(name))
            .with_meta(KEY_CREATED_AT, json!(now))
            .with_meta(KEY_UPDATED_AT, json!(now));
        db.update_batch(&batch)?;

        tracing::info!(path = %db.db_path.display(), name, "Created project file");
        Ok(db)
    }

    /// Opens an existing project file and refreshes its access timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file does not exist, or
    /// [`Error::Storage`] if it cannot be written.
    pub fn load(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if !db_path.exists() {
            return Err(Error::NotFound(format!(
                "project file {}",
                db_path.display()
            )));
        }

        let db = Self::new(db_path);
        db.set_meta(KEY_UPDATED_AT, &json!(now_timestamp()))?;
        Ok(db)
    }

    /// Returns the project file path.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Switches to a long-lived connection. No-op if already open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the connection cannot be opened.
    pub fn open(&self) -> Result<()> {
        let mut guard = acquire_lock(&self.keep_alive);
        if guard.is_none() {
            let conn = open_connection(&self.db_path)?;
            ensure_schema(&conn)?;
            *guard = Some(conn);
            tracing::debug!(path = %self.db_path.display(), "Opened long-lived connection");
        }
        Ok(())
    }

    /// Releases the long-lived connection. No-op if not open.
    pub fn close(&self) {
        let conn = acquire_lock(&self.keep_alive).take();
        if let Some(conn) = conn {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(path = %self.db_path.display(), error = %e, "Failed to close connection cleanly");
            }
            tracing::debug!(path = %self.db_path.display(), "Closed long-lived connection");
        }
    }

    /// Whether a long-lived connection is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        acquire_lock(&self.keep_alive).is_some()
    }

    /// Runs `f` on the long-lived connection, or on a fresh one.
    fn with_conn<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        metrics::counter!("lgstore_storage_operations_total", "operation" => operation)
            .increment(1);

        let mut guard = acquire_lock(&self.keep_alive);
        if let Some(conn) = guard.as_mut() {
            return f(conn);
        }
        drop(guard);

        let mut conn = open_connection(&self.db_path)?;
        ensure_schema(&conn)?;
        f(&mut conn)
    }

    // ========== Metadata ==========

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on query or JSON failure.
    pub fn get_meta(&self, key: &str) -> Result<Option<Value>> {
        self.with_conn("get_meta", |conn| {
            let raw: Option<String> = conn
                .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(storage_err("get_meta"))?;

            raw.map(|s| serde_json::from_str(&s).map_err(storage_err("parse_meta")))
                .transpose()
        })
    }

    /// Upserts `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on write or JSON failure.
    pub fn set_meta(&self, key: &str, value: &Value) -> Result<()> {
        self.with_conn("set_meta", |conn| upsert_meta(conn, key, value))
    }

    /// Returns every metadata entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on query or JSON failure.
    pub fn get_all_meta(&self) -> Result<BTreeMap<String, Value>> {
        self.with_conn("get_all_meta", |conn| all_meta(conn))
    }

    // ========== Assets ==========

    /// Inserts a compressed asset.
    ///
    /// Path uniqueness is the caller's responsibility; a duplicate path
    /// fails on the table's unique constraint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the insert fails.
    pub fn add_asset(&self, path: &str, data: &[u8], original_size: u64) -> Result<i64> {
        let original_size = i64::try_from(original_size).unwrap_or(i64::MAX);
        let compressed_size = i64::try_from(data.len()).unwrap_or(i64::MAX);

        self.with_conn("add_asset", |conn| {
            conn.execute(
                "INSERT INTO assets (path, data, original_size, compressed_size)
                 VALUES (?1, ?2, ?3, ?4)",
                params![path, data, original_size, compressed_size],
            )
            .map_err(storage_err("add_asset"))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Whether an asset exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub fn has_asset(&self, path: &str) -> Result<bool> {
        self.with_conn("has_asset", |conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM assets WHERE path = ?1", params![path], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(storage_err("has_asset"))?;
            Ok(found.is_some())
        })
    }

    /// Returns the compressed payload at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub fn get_asset(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn("get_asset", |conn| {
            conn.query_row("SELECT data FROM assets WHERE path = ?1", params![path], |row| {
                row.get(0)
            })
            .optional()
            .map_err(storage_err("get_asset"))
        })
    }

    /// Returns every asset path, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub fn get_all_asset_paths(&self) -> Result<Vec<String>> {
        self.with_conn("get_all_asset_paths", |conn| {
            let mut stmt = conn
                .prepare("SELECT path FROM assets ORDER BY path")
                .map_err(storage_err("get_all_asset_paths"))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(storage_err("get_all_asset_paths"))?;

            let mut paths = Vec::new();
            for row in rows {
                paths.push(row.map_err(storage_err("get_all_asset_paths"))?);
            }
            Ok(paths)
        })
    }

    /// Returns the number of stored assets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub fn get_asset_count(&self) -> Result<usize> {
        self.with_conn("get_asset_count", |conn| count(conn, "assets"))
    }

    // ========== Items ==========

    /// Returns one item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on query or JSON failure.
    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        self.with_conn("get_item", |conn| {
            let raw: Option<String> = conn
                .query_row("SELECT data FROM items WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(storage_err("get_item"))?;

            raw.map(|data| Item::from_payload(id, &data).map_err(storage_err("parse_item")))
                .transpose()
        })
    }

    /// Returns every item ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on query or JSON failure.
    pub fn get_all_items(&self) -> Result<Vec<Item>> {
        self.with_conn("get_all_items", |conn| {
            let mut stmt = conn
                .prepare("SELECT id, data FROM items ORDER BY id")
                .map_err(storage_err("get_all_items"))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
                .map_err(storage_err("get_all_items"))?;

            let mut items = Vec::new();
            for row in rows {
                let (id, data) = row.map_err(storage_err("get_all_items"))?;
                items.push(Item::from_payload(id, &data).map_err(storage_err("parse_item"))?);
            }
            Ok(items)
        })
    }

    /// Inserts `item` when it has no id, otherwise writes it under its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on write or JSON failure.
    pub fn set_item(&self, item: &Item) -> Result<i64> {
        let payload = item.to_payload().map_err(storage_err("serialize_item"))?;

        self.with_conn("set_item", |conn| {
            if let Some(id) = item.id {
                conn.execute(
                    "INSERT INTO items (id, data) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                    params![id, payload],
                )
                .map_err(storage_err("set_item"))?;
                return Ok(id);
            }

            conn.execute("INSERT INTO items (data) VALUES (?1)", params![payload])
                .map_err(storage_err("set_item"))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Replaces the whole item table; returns the new ids in input order.
    ///
    /// Ids carried by the input are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on write or JSON failure; nothing is
    /// written in that case.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub fn set_items(&self, items: &[Item]) -> Result<Vec<i64>> {
        let payloads = items
            .iter()
            .map(Item::to_payload)
            .collect::<serde_json::Result<Vec<_>>>()
            .map_err(storage_err("serialize_item"))?;

        self.with_conn("set_items", |conn| {
            let tx = conn.transaction().map_err(storage_err("set_items_begin"))?;
            tx.execute("DELETE FROM items", [])
                .map_err(storage_err("clear_items"))?;

            let mut ids = Vec::with_capacity(payloads.len());
            {
                let mut stmt = tx
                    .prepare("INSERT INTO items (data) VALUES (?1)")
                    .map_err(storage_err("set_items"))?;
                for payload in &payloads {
                    stmt.execute(params![payload])
                        .map_err(storage_err("set_items"))?;
                    ids.push(tx.last_insert_rowid());
                }
            }

            tx.commit().map_err(storage_err("set_items_commit"))?;
            Ok(ids)
        })
    }

    /// Returns the number of items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub fn get_item_count(&self) -> Result<usize> {
        self.with_conn("get_item_count", |conn| count(conn, "items"))
    }

    /// Deletes every item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the delete fails.
    pub fn clear_items(&self) -> Result<()> {
        self.with_conn("clear_items", |conn| {
            conn.execute("DELETE FROM items", [])
                .map_err(storage_err("clear_items"))?;
            Ok(())
        })
    }

    // ========== Rules ==========

    /// Returns the entries of a list-shaped rule type in insert order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on query or JSON failure.
    pub fn get_rules(&self, rule_type: RuleType) -> Result<Vec<RuleEntry>> {
        self.with_conn("get_rules", |conn| {
            let mut stmt = conn
                .prepare("SELECT data FROM rules WHERE type = ?1 ORDER BY id")
                .map_err(storage_err("get_rules"))?;
            let rows = stmt
                .query_map(params![rule_type.as_str()], |row| row.get::<_, String>(0))
                .map_err(storage_err("get_rules"))?;

            let mut rules = Vec::new();
            for row in rows {
                let data = row.map_err(storage_err("get_rules"))?;
                rules.push(serde_json::from_str(&data).map_err(storage_err("parse_rule"))?);
            }
            Ok(rules)
        })
    }

    /// Replaces every entry of `rule_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on write or JSON failure; nothing is
    /// written in that case.
    #[instrument(skip(self, rules), fields(rule_type = %rule_type, count = rules.len()))]
    pub fn set_rules(&self, rule_type: RuleType, rules: &[RuleEntry]) -> Result<()> {
        self.with_conn("set_rules", |conn| {
            let tx = conn.transaction().map_err(storage_err("set_rules_begin"))?;
            replace_rules(&tx, rule_type, rules)?;
            tx.commit().map_err(storage_err("set_rules_commit"))
        })
    }

    /// Returns the text of a singleton rule type (empty when unset).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on query or JSON failure.
    pub fn get_rule_text(&self, rule_type: RuleType) -> Result<String> {
        self.with_conn("get_rule_text", |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT data FROM rules WHERE type = ?1 ORDER BY id LIMIT 1",
                    params![rule_type.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err("get_rule_text"))?;

            let Some(raw) = raw else {
                return Ok(String::new());
            };
            let value: Value = serde_json::from_str(&raw).map_err(storage_err("parse_rule_text"))?;
            Ok(value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string())
        })
    }

    /// Replaces the text of a singleton rule type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on write failure.
    pub fn set_rule_text(&self, rule_type: RuleType, text: &str) -> Result<()> {
        let data = json!({ "text": text }).to_string();

        self.with_conn("set_rule_text", |conn| {
            let tx = conn.transaction().map_err(storage_err("set_rule_text_begin"))?;
            tx.execute("DELETE FROM rules WHERE type = ?1", params![rule_type.as_str()])
                .map_err(storage_err("set_rule_text"))?;
            tx.execute(
                "INSERT INTO rules (type, data) VALUES (?1, ?2)",
                params![rule_type.as_str(), data],
            )
            .map_err(storage_err("set_rule_text"))?;
            tx.commit().map_err(storage_err("set_rule_text_commit"))
        })
    }

    // ========== Batch ==========

    /// Applies items, rules and metadata in one transaction.
    ///
    /// Items are updated by id (items without an id are skipped), each rule
    /// type is replaced wholesale and metadata keys are upserted. Either
    /// everything is committed or nothing is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on any failure, after rolling back.
    #[instrument(
        skip(self, batch),
        fields(items = batch.items.len(), rules = batch.rules.len(), meta = batch.meta.len())
    )]
    pub fn update_batch(&self, batch: &BatchUpdate) -> Result<()> {
        let mut item_payloads = Vec::with_capacity(batch.items.len());
        for item in &batch.items {
            let Some(id) = item.id else {
                tracing::debug!(src = %item.src, "Skipping item without id in batch update");
                continue;
            };
            item_payloads.push((id, item.to_payload().map_err(storage_err("serialize_item"))?));
        }

        self.with_conn("update_batch", |conn| {
            // Dropping the transaction without commit rolls it back.
            let tx = conn.transaction().map_err(storage_err("update_batch_begin"))?;

            for (id, payload) in &item_payloads {
                tx.execute(
                    "UPDATE items SET data = ?1 WHERE id = ?2",
                    params![payload, id],
                )
                .map_err(storage_err("update_batch_items"))?;
            }

            for (rule_type, rules) in &batch.rules {
                replace_rules(&tx, *rule_type, rules)?;
            }

            for (key, value) in &batch.meta {
                upsert_meta(&tx, key, value)?;
            }

            tx.commit().map_err(storage_err("update_batch_commit"))
        })
    }

    // ========== Summary ==========

    /// Builds a progress overview without loading items.
    ///
    /// Progress prefers the translation counters in `translation_extras`
    /// and falls back to the physical item count when the project has not
    /// been scanned yet (`total_line == 0`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the queries fail.
    pub fn get_project_summary(&self) -> Result<ProjectSummary> {
        self.with_conn("get_project_summary", |conn| {
            let meta = all_meta(conn)?;
            let file_count = count(conn, "assets")?;

            let text = |key: &str| {
                meta.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };

            let extras = meta.get(KEY_TRANSLATION_EXTRAS).and_then(Value::as_object);
            let counters = extras.and_then(|e| {
                Some((e.get("line")?.as_u64()?, e.get("total_line")?.as_u64()?))
            });

            let (translated_items, total_items) = match counters {
                Some((line, total)) if total > 0 => (line, total),
                Some((line, _)) => (line, count(conn, "items")? as u64),
                None => (0, count(conn, "items")? as u64),
            };

            let name = meta
                .get(KEY_NAME)
                .and_then(Value::as_str)
                .map_or_else(
                    || {
                        self.db_path
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_default()
                    },
                    ToString::to_string,
                );

            Ok(ProjectSummary {
                name,
                source_language: text(KEY_SOURCE_LANGUAGE),
                target_language: text(KEY_TARGET_LANGUAGE),
                created_at: text(KEY_CREATED_AT),
                updated_at: text(KEY_UPDATED_AT),
                file_count,
                total_items,
                translated_items,
                progress: ProjectSummary::ratio(translated_items, total_items),
            })
        })
    }
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)
        .map_err(storage_err("ensure_schema"))
}

fn upsert_meta(conn: &Connection, key: &str, value: &Value) -> Result<()> {
    let json = serde_json::to_string(value).map_err(storage_err("serialize_meta"))?;
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, json],
    )
    .map_err(storage_err("set_meta"))?;
    Ok(())
}

fn all_meta(conn: &Connection) -> Result<BTreeMap<String, Value>> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM meta")
        .map_err(storage_err("get_all_meta"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(storage_err("get_all_meta"))?;

    let mut meta = BTreeMap::new();
    for row in rows {
        let (key, raw) = row.map_err(storage_err("get_all_meta"))?;
        let value = serde_json::from_str(&raw).map_err(storage_err("parse_meta"))?;
        meta.insert(key, value);
    }
    Ok(meta)
}

fn replace_rules(conn: &Connection, rule_type: RuleType, rules: &[RuleEntry]) -> Result<()> {
    conn.execute("DELETE FROM rules WHERE type = ?1", params![rule_type.as_str()])
        .map_err(storage_err("clear_rules"))?;

    let mut stmt = conn
        .prepare("INSERT INTO rules (type, data) VALUES (?1, ?2)")
        .map_err(storage_err("set_rules"))?;
    for rule in rules {
        let data = serde_json::to_string(rule).map_err(storage_err("serialize_rule"))?;
        stmt.execute(params![rule_type.as_str(), data])
            .map_err(storage_err("set_rules"))?;
    }
    Ok(())
}

fn count(conn: &Connection, table: &'static str) -> Result<usize> {
    let n: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .map_err(storage_err("count"))?;
    Ok(usize::try_from(n).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemStatus;
    use tempfile::TempDir;

    fn temp_db() -> (TempDir, ProjectDatabase) {
        let dir = TempDir::new().unwrap();
        let db = ProjectDatabase::create(dir.path().join("test.lg"), "test").unwrap();
        (dir, db)
    }

    #[test]
    fn test_create_writes_initial_meta() {
        let (_dir, db) = temp_db();
        assert_eq!(db.get_meta(KEY_SCHEMA_VERSION).unwrap(), Some(json!(1)));
        assert_eq!(db.get_meta(KEY_NAME).unwrap(), Some(json!("test")));
        assert!(db.get_meta(KEY_CREATED_AT).unwrap().is_some());
        assert_eq!(db.get_meta("missing").unwrap(), None);
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = ProjectDatabase::load(dir.path().join("nope.lg"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_meta_last_write_wins() {
        let (_dir, db) = temp_db();
        db.set_meta("k", &json!({"a": 1})).unwrap();
        db.set_meta("k", &json!([1, 2])).unwrap();
        assert_eq!(db.get_meta("k").unwrap(), Some(json!([1, 2])));
        assert_eq!(db.get_all_meta().unwrap()["k"], json!([1, 2]));
    }

    #[test]
    fn test_assets() {
        let (_dir, db) = temp_db();
        db.add_asset("b/z.txt", b"zz", 10).unwrap();
        db.add_asset("a.txt", b"aa", 4).unwrap();

        assert!(db.has_asset("a.txt").unwrap());
        assert!(!db.has_asset("c.txt").unwrap());
        assert_eq!(db.get_asset("a.txt").unwrap(), Some(b"aa".to_vec()));
        assert_eq!(db.get_asset("c.txt").unwrap(), None);
        assert_eq!(db.get_all_asset_paths().unwrap(), vec!["a.txt", "b/z.txt"]);
        assert_eq!(db.get_asset_count().unwrap(), 2);

        // Uniqueness is enforced only by the schema.
        assert!(db.add_asset("a.txt", b"dup", 3).is_err());
    }

    #[test]
    fn test_set_item_insert_then_update() {
        let (_dir, db) = temp_db();
        let mut item = Item::new("hi");
        let id = db.set_item(&item).unwrap();

        item.id = Some(id);
        item.dst = "你好".to_string();
        item.status = ItemStatus::Processed;
        assert_eq!(db.set_item(&item).unwrap(), id);

        let stored = db.get_item(id).unwrap().unwrap();
        assert_eq!(stored, item);
        assert_eq!(db.get_item_count().unwrap(), 1);
    }

    #[test]
    fn test_set_items_replaces_all() {
        let (_dir, db) = temp_db();
        db.set_items(&[Item::new("old")]).unwrap();

        let ids = db.set_items(&[Item::new("a"), Item::new("b")]).unwrap();
        assert_eq!(ids.len(), 2);

        let items = db.get_all_items().unwrap();
        let srcs: Vec<_> = items.iter().map(|i| i.src.as_str()).collect();
        assert_eq!(srcs, vec!["a", "b"]);
        assert_eq!(items[0].id, Some(ids[0]));

        db.clear_items().unwrap();
        assert_eq!(db.get_item_count().unwrap(), 0);
    }

    #[test]
    fn test_rules_replace_per_type() {
        let (_dir, db) = temp_db();
        db.set_rules(RuleType::Glossary, &[RuleEntry::new("HP", "生命值")])
            .unwrap();
        db.set_rules(RuleType::PreReplacement, &[RuleEntry::new("a", "b")])
            .unwrap();
        db.set_rules(
            RuleType::Glossary,
            &[RuleEntry::new("MP", "魔力"), RuleEntry::new("SP", "技力")],
        )
        .unwrap();

        let glossary = db.get_rules(RuleType::Glossary).unwrap();
        assert_eq!(glossary.len(), 2);
        assert_eq!(glossary[0].src, "MP");
        assert_eq!(db.get_rules(RuleType::PreReplacement).unwrap().len(), 1);
    }

    #[test]
    fn test_rule_text() {
        let (_dir, db) = temp_db();
        assert_eq!(db.get_rule_text(RuleType::CustomPromptEn).unwrap(), "");
        db.set_rule_text(RuleType::CustomPromptEn, "be terse").unwrap();
        db.set_rule_text(RuleType::CustomPromptEn, "be formal").unwrap();
        assert_eq!(db.get_rule_text(RuleType::CustomPromptEn).unwrap(), "be formal");
    }

    #[test]
    fn test_update_batch_is_atomic() {
        let (dir, db) = temp_db();
        let ids = db.set_items(&[Item::new("a")]).unwrap();

        // Reject every meta write so the last step of the batch fails.
        let conn = Connection::open(dir.path().join("test.lg")).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_meta BEFORE INSERT ON meta
             BEGIN SELECT RAISE(ABORT, 'meta is read-only'); END;",
        )
        .unwrap();

        let mut item = Item::new("changed");
        item.id = Some(ids[0]);
        let batch = BatchUpdate::new()
            .with_items(vec![item])
            .with_rules(RuleType::Glossary, vec![RuleEntry::new("HP", "HP")])
            .with_meta("k", json!("v"));

        assert!(matches!(db.update_batch(&batch), Err(Error::Storage { .. })));
        assert_eq!(db.get_all_items().unwrap()[0].src, "a");
        assert!(db.get_rules(RuleType::Glossary).unwrap().is_empty());
    }

    #[test]
    fn test_long_lived_connection() {
        let (_dir, db) = temp_db();
        assert!(!db.is_open());
        db.open().unwrap();
        db.open().unwrap();
        assert!(db.is_open());

        db.set_meta("k", &json!(1)).unwrap();
        db.close();
        db.close();
        assert!(!db.is_open());
        assert_eq!(db.get_meta("k").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_summary_progress() {
        let (_dir, db) = temp_db();
        db.set_items(&[Item::new("a"), Item::new("b")]).unwrap();
        db.add_asset("a.txt", b"x", 1).unwrap();

        let summary = db.get_project_summary().unwrap();
        assert_eq!(summary.name, "test");
        assert_eq!(summary.file_count, 1);
        assert_eq!(summary.total_items, 2);
        assert_eq!(summary.translated_items, 0);

        db.set_meta(KEY_TRANSLATION_EXTRAS, &json!({"line": 6, "total_line": 4}))
            .unwrap();
        let summary = db.get_project_summary().unwrap();
        assert_eq!(summary.total_items, 4);
        assert!((summary.progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_items_with_speaker_lists_load() {
        let (dir, db) = temp_db();
        db.set_items(&[Item::new("plain")]).unwrap();
        Connection::open(dir.path().join("test.lg"))
            .unwrap()
            .execute(
                "INSERT INTO items (data) VALUES (?1)",
                params![r#"{"src":"duet","name_src":["Alice","Bob"],"name_dst":["爱丽丝","鲍勃"]}"#],
            )
            .unwrap();

        let items = db.get_all_items().unwrap();
        assert_eq!(items.len(), 2);
        let names = items[1].name_dst.as_ref().unwrap();
        assert_eq!(names.as_slice(), ["爱丽丝", "鲍勃"]);
    }
}
