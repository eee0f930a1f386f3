use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::schema::{generate_create_table, generate_insert, generate_select, CORE_COLUMNS, ITEM_TABLE};
use super::{CatalogStore, InsertSummary, StoreFactory};
use crate::catalog::{CatalogItem, ClassUpdate, Locale, LocaleNameUpdate, LOCALES};

/// How long a session waits on another worker's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens sessions on one SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
}

impl SqliteCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StoreFactory for SqliteCatalog {
    type Store = SqliteStore;

    fn open(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.path)
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database and make sure the item table exists
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;

        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL lets readers run while another worker commits
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;",
        )?;

        conn.execute(&generate_create_table(), [])
            .context("Failed to create item table")?;

        Ok(Self { conn })
    }
}

impl CatalogStore for SqliteStore {
    fn max_id_below(&self, ceiling: i64) -> Result<Option<i64>> {
        let sql = format!("SELECT MAX(id) FROM {} WHERE id < ?1", ITEM_TABLE);
        let max = self
            .conn
            .query_row(&sql, params![ceiling], |row| row.get::<_, Option<i64>>(0))
            .context("Failed to query resume cursor")?;
        Ok(max)
    }

    fn contains(&self, id: i64) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1", ITEM_TABLE);
        let found = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![id], |_| Ok(()))
            .optional()
            .with_context(|| format!("Failed to look up item {}", id))?;
        Ok(found.is_some())
    }

    fn get(&self, id: i64) -> Result<Option<CatalogItem>> {
        let sql = format!("{} WHERE id = ?1", generate_select());
        let item = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![id], read_item)
            .optional()
            .with_context(|| format!("Failed to load item {}", id))?;
        Ok(item)
    }

    fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", ITEM_TABLE);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn page_from(&self, start_id: i64, limit: usize) -> Result<Vec<CatalogItem>> {
        let sql = format!("{} WHERE id >= ?1 ORDER BY id LIMIT ?2", generate_select());
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let items = stmt
            .query_map(params![start_id, limit as i64], read_item)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to load page starting at {}", start_id))?;
        Ok(items)
    }

    fn min_id_missing_locale(&self, locale: Locale) -> Result<Option<i64>> {
        let column = locale.column();
        let sql = format!(
            "SELECT MIN(id) FROM {} WHERE {} IS NULL OR {} = ''",
            ITEM_TABLE, column, column
        );
        let min = self
            .conn
            .query_row(&sql, [], |row| row.get::<_, Option<i64>>(0))
            .with_context(|| format!("Failed to find backfill frontier for {}", locale))?;
        Ok(min)
    }

    fn insert_batch(&mut self, items: &[CatalogItem]) -> Result<InsertSummary> {
        let insert_sql = generate_insert();
        let tx = self.conn.transaction()?;
        let mut summary = InsertSummary::default();

        {
            let mut stmt = tx.prepare_cached(&insert_sql)?;
            for item in items {
                let changed = stmt
                    .execute(params_from_iter(row_values(item)))
                    .with_context(|| format!("Failed to insert item {}", item.id))?;
                if changed == 0 {
                    summary.conflicts += 1;
                } else {
                    summary.inserted += 1;
                }
            }
        }

        tx.commit().context("Failed to commit insert batch")?;
        Ok(summary)
    }

    fn update_classes(&mut self, updates: &[ClassUpdate]) -> Result<usize> {
        let sql = format!("UPDATE {} SET class = ?1, subclass = ?2 WHERE id = ?3", ITEM_TABLE);
        let tx = self.conn.transaction()?;
        let mut touched = 0;

        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for update in updates {
                touched += stmt
                    .execute(params![update.item_class, update.item_subclass, update.id])
                    .with_context(|| format!("Failed to update item {}", update.id))?;
            }
        }

        tx.commit().context("Failed to commit class updates")?;
        Ok(touched)
    }

    fn set_locale_names(&mut self, updates: &[LocaleNameUpdate]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut touched = 0;

        for update in updates {
            let sql = format!("UPDATE {} SET {} = ?1 WHERE id = ?2", ITEM_TABLE, update.locale.column());
            touched += tx
                .prepare_cached(&sql)?
                .execute(params![update.name, update.id])
                .with_context(|| format!("Failed to set {} name for item {}", update.locale, update.id))?;
        }

        tx.commit().context("Failed to commit locale names")?;
        Ok(touched)
    }
}

/// Values in `column_names()` order
fn row_values(item: &CatalogItem) -> Vec<Value> {
    let mut values = vec![
        Value::Integer(item.id),
        Value::Text(item.name.clone()),
        item.quality.clone().map(Value::Text).unwrap_or(Value::Null),
        item.icon.clone().map(Value::Text).unwrap_or(Value::Null),
        item.item_class.map(Value::Integer).unwrap_or(Value::Null),
        item.item_subclass.map(Value::Integer).unwrap_or(Value::Null),
    ];

    for spec in LOCALES {
        values.push(
            item.locale_names
                .get(&spec.locale)
                .cloned()
                .map(Value::Text)
                .unwrap_or(Value::Null),
        );
    }

    values
}

fn read_item(row: &Row) -> rusqlite::Result<CatalogItem> {
    let mut locale_names = BTreeMap::new();
    for (offset, spec) in LOCALES.iter().enumerate() {
        let name: Option<String> = row.get(CORE_COLUMNS.len() + offset)?;
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            locale_names.insert(spec.locale, name);
        }
    }

    Ok(CatalogItem {
        id: row.get(0)?,
        name: row.get(1)?,
        quality: row.get(2)?,
        icon: row.get(3)?,
        item_class: row.get(4)?,
        item_subclass: row.get(5)?,
        locale_names,
    })
}
