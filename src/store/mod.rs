//! Catalog store contract and its SQLite implementation

pub mod schema;
pub mod sqlite;

pub use sqlite::*;

use anyhow::Result;

use crate::catalog::{CatalogItem, ClassUpdate, Locale, LocaleNameUpdate};

/// Outcome of committing a batch of inserts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    /// Rows the store refused because the id already existed
    pub conflicts: usize,
}

/// One session against the item table
///
/// Every write method commits its whole batch atomically or not at all.
pub trait CatalogStore {
    /// Highest id strictly below `ceiling`
    fn max_id_below(&self, ceiling: i64) -> Result<Option<i64>>;

    fn contains(&self, id: i64) -> Result<bool>;

    fn get(&self, id: i64) -> Result<Option<CatalogItem>>;

    fn count(&self) -> Result<u64>;

    /// Up to `limit` records with `id >= start_id`, ascending
    fn page_from(&self, start_id: i64, limit: usize) -> Result<Vec<CatalogItem>>;

    /// Lowest id whose name for `locale` is missing or empty
    fn min_id_missing_locale(&self, locale: Locale) -> Result<Option<i64>>;

    /// Insert new records; existing ids are left alone and counted as conflicts
    fn insert_batch(&mut self, items: &[CatalogItem]) -> Result<InsertSummary>;

    /// Overwrite class/subclass only; returns rows touched
    fn update_classes(&mut self, updates: &[ClassUpdate]) -> Result<usize>;

    /// Set individual locale names; returns rows touched
    fn set_locale_names(&mut self, updates: &[LocaleNameUpdate]) -> Result<usize>;
}

/// Opens independent sessions, one per worker
pub trait StoreFactory: Sync {
    type Store: CatalogStore + Send;

    fn open(&self) -> Result<Self::Store>;
}
