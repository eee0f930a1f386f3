pub mod locale;

pub use locale::*;

use std::collections::BTreeMap;

/// A row of the bank's `item` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
    pub quality: Option<String>,
    pub icon: Option<String>,
    pub item_class: Option<i64>,
    pub item_subclass: Option<i64>,
    pub locale_names: BTreeMap<Locale, String>,
}

impl CatalogItem {
    /// Name-only record recovered from a payload that failed to decode
    pub fn degraded(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            quality: None,
            icon: None,
            item_class: None,
            item_subclass: None,
            locale_names: BTreeMap::new(),
        }
    }

    pub fn locale_name(&self, locale: Locale) -> Option<&str> {
        self.locale_names.get(&locale).map(|s| s.as_str())
    }
}

/// Classification refresh for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassUpdate {
    pub id: i64,
    pub item_class: Option<i64>,
    pub item_subclass: Option<i64>,
}

/// Translated name for one (record, locale) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleNameUpdate {
    pub id: i64,
    pub locale: Locale,
    pub name: String,
}
