//! End-to-end tests for the three sync passes.
//!
//! Each test runs a pass against a scratch SQLite database and a scripted
//! feed that answers from an in-memory table, so no network is involved.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

use guildbank_item_seeder::catalog::{CatalogItem, ClassUpdate, Locale, LocaleNameUpdate};
use guildbank_item_seeder::config::{ImportConfig, UpdateConfig};
use guildbank_item_seeder::source::{FetchError, ItemSource};
use guildbank_item_seeder::store::{
    CatalogStore, InsertSummary, SqliteCatalog, SqliteStore, StoreFactory,
};
use guildbank_item_seeder::sync::{run_backfill, run_import, run_update};
use guildbank_item_seeder::ui::{Phase, SilentUi, Ui};

// =============================================================================
// Scripted feed
// =============================================================================

const NOT_FOUND: &str = "<wowhead><error>Item not found!</error></wowhead>";

enum Reply {
    Body(String),
    Status(u16),
}

/// Answers from a table; anything unscripted is "Item not found!"
#[derive(Default)]
struct ScriptedFeed {
    replies: HashMap<(i64, Option<Locale>), Reply>,
    calls: Mutex<Vec<(i64, Option<Locale>)>>,
}

impl ScriptedFeed {
    fn item(mut self, id: i64, name: &str, class: i64, subclass: i64) -> Self {
        self.replies.insert((id, None), Reply::Body(item_xml(id, name, class, subclass)));
        self
    }

    fn localized(mut self, id: i64, locale: Locale, name: &str) -> Self {
        self.replies
            .insert((id, Some(locale)), Reply::Body(item_xml(id, name, 0, 0)));
        self
    }

    fn raw(mut self, id: i64, locale: Option<Locale>, body: &str) -> Self {
        self.replies.insert((id, locale), Reply::Body(body.to_string()));
        self
    }

    fn status(mut self, id: i64, status: u16) -> Self {
        self.replies.insert((id, None), Reply::Status(status));
        self
    }

    fn fetched_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.calls.lock().unwrap().iter().map(|(id, _)| *id).collect();
        ids.sort();
        ids
    }

    fn calls(&self) -> Vec<(i64, Option<Locale>)> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

impl ItemSource for ScriptedFeed {
    fn fetch(&self, id: i64, locale: Option<Locale>) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push((id, locale));
        match self.replies.get(&(id, locale)) {
            Some(Reply::Body(body)) => Ok(body.clone().into_bytes()),
            Some(Reply::Status(status)) => Err(FetchError::Http {
                url: format!("item={}", id),
                status: *status,
            }),
            None => Ok(NOT_FOUND.as_bytes().to_vec()),
        }
    }
}

fn item_xml(id: i64, name: &str, class: i64, subclass: i64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<wowhead><item id="{id}"><name><![CDATA[{name}]]></name><level>1</level><quality id="1">Common</quality><class id="{class}"><![CDATA[Class]]></class><subclass id="{subclass}"><![CDATA[Subclass]]></subclass><icon displayId="1">inv_misc_{id}</icon></item></wowhead>"#
    )
}

// =============================================================================
// Scratch database
// =============================================================================

struct Scratch {
    _dir: TempDir,
    path: PathBuf,
}

impl Scratch {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("catalog.db");
        Self { _dir: dir, path }
    }

    fn catalog(&self) -> SqliteCatalog {
        SqliteCatalog::new(&self.path)
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::open(&self.path).expect("Failed to open store")
    }

    fn all(&self) -> Vec<CatalogItem> {
        self.store().page_from(i64::MIN, 10_000).unwrap()
    }

    fn ids(&self) -> Vec<i64> {
        self.all().iter().map(|i| i.id).collect()
    }
}

fn stored(id: i64, name: &str) -> CatalogItem {
    CatalogItem {
        quality: Some("Common".to_string()),
        icon: Some(format!("inv_misc_{}", id)),
        item_class: Some(15),
        item_subclass: Some(0),
        ..CatalogItem::degraded(id, name)
    }
}

fn import_config(first_id: i64, last_id: i64, workers: usize) -> ImportConfig {
    ImportConfig {
        first_id,
        last_id,
        special_ids: Vec::new(),
        workers,
        commit_every: 1000,
        ..ImportConfig::default()
    }
}

// =============================================================================
// Full import
// =============================================================================

#[test]
fn test_import_sparse_range() {
    let db = Scratch::new();
    let feed = ScriptedFeed::default()
        .item(5, "Worn Dagger", 2, 15)
        .item(7, "Tough Jerky", 0, 0);

    let report = run_import(&db.catalog(), &feed, &import_config(1, 7, 5), &mut SilentUi::new()).unwrap();

    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped.total(), 5);
    assert_eq!(report.skipped.absent, 5);
    assert_eq!(report.skipped.malformed, 0);
    assert_eq!(report.processed, 7);
    assert!(report.is_success());
    assert_eq!(db.ids(), vec![5, 7]);

    let dagger = db.store().get(5).unwrap().unwrap();
    assert_eq!(dagger.name, "Worn Dagger");
    assert_eq!(dagger.quality.as_deref(), Some("Common"));
    assert_eq!(dagger.icon.as_deref(), Some("inv_misc_5"));
    assert_eq!(dagger.item_class, Some(2));
    assert_eq!(dagger.item_subclass, Some(15));
}

#[test]
fn test_import_twice_is_idempotent() {
    let db = Scratch::new();
    let feed = ScriptedFeed::default()
        .item(2, "Linen Cloth", 7, 0)
        .item(3, "Wool Cloth", 7, 0)
        .item(184937, "Chronoboon Displacer", 0, 8);
    let config = ImportConfig {
        special_ids: vec![184937],
        ..import_config(1, 4, 3)
    };

    let first = run_import(&db.catalog(), &feed, &config, &mut SilentUi::new()).unwrap();
    let after_first = db.all();

    let second = run_import(&db.catalog(), &feed, &config, &mut SilentUi::new()).unwrap();

    assert_eq!(first.imported, 3);
    assert_eq!(second.imported, 0);
    assert_eq!(second.resume_cursor, Some(3));
    // Only the out-of-range special id is looked at again, and it's already there
    assert_eq!(second.processed, 2);
    assert_eq!(second.skipped.existing, 1);
    assert_eq!(db.all(), after_first);
}

#[test]
fn test_import_resumes_after_stored_ids() {
    let db = Scratch::new();
    db.store()
        .insert_batch(&[stored(1, "one"), stored(2, "two"), stored(3, "three")])
        .unwrap();

    let feed = ScriptedFeed::default()
        .item(1, "changed", 1, 1)
        .item(4, "four", 1, 1)
        .item(5, "five", 1, 1)
        .item(6, "six", 1, 1);

    let report = run_import(&db.catalog(), &feed, &import_config(1, 6, 2), &mut SilentUi::new()).unwrap();

    assert_eq!(report.resume_cursor, Some(3));
    assert_eq!(report.imported, 3);
    assert_eq!(feed.fetched_ids(), vec![4, 5, 6]);
    assert_eq!(db.store().get(1).unwrap().unwrap(), stored(1, "one"));
    assert_eq!(db.ids(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_import_malformed_payloads() {
    let db = Scratch::new();
    let feed = ScriptedFeed::default()
        .raw(1, None, r#"<wowhead><item id="?"><name><![CDATA[Hearthstone]]></name></item></wowhead>"#)
        .raw(2, None, r#"<wowhead><item id="?"><name>no markers</name></item></wowhead>"#)
        .status(3, 503);

    let report = run_import(&db.catalog(), &feed, &import_config(1, 4, 2), &mut SilentUi::new()).unwrap();

    assert_eq!(report.imported, 1);
    assert_eq!(report.skipped.malformed, 1);
    assert_eq!(report.skipped.fetch_failed, 1);
    assert_eq!(report.skipped.absent, 1);
    assert!(report.is_success());

    assert_eq!(db.store().get(1).unwrap().unwrap(), CatalogItem::degraded(1, "Hearthstone"));
}

#[test]
fn test_import_skips_mismatched_payload() {
    let db = Scratch::new();
    let feed = ScriptedFeed::default().raw(9, None, &item_xml(19019, "Thunderfury", 2, 7));

    let report = run_import(&db.catalog(), &feed, &import_config(9, 9, 1), &mut SilentUi::new()).unwrap();

    assert_eq!(report.imported, 0);
    assert_eq!(report.skipped.mismatched, 1);
    assert!(db.ids().is_empty());
}

#[test]
fn test_duplicate_special_id_is_benign_conflict() {
    let db = Scratch::new();
    let feed = ScriptedFeed::default().item(184938, "Supercharged Chronoboon Displacer", 0, 8);
    let config = ImportConfig {
        special_ids: vec![184938, 184938],
        ..import_config(1, 0, 2)
    };

    let report = run_import(&db.catalog(), &feed, &config, &mut SilentUi::new()).unwrap();

    assert_eq!(report.imported, 1);
    assert_eq!(report.skipped.conflicts, 1);
    assert!(report.is_success());
    assert_eq!(db.ids(), vec![184938]);
}

#[test]
fn test_commits_during_scan() {
    let db = Scratch::new();
    let mut feed = ScriptedFeed::default();
    for id in 1..=10 {
        feed = feed.item(id, &format!("item {}", id), 0, 0);
    }
    let config = ImportConfig {
        commit_every: 2,
        ..import_config(1, 10, 2)
    };

    let report = run_import(&db.catalog(), &feed, &config, &mut SilentUi::new()).unwrap();

    assert_eq!(report.imported, 10);
    assert_eq!(db.ids(), (1..=10).collect::<Vec<_>>());
}

// =============================================================================
// Worker failure isolation
// =============================================================================

/// Sessions whose batch commits fail for the chosen session numbers
struct FlakyCatalog {
    inner: SqliteCatalog,
    opened: AtomicUsize,
    failing_sessions: Vec<usize>,
}

struct FlakyStore {
    inner: SqliteStore,
    fail_inserts: bool,
}

impl StoreFactory for FlakyCatalog {
    type Store = FlakyStore;

    fn open(&self) -> Result<FlakyStore> {
        let session = self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FlakyStore {
            inner: self.inner.open()?,
            fail_inserts: self.failing_sessions.contains(&session),
        })
    }
}

impl CatalogStore for FlakyStore {
    fn max_id_below(&self, ceiling: i64) -> Result<Option<i64>> {
        self.inner.max_id_below(ceiling)
    }

    fn contains(&self, id: i64) -> Result<bool> {
        self.inner.contains(id)
    }

    fn get(&self, id: i64) -> Result<Option<CatalogItem>> {
        self.inner.get(id)
    }

    fn count(&self) -> Result<u64> {
        self.inner.count()
    }

    fn page_from(&self, start_id: i64, limit: usize) -> Result<Vec<CatalogItem>> {
        self.inner.page_from(start_id, limit)
    }

    fn min_id_missing_locale(&self, locale: Locale) -> Result<Option<i64>> {
        self.inner.min_id_missing_locale(locale)
    }

    fn insert_batch(&mut self, items: &[CatalogItem]) -> Result<InsertSummary> {
        if self.fail_inserts {
            bail!("disk I/O error");
        }
        self.inner.insert_batch(items)
    }

    fn update_classes(&mut self, updates: &[ClassUpdate]) -> Result<usize> {
        self.inner.update_classes(updates)
    }

    fn set_locale_names(&mut self, updates: &[LocaleNameUpdate]) -> Result<usize> {
        self.inner.set_locale_names(updates)
    }
}

#[test]
fn test_failed_worker_does_not_stop_others() {
    let db = Scratch::new();
    let mut feed = ScriptedFeed::default();
    for id in 1..=6 {
        feed = feed.item(id, &format!("item {}", id), 0, 0);
    }
    // Session 0 reads the resume cursor; session 1 belongs to worker 0
    let catalog = FlakyCatalog {
        inner: db.catalog(),
        opened: AtomicUsize::new(0),
        failing_sessions: vec![1],
    };
    let config = ImportConfig {
        commit_every: 2,
        ..import_config(1, 6, 2)
    };

    let report = run_import(&catalog, &feed, &config, &mut SilentUi::new()).unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed_workers.len(), 1);
    assert_eq!(report.failed_workers[0].worker, 0);
    assert!(report.failed_workers[0].error.contains("disk I/O error"));
    // Worker 0 staged 1 and 3 before its first commit failed; worker 1 retried them
    assert_eq!(report.lost, 2);
    assert_eq!(report.requeued, 2);
    assert!(report.unrecovered_ids.is_empty());
    assert_eq!(report.unscanned, 0);
    assert_eq!(report.imported, 6);
    assert_eq!(report.processed, 8);
    assert_eq!(db.ids(), (1..=6).collect::<Vec<_>>());

    // Nothing is left behind the cursor for a clean rerun to find
    let rerun = run_import(&db.catalog(), &feed, &config, &mut SilentUi::new()).unwrap();
    assert_eq!(rerun.resume_cursor, Some(6));
    assert_eq!(rerun.imported, 0);
    assert_eq!(db.ids(), (1..=6).collect::<Vec<_>>());
}

#[test]
fn test_all_workers_failing_leaves_ids_for_rerun() {
    let db = Scratch::new();
    let mut feed = ScriptedFeed::default();
    for id in 1..=4 {
        feed = feed.item(id, &format!("item {}", id), 0, 0);
    }
    let catalog = FlakyCatalog {
        inner: db.catalog(),
        opened: AtomicUsize::new(0),
        failing_sessions: vec![1, 2],
    };
    let config = ImportConfig {
        commit_every: 1,
        ..import_config(1, 4, 2)
    };

    let report = run_import(&catalog, &feed, &config, &mut SilentUi::new()).unwrap();

    assert_eq!(report.failed_workers.len(), 2);
    assert_eq!(report.imported, 0);
    assert_eq!(report.processed, 2);
    assert_eq!(report.unrecovered_ids, vec![1, 2]);
    assert_eq!(report.unscanned, 4);
    assert!(db.ids().is_empty());

    let rerun = run_import(&db.catalog(), &feed, &config, &mut SilentUi::new()).unwrap();
    assert!(rerun.is_success());
    assert_eq!(rerun.resume_cursor, None);
    assert_eq!(rerun.imported, 4);
    assert_eq!(db.ids(), vec![1, 2, 3, 4]);
}

// =============================================================================
// Stopping between strides
// =============================================================================

/// Asks to stop once `strides` strides have run
struct StopAfter {
    strides: usize,
    polls: usize,
    phases: Vec<Phase>,
}

impl Ui for StopAfter {
    fn set_phase(&mut self, phase: Phase) {
        self.phases.push(phase);
    }
    fn set_info(&mut self, _info: impl Into<String>) {}
    fn set_progress(&mut self, _current: u64, _total: u64, _label: impl Into<String>) {}
    fn set_counters(&mut self, _counters: &[(&str, u64)]) {}
    fn log(&mut self, _message: impl Into<String>) {}

    fn stop_requested(&mut self) -> bool {
        self.polls += 1;
        self.polls > self.strides
    }
}

#[test]
fn test_stop_flushes_finished_strides() {
    let db = Scratch::new();
    let mut feed = ScriptedFeed::default();
    for id in 1..=9 {
        feed = feed.item(id, &format!("item {}", id), 0, 0);
    }
    let mut ui = StopAfter { strides: 2, polls: 0, phases: Vec::new() };

    let report = run_import(&db.catalog(), &feed, &import_config(1, 9, 3), &mut ui).unwrap();

    assert!(report.interrupted);
    assert_eq!(report.imported, 6);
    assert_eq!(db.ids(), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(
        ui.phases,
        vec![Phase::Scanning, Phase::Importing, Phase::Flushing, Phase::Done]
    );

    // A rerun picks up exactly where the stop left off
    let rerun = run_import(&db.catalog(), &feed, &import_config(1, 9, 3), &mut SilentUi::new()).unwrap();
    assert_eq!(rerun.resume_cursor, Some(6));
    assert_eq!(rerun.imported, 3);
}

// =============================================================================
// Value update
// =============================================================================

#[test]
fn test_update_changes_only_classification() {
    let db = Scratch::new();
    let mut original = stored(10, "Broadsword");
    original.locale_names.insert(Locale::De, "Breitschwert".to_string());
    db.store().insert_batch(&[original.clone(), stored(11, "Buckler")]).unwrap();

    let feed = ScriptedFeed::default()
        .item(10, "Renamed Upstream", 2, 8)
        .item(11, "Buckler", 15, 0);
    let config = UpdateConfig { page_size: 1, workers: 2 };

    let report = run_update(&mut db.store(), &feed, &config, &mut SilentUi::new()).unwrap();

    assert_eq!(report.checked, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.pages, 2);

    let updated = db.store().get(10).unwrap().unwrap();
    assert_eq!(updated.item_class, Some(2));
    assert_eq!(updated.item_subclass, Some(8));
    assert_eq!(
        CatalogItem { item_class: Some(15), item_subclass: Some(0), ..updated },
        original
    );
}

#[test]
fn test_update_leaves_unreadable_items_alone() {
    let db = Scratch::new();
    db.store()
        .insert_batch(&[stored(1, "gone"), stored(2, "garbled"), stored(3, "offline")])
        .unwrap();
    let before = db.all();

    let feed = ScriptedFeed::default()
        .raw(2, None, r#"<wowhead><item id="2"><name><![CDATA[garbled]]></name><class id="x"/></item></wowhead>"#)
        .status(3, 500);

    let report = run_update(&mut db.store(), &feed, &UpdateConfig::default(), &mut SilentUi::new()).unwrap();

    assert_eq!(report.updated, 0);
    assert_eq!(report.skipped.absent, 1);
    assert_eq!(report.skipped.malformed, 1);
    assert_eq!(report.skipped.fetch_failed, 1);
    assert_eq!(db.all(), before);
}

#[test]
fn test_update_keeps_classification_the_payload_omits() {
    let db = Scratch::new();
    db.store().insert_batch(&[stored(4, "Simple Wood")]).unwrap();
    let before = db.all();

    let feed = ScriptedFeed::default().raw(
        4,
        None,
        r#"<wowhead><item id="4"><name><![CDATA[Simple Wood]]></name><quality id="1">Common</quality></item></wowhead>"#,
    );

    let report = run_update(&mut db.store(), &feed, &UpdateConfig::default(), &mut SilentUi::new()).unwrap();

    assert_eq!(report.checked, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(report.unchanged, 1);
    assert_eq!(db.all(), before);
}

// =============================================================================
// Locale backfill
// =============================================================================

#[test]
fn test_backfill_single_locale() {
    let db = Scratch::new();
    db.store().insert_batch(&[stored(10, "Light Leather")]).unwrap();

    let feed = ScriptedFeed::default().localized(10, Locale::Ko, "경가죽");

    let report = run_backfill(
        &mut db.store(),
        &feed,
        &[Locale::Ko],
        Locale::Ko,
        1000,
        5,
        &mut SilentUi::new(),
    )
    .unwrap();

    assert_eq!(report.frontier, Some(10));
    assert_eq!(report.names_set, 1);

    let item = db.store().get(10).unwrap().unwrap();
    assert_eq!(item.locale_name(Locale::Ko), Some("경가죽"));
    assert_eq!(item.locale_name(Locale::Pt), None);
    assert_eq!(CatalogItem { locale_names: Default::default(), ..item }, stored(10, "Light Leather"));
}

#[test]
fn test_backfill_starts_at_frontier() {
    let db = Scratch::new();
    let mut done = stored(1, "Copper Bar");
    done.locale_names.insert(Locale::Pt, "Barra de Cobre".to_string());
    db.store()
        .insert_batch(&[done, stored(2, "Tin Bar"), stored(3, "Bronze Bar")])
        .unwrap();

    let feed = ScriptedFeed::default()
        .localized(2, Locale::Ko, "주석 주괴")
        .localized(2, Locale::Pt, "Barra de Estanho")
        .raw(3, Some(Locale::Ko), r#"<wowhead><item id="3x"><name><![CDATA[청동 주괴]]></name></item></wowhead>"#)
        .raw(3, Some(Locale::Pt), "<html>503 Service Unavailable</html>");

    let report = run_backfill(
        &mut db.store(),
        &feed,
        &[Locale::Ko, Locale::Pt],
        Locale::Pt,
        1,
        3,
        &mut SilentUi::new(),
    )
    .unwrap();

    assert_eq!(report.frontier, Some(2));
    assert_eq!(report.items, 2);
    assert_eq!(report.names_set, 3);
    assert_eq!(report.recovered, 1);
    assert_eq!(report.pages, 2);
    // The error page is a failed answer, not a gap in the catalog
    assert_eq!(report.skipped.malformed, 1);
    assert_eq!(report.skipped.absent, 0);
    assert_eq!(
        feed.calls(),
        vec![
            (2, Some(Locale::Ko)),
            (2, Some(Locale::Pt)),
            (3, Some(Locale::Ko)),
            (3, Some(Locale::Pt)),
        ]
    );

    let tin = db.store().get(2).unwrap().unwrap();
    assert_eq!(tin.locale_name(Locale::Ko), Some("주석 주괴"));
    assert_eq!(tin.locale_name(Locale::Pt), Some("Barra de Estanho"));

    let bronze = db.store().get(3).unwrap().unwrap();
    assert_eq!(bronze.locale_name(Locale::Ko), Some("청동 주괴"));
    assert_eq!(bronze.locale_name(Locale::Pt), None);
    assert_eq!(bronze.name, "Bronze Bar");
}

#[test]
fn test_backfill_nothing_to_do() {
    let db = Scratch::new();
    let mut done = stored(1, "Copper Bar");
    done.locale_names.insert(Locale::Pt, "Barra de Cobre".to_string());
    db.store().insert_batch(&[done]).unwrap();

    let feed = ScriptedFeed::default();
    let report = run_backfill(
        &mut db.store(),
        &feed,
        &[Locale::Pt],
        Locale::Pt,
        1000,
        5,
        &mut SilentUi::new(),
    )
    .unwrap();

    assert_eq!(report.frontier, None);
    assert_eq!(report.items, 0);
    assert!(feed.calls().is_empty());
}
