//! Resumable full import
//!
//! The resume cursor is the highest stored id below the primary ceiling, so
//! a rerun picks up where the last committed batch ended. The remaining ids
//! (then the special ids) are walked in strides of one id per live worker;
//! each worker owns its own store session and commits its own batches.
//!
//! A worker whose session fails is retired, and the ids of the batch it
//! dropped go back to the front of the queue for the surviving workers. The
//! cursor only ever moves past ids that some session committed or skipped,
//! except for `ImportReport::unrecovered_ids` when no worker is left to
//! retry them.

use anyhow::Result;
use std::collections::{BTreeSet, VecDeque};
use std::thread;
use tracing::{debug, error, info, warn};

use super::pool::fetch_and_parse;
use super::{SkipCounts, SkipReason};
use crate::catalog::CatalogItem;
use crate::config::ImportConfig;
use crate::parser::ParseOutcome;
use crate::source::ItemSource;
use crate::store::{CatalogStore, StoreFactory};
use crate::ui::{Phase, Ui};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Highest stored id below the primary ceiling when the run started
    pub resume_cursor: Option<i64>,
    /// Fetch attempts this run, retries included
    pub processed: u64,
    pub imported: u64,
    pub skipped: SkipCounts,
    /// Staged records dropped with a failed worker's batch
    pub lost: u64,
    /// Ids handed back to the queue after their worker failed
    pub requeued: u64,
    /// Dropped ids nobody retried; a rerun's cursor may already be past them
    pub unrecovered_ids: Vec<i64>,
    /// Queued ids never fetched because the scan stopped early
    pub unscanned: u64,
    pub failed_workers: Vec<WorkerFailure>,
    /// Stopped between strides at the user's request
    pub interrupted: bool,
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        self.failed_workers.is_empty()
    }
}

/// Ids to scan: the contiguous range from `start`, then the special ids
///
/// Special ids inside the primary range that sit below `start` are already
/// covered by the resume cursor and are left out.
pub fn plan_scan(start: i64, last_id: i64, special_ids: &[i64], primary_ceiling: i64) -> Vec<i64> {
    let mut ids: Vec<i64> = (start..=last_id).collect();
    ids.extend(
        special_ids
            .iter()
            .copied()
            .filter(|&id| id >= start || id >= primary_ceiling),
    );
    ids
}

/// A worker's private state: one store session plus its staged batch
struct ImportWorker<S> {
    index: usize,
    store: S,
    staged: Vec<CatalogItem>,
    since_flush: usize,
    processed: u64,
    imported: u64,
    skipped: SkipCounts,
    lost: u64,
    /// Ids whose records went down with a failed batch, waiting to be requeued
    dropped: Vec<i64>,
    failure: Option<String>,
}

impl<S: CatalogStore> ImportWorker<S> {
    fn new(index: usize, store: S) -> Self {
        Self {
            index,
            store,
            staged: Vec::new(),
            since_flush: 0,
            processed: 0,
            imported: 0,
            skipped: SkipCounts::default(),
            lost: 0,
            dropped: Vec::new(),
            failure: None,
        }
    }

    fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    fn process<I: ItemSource + ?Sized>(&mut self, source: &I, id: i64, commit_every: usize) {
        if self.is_failed() {
            return;
        }

        self.processed += 1;
        self.since_flush += 1;

        if let Err(err) = self.stage(source, id) {
            self.dropped.push(id);
            self.fail(err);
            return;
        }

        if self.since_flush >= commit_every {
            self.flush();
        }
    }

    /// Fetch, parse and stage one id; only store errors come back as `Err`
    fn stage<I: ItemSource + ?Sized>(&mut self, source: &I, id: i64) -> Result<()> {
        let candidate = match fetch_and_parse(source, id, None) {
            Err(err) => {
                warn!(worker = self.index, id, error = %err, "fetch failed, skipping");
                self.skipped.record(SkipReason::FetchFailed);
                return Ok(());
            }
            Ok(ParseOutcome::Absent) => {
                debug!(worker = self.index, id, "no such item");
                self.skipped.record(SkipReason::Absent);
                return Ok(());
            }
            Ok(ParseOutcome::Malformed { name: None, reason }) => {
                warn!(worker = self.index, id, %reason, "malformed payload, no name recovered");
                self.skipped.record(SkipReason::Malformed);
                return Ok(());
            }
            Ok(ParseOutcome::Malformed { name: Some(name), reason }) => {
                warn!(worker = self.index, id, %reason, "malformed payload, keeping recovered name");
                CatalogItem::degraded(id, name)
            }
            Ok(ParseOutcome::Item(parsed)) if parsed.id != id => {
                warn!(worker = self.index, id, echoed = parsed.id, "payload is for another id");
                self.skipped.record(SkipReason::Mismatched);
                return Ok(());
            }
            Ok(ParseOutcome::Item(parsed)) => parsed.into_catalog_item(),
        };

        if self.store.contains(id)? {
            debug!(worker = self.index, id, "already stored");
            self.skipped.record(SkipReason::Existing);
            return Ok(());
        }

        debug!(worker = self.index, id, name = %candidate.name, "staged");
        self.staged.push(candidate);
        Ok(())
    }

    fn flush(&mut self) {
        self.since_flush = 0;
        if self.is_failed() || self.staged.is_empty() {
            return;
        }

        match self.store.insert_batch(&self.staged) {
            Ok(summary) => {
                info!(
                    worker = self.index,
                    inserted = summary.inserted,
                    conflicts = summary.conflicts,
                    "committed batch"
                );
                self.imported += summary.inserted as u64;
                self.skipped.add(SkipReason::Conflict, summary.conflicts as u64);
                self.staged.clear();
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: anyhow::Error) {
        error!(worker = self.index, staged = self.staged.len(), error = %format!("{:#}", err), "worker stopped");
        self.lost += self.staged.len() as u64;
        self.dropped.extend(self.staged.drain(..).map(|item| item.id));
        self.failure = Some(format!("{:#}", err));
    }
}

/// Run the full import
///
/// Only setup errors (opening sessions, reading the resume cursor) are
/// returned as `Err`; per-id and per-worker failures land in the report.
pub fn run_import<F, I>(
    factory: &F,
    source: &I,
    config: &ImportConfig,
    ui: &mut impl Ui,
) -> Result<ImportReport>
where
    F: StoreFactory,
    I: ItemSource + ?Sized,
{
    let mut report = ImportReport::default();
    let workers_count = config.workers.max(1);

    ui.set_phase(Phase::Scanning);
    report.resume_cursor = factory.open()?.max_id_below(config.primary_ceiling)?;

    let start = match report.resume_cursor {
        Some(cursor) => (cursor + 1).max(config.first_id),
        None => config.first_id,
    };
    let ids = plan_scan(start, config.last_id, &config.special_ids, config.primary_ceiling);

    info!(
        cursor = ?report.resume_cursor,
        start,
        last = config.last_id,
        total = ids.len(),
        workers = workers_count,
        "starting full import"
    );
    ui.set_info(format!(
        "Resuming after {:?}, {} ids to scan with {} workers",
        report.resume_cursor,
        ids.len(),
        workers_count
    ));

    let mut workers = (0..workers_count)
        .map(|index| factory.open().map(|store| ImportWorker::new(index, store)))
        .collect::<Result<Vec<_>>>()?;

    let mut total = ids.len() as u64;
    let mut queue: VecDeque<i64> = ids.into();
    let mut retrying = BTreeSet::new();
    let mut scanned: u64 = 0;

    ui.set_phase(Phase::Importing);
    loop {
        while let Some(&next) = queue.front() {
            if ui.stop_requested() {
                warn!(next, "stop requested, flushing and exiting");
                report.interrupted = true;
                break;
            }

            let alive: Vec<&mut ImportWorker<F::Store>> =
                workers.iter_mut().filter(|w| !w.is_failed()).collect();
            if alive.is_empty() {
                error!(next, "all workers failed, abandoning scan");
                ui.log("All workers failed");
                break;
            }

            let width = alive.len().min(queue.len());
            let stride: Vec<i64> = queue.drain(..width).collect();
            for id in &stride {
                retrying.remove(id);
            }

            // Live workers take the offsets in index order; the scope is the join barrier
            thread::scope(|scope| {
                for (worker, &id) in alive.into_iter().zip(&stride) {
                    scope.spawn(move || worker.process(source, id, config.commit_every));
                }
            });

            scanned += stride.len() as u64;
            let requeued = requeue_dropped(&mut workers, &mut queue, &mut retrying);
            if requeued > 0 {
                warn!(requeued, "handing a failed worker's ids to the others");
                ui.log(format!("Requeued {} ids from a failed worker", requeued));
                report.requeued += requeued;
                total += requeued;
            }

            ui.set_progress(scanned, total, format!("item {}", stride[stride.len() - 1]));
            ui.set_counters(&tally(&workers));
        }

        ui.set_phase(Phase::Flushing);
        for worker in workers.iter_mut() {
            worker.flush();
        }

        let requeued = requeue_dropped(&mut workers, &mut queue, &mut retrying);
        report.requeued += requeued;
        total += requeued;
        if requeued == 0 || report.interrupted || workers.iter().all(|w| w.is_failed()) {
            break;
        }

        warn!(requeued, "final flush failed, retrying its ids");
        ui.set_phase(Phase::Importing);
    }

    report.unscanned = queue.len() as u64;
    report.unrecovered_ids = retrying.into_iter().collect();
    if !report.unrecovered_ids.is_empty() {
        error!(ids = ?report.unrecovered_ids, "ids dropped by failed workers were never retried");
        ui.log(format!("{} dropped ids were never retried", report.unrecovered_ids.len()));
    }

    for worker in workers {
        report.processed += worker.processed;
        report.imported += worker.imported;
        report.skipped.merge(&worker.skipped);
        report.lost += worker.lost;
        if let Some(error) = worker.failure {
            report.failed_workers.push(WorkerFailure {
                worker: worker.index,
                error,
            });
        }
    }

    info!(
        imported = report.imported,
        skipped = report.skipped.total(),
        lost = report.lost,
        requeued = report.requeued,
        unscanned = report.unscanned,
        failed_workers = report.failed_workers.len(),
        "full import finished"
    );
    ui.log(format!("Imported {}, skipped {}", report.imported, report.skipped));
    ui.set_phase(Phase::Done);

    Ok(report)
}

/// Put every id dropped by a failed worker back at the front of the queue, lowest first
fn requeue_dropped<S>(
    workers: &mut [ImportWorker<S>],
    queue: &mut VecDeque<i64>,
    retrying: &mut BTreeSet<i64>,
) -> u64 {
    let mut dropped: Vec<i64> = workers
        .iter_mut()
        .flat_map(|w| std::mem::take(&mut w.dropped))
        .collect();
    dropped.sort_unstable();

    for &id in dropped.iter().rev() {
        queue.push_front(id);
        retrying.insert(id);
    }
    dropped.len() as u64
}

fn tally<S>(workers: &[ImportWorker<S>]) -> Vec<(&'static str, u64)> {
    let mut skipped = SkipCounts::default();
    let mut imported = 0;
    let mut staged = 0;
    for worker in workers {
        skipped.merge(&worker.skipped);
        imported += worker.imported;
        staged += worker.staged.len() as u64;
    }

    let mut counters = vec![("imported", imported), ("staged", staged), ("skipped", skipped.total())];
    counters.extend(skipped.counters());
    counters.push(("failed workers", workers.iter().filter(|w| w.failure.is_some()).count() as u64));
    counters
}
