//! Translated-name backfill
//!
//! The frontier is the lowest id still missing a name for the marker
//! locale; every item at or above it is refetched for each locale. Items
//! below the frontier are taken as done without looking at them. If a run
//! dies after committing some pages, an item whose marker name landed but
//! whose other locales failed is never revisited by later runs.

use anyhow::Result;
use tracing::{debug, info, warn};

use super::pool::{fetch_in_strides, FetchJob};
use super::{SkipCounts, SkipReason};
use crate::catalog::{Locale, LocaleNameUpdate};
use crate::parser::ParseOutcome;
use crate::source::ItemSource;
use crate::store::CatalogStore;
use crate::ui::{Phase, Ui};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Lowest id missing the marker locale when the run started
    pub frontier: Option<i64>,
    pub items: u64,
    pub names_set: u64,
    /// Names taken from the raw-text fallback
    pub recovered: u64,
    pub skipped: SkipCounts,
    pub pages: u64,
    pub interrupted: bool,
}

/// Backfill `locales` for every item from the marker-locale frontier upwards
pub fn run_backfill<St, I>(
    store: &mut St,
    source: &I,
    locales: &[Locale],
    marker: Locale,
    page_size: usize,
    workers: usize,
    ui: &mut impl Ui,
) -> Result<BackfillReport>
where
    St: CatalogStore,
    I: ItemSource + ?Sized,
{
    let mut report = BackfillReport::default();

    ui.set_phase(Phase::Scanning);
    report.frontier = store.min_id_missing_locale(marker)?;

    let Some(frontier) = report.frontier else {
        info!(%marker, "every item already has a name for the marker locale");
        ui.log(format!("Nothing to backfill for {}", marker));
        ui.set_phase(Phase::Done);
        return Ok(report);
    };

    let codes: Vec<&str> = locales.iter().map(|l| l.code()).collect();
    info!(frontier, %marker, locales = %codes.join(","), "starting locale backfill");
    ui.set_info(format!("From item {} for {}", frontier, codes.join(", ")));

    ui.set_phase(Phase::Backfilling);
    let mut start = frontier;

    loop {
        if ui.stop_requested() {
            warn!(next = start, "stop requested");
            report.interrupted = true;
            break;
        }

        let page = store.page_from(start, page_size)?;
        let Some(last) = page.last() else { break };
        start = last.id + 1;

        let jobs: Vec<FetchJob> = page
            .iter()
            .flat_map(|item| locales.iter().map(move |&locale| (item.id, Some(locale))))
            .collect();
        let outcomes = fetch_in_strides(source, &jobs, workers);

        let mut updates = Vec::new();
        for (&(id, locale), outcome) in jobs.iter().zip(outcomes) {
            let Some(locale) = locale else { continue };

            match outcome {
                Ok(ParseOutcome::Item(parsed)) if parsed.id != id => {
                    warn!(id, %locale, echoed = parsed.id, "payload is for another id");
                    report.skipped.record(SkipReason::Mismatched);
                }
                Ok(ParseOutcome::Item(parsed)) => {
                    updates.push(LocaleNameUpdate { id, locale, name: parsed.name });
                }
                Ok(ParseOutcome::Malformed { name: Some(name), reason }) => {
                    debug!(id, %locale, %reason, "using recovered name");
                    report.recovered += 1;
                    updates.push(LocaleNameUpdate { id, locale, name });
                }
                Ok(ParseOutcome::Malformed { name: None, reason }) => {
                    warn!(id, %locale, %reason, "no name recovered");
                    report.skipped.record(SkipReason::Malformed);
                }
                Ok(ParseOutcome::Absent) => {
                    warn!(id, %locale, "item missing from locale feed");
                    report.skipped.record(SkipReason::Absent);
                }
                Err(err) => {
                    warn!(id, %locale, error = %err, "fetch failed");
                    report.skipped.record(SkipReason::FetchFailed);
                }
            }
        }

        let touched = store.set_locale_names(&updates)?;
        report.items += page.len() as u64;
        report.names_set += touched as u64;
        report.pages += 1;

        info!(page = report.pages, last_id = last.id, names = touched, "committed page");
        ui.set_progress(report.items, 0, format!("item {}", last.id));
        ui.set_counters(&[
            ("items", report.items),
            ("names set", report.names_set),
            ("recovered", report.recovered),
            ("skipped", report.skipped.total()),
        ]);
    }

    info!(
        items = report.items,
        names = report.names_set,
        skipped = report.skipped.total(),
        "locale backfill finished"
    );
    ui.log(format!("Set {} names, skipped {}", report.names_set, report.skipped));
    ui.set_phase(Phase::Done);

    Ok(report)
}
