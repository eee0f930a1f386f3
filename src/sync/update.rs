use anyhow::Result;
use tracing::{info, warn};

use super::pool::{fetch_in_strides, FetchJob};
use super::{SkipCounts, SkipReason};
use crate::config::UpdateConfig;
use crate::parser::ParseOutcome;
use crate::source::ItemSource;
use crate::store::CatalogStore;
use crate::ui::{Phase, Ui};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub checked: u64,
    pub updated: u64,
    /// Items whose classification already matched
    pub unchanged: u64,
    pub skipped: SkipCounts,
    pub pages: u64,
    pub interrupted: bool,
}

/// Refresh class/subclass of every stored item, one commit per page
///
/// Items the feed no longer returns cleanly are left exactly as they are.
pub fn run_update<St, I>(
    store: &mut St,
    source: &I,
    config: &UpdateConfig,
    ui: &mut impl Ui,
) -> Result<UpdateReport>
where
    St: CatalogStore,
    I: ItemSource + ?Sized,
{
    let mut report = UpdateReport::default();

    ui.set_phase(Phase::Scanning);
    let total = store.count()?;
    info!(total, page_size = config.page_size, workers = config.workers, "starting value update");
    ui.set_info(format!("{} items to refresh", total));

    ui.set_phase(Phase::Updating);
    let mut start = i64::MIN;

    loop {
        if ui.stop_requested() {
            warn!(next = start, "stop requested");
            report.interrupted = true;
            break;
        }

        let page = store.page_from(start, config.page_size)?;
        let Some(last) = page.last() else { break };
        start = last.id + 1;

        let jobs: Vec<FetchJob> = page.iter().map(|item| (item.id, None)).collect();
        let outcomes = fetch_in_strides(source, &jobs, config.workers);

        let mut updates = Vec::new();
        for (item, outcome) in page.iter().zip(outcomes) {
            report.checked += 1;
            match outcome {
                Ok(ParseOutcome::Item(parsed)) if parsed.id == item.id => {
                    let update = parsed.class_update(item);
                    if update.item_class == item.item_class && update.item_subclass == item.item_subclass {
                        report.unchanged += 1;
                    } else {
                        updates.push(update);
                    }
                }
                Ok(ParseOutcome::Item(parsed)) => {
                    warn!(id = item.id, echoed = parsed.id, "payload is for another id");
                    report.skipped.record(SkipReason::Mismatched);
                }
                Ok(ParseOutcome::Absent) => {
                    warn!(id = item.id, name = %item.name, "item no longer in feed");
                    report.skipped.record(SkipReason::Absent);
                }
                Ok(ParseOutcome::Malformed { reason, .. }) => {
                    warn!(id = item.id, name = %item.name, %reason, "malformed payload");
                    report.skipped.record(SkipReason::Malformed);
                }
                Err(err) => {
                    warn!(id = item.id, error = %err, "fetch failed");
                    report.skipped.record(SkipReason::FetchFailed);
                }
            }
        }

        let touched = store.update_classes(&updates)?;
        report.updated += touched as u64;
        report.pages += 1;

        info!(page = report.pages, last_id = last.id, updated = touched, "committed page");
        ui.set_progress(report.checked, total, format!("item {}", last.id));
        ui.set_counters(&[
            ("checked", report.checked),
            ("updated", report.updated),
            ("unchanged", report.unchanged),
            ("skipped", report.skipped.total()),
        ]);
    }

    info!(
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped.total(),
        "value update finished"
    );
    ui.log(format!("Updated {}, skipped {}", report.updated, report.skipped));
    ui.set_phase(Phase::Done);

    Ok(report)
}
