//! Bounded fan-out of feed requests
//!
//! Work is cut into strides of at most `workers` jobs. Every job of a stride
//! runs on its own scoped thread and the scope joins them all before the next
//! stride starts, so no more than `workers` requests are ever in flight.

use std::thread;
use tracing::debug;

use crate::catalog::Locale;
use crate::parser::{parse_item, ParseOutcome};
use crate::source::{FetchError, ItemSource};

/// One feed lookup: item id and, for translated names, the locale
pub type FetchJob = (i64, Option<Locale>);

pub fn fetch_and_parse<S: ItemSource + ?Sized>(
    source: &S,
    id: i64,
    locale: Option<Locale>,
) -> Result<ParseOutcome, FetchError> {
    let bytes = source.fetch(id, locale)?;
    debug!(id, ?locale, bytes = bytes.len(), "fetched");
    Ok(parse_item(&bytes))
}

/// Fetch and parse every job, stride by stride; results come back in job order
pub fn fetch_in_strides<S: ItemSource + ?Sized>(
    source: &S,
    jobs: &[FetchJob],
    workers: usize,
) -> Vec<Result<ParseOutcome, FetchError>> {
    let mut results = Vec::with_capacity(jobs.len());

    for stride in jobs.chunks(workers.max(1)) {
        let outcomes: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = stride
                .iter()
                .map(|&(id, locale)| scope.spawn(move || fetch_and_parse(source, id, locale)))
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });
        results.extend(outcomes);
    }

    results
}
