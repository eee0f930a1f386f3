//! Catalog synchronization passes
//!
//! - `import`: resumable, insert-only full import over the id space
//! - `update`: refresh class/subclass of stored items
//! - `backfill`: fill in translated names per locale

pub mod backfill;
pub mod import;
pub mod pool;
pub mod update;

pub use backfill::{run_backfill, BackfillReport};
pub use import::{plan_scan, run_import, ImportReport, WorkerFailure};
pub use update::{run_update, UpdateReport};

/// Why an id (or an id/locale pair) produced no write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Upstream has no such item
    Absent,
    /// Payload didn't decode and no name could be recovered
    Malformed,
    /// Payload described a different id than the one requested
    Mismatched,
    /// Already stored
    Existing,
    /// Store rejected a duplicate id at commit
    Conflict,
    /// Network error or non-success status
    FetchFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipCounts {
    pub absent: u64,
    pub malformed: u64,
    pub mismatched: u64,
    pub existing: u64,
    pub conflicts: u64,
    pub fetch_failed: u64,
}

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason) {
        self.add(reason, 1);
    }

    pub fn add(&mut self, reason: SkipReason, count: u64) {
        let slot = match reason {
            SkipReason::Absent => &mut self.absent,
            SkipReason::Malformed => &mut self.malformed,
            SkipReason::Mismatched => &mut self.mismatched,
            SkipReason::Existing => &mut self.existing,
            SkipReason::Conflict => &mut self.conflicts,
            SkipReason::FetchFailed => &mut self.fetch_failed,
        };
        *slot += count;
    }

    pub fn merge(&mut self, other: &SkipCounts) {
        self.absent += other.absent;
        self.malformed += other.malformed;
        self.mismatched += other.mismatched;
        self.existing += other.existing;
        self.conflicts += other.conflicts;
        self.fetch_failed += other.fetch_failed;
    }

    pub fn total(&self) -> u64 {
        self.absent + self.malformed + self.mismatched + self.existing + self.conflicts + self.fetch_failed
    }

    /// Labelled counters for display
    pub fn counters(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("absent", self.absent),
            ("malformed", self.malformed),
            ("mismatched", self.mismatched),
            ("existing", self.existing),
            ("conflicts", self.conflicts),
            ("fetch failed", self.fetch_failed),
        ]
    }
}

impl std::fmt::Display for SkipCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .counters()
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(label, count)| format!("{} {}", count, label))
            .collect();

        if parts.is_empty() {
            write!(f, "0")
        } else {
            write!(f, "{} ({})", self.total(), parts.join(", "))
        }
    }
}
