//! Cache Statistics Module
//!
//! Counters kept by the embedded store and reported on `/health`.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of embedded store metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Reads that found nothing, including expired entries
    pub misses: u64,
    /// Keys currently readable
    pub live_keys: usize,
    /// Size of `data.mdb`
    pub total_bytes: u64,
    /// Bytes held by free pages
    pub stale_bytes: u64,
    /// Completed compaction passes
    pub gc_runs: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of reads that returned a value.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    /// Share of the data file a compaction pass would reclaim.
    pub fn discard_ratio(&self) -> f64 {
        ratio(self.stale_bytes, self.total_bytes)
    }

    pub(crate) fn record_read(&mut self, found: bool) {
        if found {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    pub(crate) fn record_gc(&mut self) {
        self.gc_runs += 1;
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
