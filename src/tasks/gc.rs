//! Embedded Store GC Task
//!
//! Scheduled garbage collection of the embedded cache. Outcomes and failures
//! are logged only; nothing is propagated to callers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{GcOutcome, LmdbStore};
use crate::error::SchedulerError;
use crate::tasks::Scheduler;

pub const GC_JOB: &str = "embedded-store-gc";

/// Registers the GC job on `scheduler`. An invalid expression is returned
/// to the caller, which treats it as fatal.
pub fn register_store_gc(
    scheduler: &Scheduler,
    store: Arc<LmdbStore>,
    expression: &str,
    discard_ratio: f64,
) -> Result<(), SchedulerError> {
    scheduler.add(GC_JOB, expression, move || {
        run_store_gc(Arc::clone(&store), discard_ratio)
    })
}

/// Runs one GC pass on the blocking pool and logs the outcome.
pub async fn run_store_gc(store: Arc<LmdbStore>, discard_ratio: f64) {
    let result = tokio::task::spawn_blocking(move || store.run_gc(discard_ratio)).await;

    match result {
        Ok(Ok(GcOutcome::Compacted {
            reclaimed_bytes,
            live_keys,
        })) => {
            info!(reclaimed_bytes, live_keys, "embedded store compacted");
        }
        Ok(Ok(GcOutcome::NoRewrite { discard_ratio })) => {
            debug!(discard_ratio, "embedded store below discard ratio, not compacted");
        }
        Ok(Ok(GcOutcome::AlreadyRunning)) => {
            debug!("embedded store gc already running, skipped");
        }
        Ok(Err(e)) => {
            warn!(error = %e, "embedded store gc failed");
        }
        Err(e) => {
            warn!(error = %e, "embedded store gc task panicked");
        }
    }
}
