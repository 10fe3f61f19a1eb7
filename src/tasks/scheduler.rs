//! Cron Scheduler
//!
//! Runs named jobs on cron schedules, each on its own task.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SchedulerError;

/// Parses a cron expression (six or seven fields, or a shortcut like `@daily`).
pub fn parse_schedule(job: &str, expression: &str) -> Result<Schedule, SchedulerError> {
    Schedule::from_str(expression).map_err(|e| SchedulerError::InvalidSchedule {
        job: job.to_string(),
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

// == Scheduler ==
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `job` under `name`.
    ///
    /// A run always finishes before the next fire time is computed, so a job
    /// never overlaps itself; fire times missed while it runs are skipped.
    pub fn add<F, Fut>(&self, name: &str, expression: &str, job: F) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let schedule = parse_schedule(name, expression)?;

        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(name) {
            return Err(SchedulerError::DuplicateJob(name.to_string()));
        }

        let job_name = name.to_string();
        let handle = tokio::spawn(async move {
            while let Some(next) = schedule.upcoming(Utc).next() {
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                debug!(job = %job_name, "scheduled job starting");
                job().await;
                debug!(job = %job_name, "scheduled job finished");
            }
        });

        info!(job = name, schedule = expression, "scheduled job registered");
        jobs.insert(name.to_string(), handle);
        Ok(())
    }

    /// Names of the registered jobs, sorted.
    pub fn jobs(&self) -> Vec<String> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = jobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stops every job. A run in progress is dropped at its next await point.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        for (name, handle) in jobs.drain() {
            handle.abort();
            debug!(job = %name, "scheduled job stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_parse_schedule() {
        assert!(parse_schedule("gc", "@daily").is_ok());
        assert!(parse_schedule("gc", "0 0 * * * *").is_ok());

        let err = parse_schedule("gc", "every day").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { ref job, .. } if job == "gc"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_and_duplicate() {
        let scheduler = Scheduler::new();
        assert!(scheduler.add("bad", "not cron", || async {}).is_err());

        scheduler.add("gc", "@daily", || async {}).unwrap();
        let dup = scheduler.add("gc", "@hourly", || async {});
        assert!(matches!(dup, Err(SchedulerError::DuplicateJob(_))));
        assert_eq!(scheduler.jobs(), vec!["gc".to_string()]);
    }

    #[tokio::test]
    async fn test_job_runs_and_stops() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        scheduler
            .add("tick", "* * * * * *", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(runs.load(Ordering::SeqCst) >= 1);

        scheduler.shutdown();
        assert!(scheduler.jobs().is_empty());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after);
    }
}
