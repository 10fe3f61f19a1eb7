//! Background Tasks Module
//!
//! Cron scheduling and the jobs it runs.

pub mod gc;
pub mod scheduler;

pub use gc::{register_store_gc, run_store_gc};
pub use scheduler::Scheduler;
