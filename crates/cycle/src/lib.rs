//! Scan cycle orchestration.
//!
//! One cycle: fetch snapshots, evaluate rules, and for every due event claim
//! its history key, render, route and record the attempt. Cycles are
//! single-flight; the trigger loop skips ticks that arrive while a cycle is
//! still running.

pub mod error;
pub mod report;
pub mod runner;
pub mod scheduler;

pub use error::CycleError;
pub use report::CycleReport;
pub use runner::CycleRunner;
pub use scheduler::{normalize_cron, run_loop, Trigger};
