//! Scenario families and the runner that drives them.
//!
//! A suite declares a small parameter space per family (fixture pairs, keep
//! strategies, annotators); the runner expands it into invoke-then-compare
//! test cases without per-scenario special cases.
mod golden;
mod run;
pub mod types;

pub use run::{run_suite, RunOptions};
