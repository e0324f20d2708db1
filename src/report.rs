//! End-of-run aggregation: the machine-readable report and post-run steps.
//!
//! Post-run steps (coverage merge and report, typically) run only after every
//! scenario finished. Their failures are logged and never change the
//! harness verdict.
use crate::assertions::{AssertionEngine, RunSummary, TestCase};
use crate::invoke::{invoke, Invocation};
use crate::util::write_json;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub schema_version: u32,
    pub suite: String,
    pub exit_code: i32,
    pub summary: RunSummary,
    pub cases: &'a [TestCase],
}

impl<'a> RunReport<'a> {
    pub fn new(suite: &Path, engine: &'a AssertionEngine) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            suite: suite.display().to_string(),
            exit_code: engine.exit_code(),
            summary: engine.summary(),
            cases: engine.cases(),
        }
    }
}

pub fn write_report(path: &Path, report: &RunReport<'_>) -> Result<()> {
    write_json(path, report)?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}

/// Outcome of one post-run step, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostStepOutcome {
    Succeeded,
    Failed(String),
    NotRun(String),
}

/// Run each step in order from `cwd`; nothing here can fail the run.
pub fn run_post_steps(
    steps: &[Vec<String>],
    cwd: &Path,
    timeout: Option<Duration>,
) -> Vec<PostStepOutcome> {
    let mut outcomes = Vec::with_capacity(steps.len());
    for step in steps {
        let invocation = Invocation::new(step.clone()).cwd(cwd).timeout(timeout);
        let command_line = invocation.command_line();
        let outcome = match invoke(&invocation) {
            Ok(output) if output.success() => {
                tracing::info!(command = %command_line, "post-run step finished");
                PostStepOutcome::Succeeded
            }
            Ok(output) => {
                let status = output.status_string();
                tracing::warn!(
                    command = %command_line,
                    status = %status,
                    stderr = %output.stderr_text().trim(),
                    "post-run step failed"
                );
                PostStepOutcome::Failed(status)
            }
            Err(err) => {
                tracing::warn!(command = %command_line, error = %format!("{err:#}"), "post-run step not run");
                PostStepOutcome::NotRun(format!("{err:#}"))
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}
