//! Named test cases with non-fatal assertions.
//!
//! A failed assertion is recorded and the run continues; the only aggregate
//! signal is [`AssertionEngine::exit_code`].
use crate::invoke::CommandOutput;
use crate::util::truncate_bytes;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{Debug, Write as _};

const STREAM_SNIPPET_BYTES: usize = 2048;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

impl CaseStatus {
    pub fn label(self) -> &'static str {
        match self {
            CaseStatus::Passed => "PASS",
            CaseStatus::Failed => "FAIL",
            CaseStatus::Skipped => "SKIP",
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
    pub test_name: String,
    pub passed: bool,
    pub detail: String,
}

/// Captured process run attached to a test case.
#[derive(Debug, Serialize, Clone)]
pub struct CapturedRun {
    pub command_line: String,
    pub exit_code: Option<i32>,
    pub status: String,
    pub timed_out: bool,
    pub duration_ms: u128,
    #[serde(skip)]
    pub stdout: Vec<u8>,
    #[serde(skip)]
    pub stderr: Vec<u8>,
    pub stderr_snippet: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct TestCase {
    pub name: String,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<CapturedRun>,
    pub results: Vec<ComparisonResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl TestCase {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CaseStatus::Failed,
            expected_exit_code: None,
            run: None,
            results: Vec::new(),
            skip_reason: None,
        }
    }

    fn settle(&mut self) {
        if self.skip_reason.is_some() {
            self.status = CaseStatus::Skipped;
        } else if !self.results.is_empty() && self.results.iter().all(|result| result.passed) {
            self.status = CaseStatus::Passed;
        } else {
            self.status = CaseStatus::Failed;
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct AssertionEngine {
    cases: Vec<TestCase>,
    names: BTreeSet<String>,
    current: Option<usize>,
}

impl AssertionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a test case; a repeated name is an authoring error.
    pub fn run(&mut self, name: &str) -> Result<()> {
        self.register(name)?;
        self.cases.push(TestCase::new(name));
        self.current = Some(self.cases.len() - 1);
        tracing::info!(test = name, "run");
        Ok(())
    }

    /// Record a test case that was deliberately not run.
    pub fn skip(&mut self, name: &str, reason: &str) -> Result<()> {
        self.register(name)?;
        let mut case = TestCase::new(name);
        case.skip_reason = Some(reason.to_string());
        case.settle();
        self.cases.push(case);
        self.current = None;
        tracing::info!(test = name, reason, "skip");
        Ok(())
    }

    fn register(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("test name must be non-empty"));
        }
        if !self.names.insert(name.to_string()) {
            return Err(anyhow!("duplicate test name {name:?}"));
        }
        Ok(())
    }

    fn current_mut(&mut self) -> Result<&mut TestCase> {
        let idx = self
            .current
            .ok_or_else(|| anyhow!("assertion recorded outside of a running test case"))?;
        Ok(&mut self.cases[idx])
    }

    /// Attach captured process output to the current case; captures are immutable.
    pub fn capture(&mut self, command_line: &str, output: &CommandOutput) -> Result<()> {
        let case = self.current_mut()?;
        if case.run.is_some() {
            return Err(anyhow!(
                "test case {:?} already captured a process run",
                case.name
            ));
        }
        case.run = Some(CapturedRun {
            command_line: command_line.to_string(),
            exit_code: output.exit_code,
            status: output.status_string(),
            timed_out: output.timed_out,
            duration_ms: output.duration.as_millis(),
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            stderr_snippet: truncate_bytes(&output.stderr, STREAM_SNIPPET_BYTES),
        });
        Ok(())
    }

    /// Record one boolean outcome against the current case.
    pub fn record(&mut self, passed: bool, detail: impl Into<String>) -> Result<bool> {
        let case = self.current_mut()?;
        let result = ComparisonResult {
            test_name: case.name.clone(),
            passed,
            detail: detail.into(),
        };
        if !passed {
            tracing::warn!(test = %result.test_name, detail = %result.detail, "assertion failed");
        }
        case.results.push(result);
        case.settle();
        Ok(passed)
    }

    pub fn assert_exit_code(&mut self, actual: Option<i32>, expected: i32) -> Result<bool> {
        let case = self.current_mut()?;
        case.expected_exit_code = Some(expected);
        let status = case
            .run
            .as_ref()
            .map(|run| run.status.clone())
            .unwrap_or_else(|| "no exit code".to_string());
        let passed = actual == Some(expected);
        let detail = match actual {
            Some(code) if passed => format!("exit code {code}"),
            Some(code) => format!("expected exit code {expected}, observed {code}"),
            None => format!("expected exit code {expected}, process {status}"),
        };
        self.record(passed, detail)
    }

    pub fn assert_equal<T: PartialEq + Debug>(&mut self, actual: T, expected: T) -> Result<bool> {
        let passed = actual == expected;
        let detail = if passed {
            format!("equal {actual:?}")
        } else {
            format!("expected {expected:?}, observed {actual:?}")
        };
        self.record(passed, detail)
    }

    pub fn assert_in_stdout(&mut self, needle: &str) -> Result<bool> {
        let haystack = self.captured_stdout(needle)?;
        let passed = haystack.contains(needle);
        self.record(passed, substring_detail("stdout", needle, passed))
    }

    fn captured_stdout(&mut self, needle: &str) -> Result<String> {
        let case = self.current_mut()?;
        let run = case.run.as_ref().ok_or_else(|| {
            anyhow!(
                "test case {:?} checks for {needle:?} but captured no process output",
                case.name
            )
        })?;
        Ok(String::from_utf8_lossy(&run.stdout).into_owned())
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.cases.len(),
            ..RunSummary::default()
        };
        for case in &self.cases {
            match case.status {
                CaseStatus::Passed => summary.passed += 1,
                CaseStatus::Failed => summary.failed += 1,
                CaseStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// 0 when no case failed, 1 otherwise. Skips never count as passes, but
    /// do not fail the run either.
    pub fn exit_code(&self) -> i32 {
        if self.summary().failed == 0 {
            0
        } else {
            1
        }
    }

    /// Human summary: one line per test plus failure details and totals.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        for case in &self.cases {
            let _ = writeln!(out, "{} {}", case.status.label(), case.name);
            match case.status {
                CaseStatus::Skipped => {
                    if let Some(reason) = &case.skip_reason {
                        let _ = writeln!(out, "    not run: {reason}");
                    }
                }
                CaseStatus::Failed if case.results.is_empty() => {
                    let _ = writeln!(out, "    no assertions recorded");
                }
                CaseStatus::Failed => {
                    for result in case.results.iter().filter(|result| !result.passed) {
                        let _ = writeln!(out, "    {}", result.detail);
                    }
                    if let Some(run) = &case.run {
                        let _ = writeln!(out, "    command: {}", run.command_line);
                        let stderr = run.stderr_snippet.trim();
                        if !stderr.is_empty() {
                            let _ = writeln!(out, "    stderr: {stderr}");
                        }
                    }
                }
                CaseStatus::Passed => {}
            }
        }
        let summary = self.summary();
        let _ = writeln!(
            out,
            "{} tests: {} passed, {} failed, {} skipped",
            summary.total, summary.passed, summary.failed, summary.skipped
        );
        out
    }
}

fn substring_detail(stream: &str, needle: &str, passed: bool) -> String {
    if passed {
        format!("{stream} contains {needle:?}")
    } else {
        format!("{stream} missing substring {needle:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn case<'e>(engine: &'e AssertionEngine, name: &str) -> &'e TestCase {
        engine
            .cases()
            .iter()
            .find(|case| case.name == name)
            .unwrap()
    }

    fn output(code: Option<i32>, stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code: code,
            signal: None,
            timed_out: code.is_none(),
            stdout: stdout.as_bytes().to_vec(),
            stderr: b"warning: something".to_vec(),
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut engine = AssertionEngine::new();
        engine.run("bench_12").unwrap();
        let err = engine.run("bench_12").unwrap_err();
        assert!(err.to_string().contains("duplicate test name"));
        assert!(engine.skip("bench_12", "tool missing").is_err());
    }

    #[test]
    fn failures_are_recorded_and_later_cases_still_run() {
        let mut engine = AssertionEngine::new();
        engine.run("first").unwrap();
        assert!(!engine.assert_equal("abc", "abd").unwrap());
        engine.run("second").unwrap();
        assert!(engine.assert_equal(1, 1).unwrap());

        let summary = engine.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.passed, 1);
        assert_eq!(engine.exit_code(), 1);
        assert_eq!(case(&engine, "first").status, CaseStatus::Failed);
        assert_eq!(case(&engine, "second").status, CaseStatus::Passed);
    }

    #[test]
    fn one_failed_assertion_fails_the_case() {
        let mut engine = AssertionEngine::new();
        engine.run("multi").unwrap();
        engine.record(true, "a").unwrap();
        engine.record(false, "b").unwrap();
        engine.record(true, "c").unwrap();
        assert_eq!(case(&engine, "multi").status, CaseStatus::Failed);
    }

    #[test]
    fn assertions_without_a_case_are_authoring_errors() {
        let mut engine = AssertionEngine::new();
        assert!(engine.assert_equal(1, 1).is_err());
        engine.skip("disabled", "needs trf").unwrap();
        assert!(engine.record(true, "late").is_err());
    }

    #[test]
    fn unequal_values_fail_with_both_sides_in_detail() {
        let mut engine = AssertionEngine::new();
        engine.run("digests").unwrap();
        assert!(engine.assert_equal(vec!["abc"], vec!["abc"]).unwrap());
        assert!(!engine.assert_equal(Some("abc"), None).unwrap());
        let case = case(&engine, "digests");
        assert_eq!(case.status, CaseStatus::Failed);
        let detail = &case.results[1].detail;
        assert!(detail.contains("Some(\"abc\")"), "{detail}");
        assert!(detail.contains("None"), "{detail}");
    }

    #[test]
    fn case_without_assertions_counts_as_failure() {
        let mut engine = AssertionEngine::new();
        engine.run("empty").unwrap();
        assert_eq!(engine.summary().failed, 1);
        assert!(engine.render_summary().contains("no assertions recorded"));
    }

    #[test]
    fn skipped_is_distinct_from_passed() {
        let mut engine = AssertionEngine::new();
        engine.skip("anno_trf", "trf executable unavailable").unwrap();
        let summary = engine.summary();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.passed, 0);
        assert_eq!(engine.exit_code(), 0);
        let text = engine.render_summary();
        assert!(text.contains("SKIP anno_trf"));
        assert!(text.contains("not run: trf executable unavailable"));
    }

    #[test]
    fn exit_code_and_stdout_assertions_use_captured_run() {
        let mut engine = AssertionEngine::new();
        engine.run("version").unwrap();
        engine
            .capture("truvari version", &output(Some(0), "Truvari v4.1.0\n"))
            .unwrap();
        assert!(engine.assert_exit_code(Some(0), 0).unwrap());
        assert!(engine.assert_in_stdout("v4.1.0").unwrap());
        assert!(!engine.assert_in_stdout("v9").unwrap());
        assert_eq!(engine.summary().failed, 1);
    }

    #[test]
    fn capture_is_immutable() {
        let mut engine = AssertionEngine::new();
        engine.run("once").unwrap();
        engine.capture("tool", &output(Some(0), "")).unwrap();
        assert!(engine.capture("tool", &output(Some(0), "")).is_err());
    }

    #[test]
    fn timed_out_run_fails_exit_code_check_with_status() {
        let mut engine = AssertionEngine::new();
        engine.run("hung").unwrap();
        engine.capture("tool bench", &output(None, "")).unwrap();
        assert!(!engine.assert_exit_code(None, 0).unwrap());
        let case = case(&engine, "hung");
        assert!(case.results[0].detail.contains("timed out"));
        let text = engine.render_summary();
        assert!(text.contains("FAIL hung"));
        assert!(text.contains("command: tool bench"));
    }

    #[test]
    fn substring_check_without_capture_is_an_error() {
        let mut engine = AssertionEngine::new();
        engine.run("no_capture").unwrap();
        assert!(engine.assert_in_stdout("x").is_err());
    }
}
