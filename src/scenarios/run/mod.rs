//! Scenario execution.
//!
//! Families run one after another in suite order. Each scenario wipes its
//! own scratch directory, invokes the tool once (or `repeat` times), and
//! records one test for the exit code plus one per compared artifact.
mod annotate;
mod bench;
mod collapse;
mod export;

use super::golden::discover_golden;
use crate::assertions::AssertionEngine;
use crate::checksum::compare_files;
use crate::config::{LoadedSuite, REFERENCE_PLACEHOLDER};
use crate::invoke::{invoke, resolve_program, CommandOutput, ToolCommand};
use crate::layout::{ScenarioDirs, SuiteLayout};
use crate::query::{query_for, FieldQuery, FieldQueryBackend};
use crate::util::file_name_str;
use anyhow::{anyhow, Context, Result};
use globset::{Glob, GlobMatcher};
use std::path::Path;
use std::time::{Duration, Instant};

/// Caller-chosen knobs for one run.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// Glob over scenario ids; scenarios that do not match are omitted.
    pub only: Option<String>,
}

/// Everything a scenario builder needs, threaded explicitly.
pub(super) struct RunContext<'a> {
    pub(super) suite: &'a LoadedSuite,
    pub(super) layout: SuiteLayout,
    pub(super) tool: ToolCommand,
    pub(super) timeout: Option<Duration>,
    pub(super) query: Box<dyn FieldQuery>,
    pub(super) engine: AssertionEngine,
    filter: Option<GlobMatcher>,
}

/// Run every selected scenario and hand back the recorded results.
///
/// Only infrastructure problems return `Err`; tool failures and mismatches
/// are recorded in the engine.
pub fn run_suite(suite: &LoadedSuite, options: &RunOptions) -> Result<AssertionEngine> {
    let layout = suite.layout();
    layout.check().context("check suite layout")?;
    let tool = suite.tool();
    let executable = resolve_program(tool.executable()).context("resolve tool executable")?;
    tracing::debug!(executable = %executable.display(), "tool resolved");

    let scenarios = &suite.config.scenarios;
    if suite.config.field_query == FieldQueryBackend::Bcftools
        && scenarios.annotations.iter().any(|config| config.disabled.is_none())
    {
        resolve_program("bcftools").context("resolve field query backend")?;
    }
    let filter = match options.only.as_deref() {
        Some(pattern) => Some(
            Glob::new(pattern)
                .with_context(|| format!("compile --only pattern {pattern:?}"))?
                .compile_matcher(),
        ),
        None => None,
    };

    let timeout = suite.timeout();
    let mut ctx = RunContext {
        suite,
        layout,
        tool,
        timeout,
        query: query_for(suite.config.field_query, timeout),
        engine: AssertionEngine::new(),
        filter,
    };

    if let Some(config) = &scenarios.version {
        bench::run_version(&mut ctx, config)?;
    }
    for config in &scenarios.pairwise {
        bench::run_pairwise(&mut ctx, config)?;
    }
    for config in &scenarios.consistency {
        bench::run_consistency(&mut ctx, config)?;
    }
    for config in &scenarios.hap_collapse {
        collapse::run_hap_collapse(&mut ctx, config)?;
    }
    collapse::run_strategies(&mut ctx, &scenarios.multi_collapse)?;
    for config in &scenarios.annotations {
        annotate::run_annotation(&mut ctx, config)?;
    }
    for config in &scenarios.tables {
        export::run_table_export(&mut ctx, config)?;
    }
    Ok(ctx.engine)
}

impl RunContext<'_> {
    /// Decide whether a scenario runs: filtered-out ids are omitted and
    /// disabled ones are recorded as skipped.
    pub(super) fn admit(&mut self, id: &str, disabled: &Option<String>) -> Result<bool> {
        if let Some(filter) = &self.filter {
            if !filter.is_match(id) {
                tracing::debug!(scenario = id, "filtered out");
                return Ok(false);
            }
        }
        if let Some(reason) = disabled {
            self.engine.skip(id, reason)?;
            return Ok(false);
        }
        Ok(true)
    }

    pub(super) fn fixture(&self, rel: &str) -> String {
        self.layout.fixture(rel).display().to_string()
    }

    pub(super) fn reference(&self) -> Result<String> {
        self.suite
            .reference()
            .map(|path| path.display().to_string())
            .ok_or_else(|| anyhow!("suite has no reference sequence"))
    }

    /// Substitute `{fixtures}`, `{golden}`, `{reference}` and `{scratch}` in
    /// user-supplied arguments.
    pub(super) fn expand_args(&self, args: &[String], scratch: &Path) -> Result<Vec<String>> {
        let reference = self.suite.reference().map(|path| path.display().to_string());
        let fixtures = self.layout.fixtures_dir().display().to_string();
        let golden = self.layout.golden_dir().display().to_string();
        let scratch = scratch.display().to_string();
        args.iter()
            .map(|arg| {
                let expanded = arg
                    .replace("{fixtures}", &fixtures)
                    .replace("{golden}", &golden)
                    .replace("{scratch}", &scratch);
                match (&reference, arg.contains(REFERENCE_PLACEHOLDER)) {
                    (Some(reference), true) => {
                        Ok(expanded.replace(REFERENCE_PLACEHOLDER, reference))
                    }
                    (None, true) => Err(anyhow!(
                        "argument {arg:?} uses {REFERENCE_PLACEHOLDER} but the suite has no reference"
                    )),
                    (_, false) => Ok(expanded),
                }
            })
            .collect()
    }

    /// Start test `name`, run the tool once, and record the exit-code check.
    pub(super) fn invoke_tool(&mut self, name: &str, args: &[String]) -> Result<CommandOutput> {
        self.engine.run(name)?;
        let invocation = self
            .tool
            .invocation(args)
            .cwd(self.layout.scratch_root())
            .timeout(self.timeout);
        let command_line = invocation.command_line();
        tracing::debug!(test = name, command = %command_line, "invoke");
        let output =
            invoke(&invocation).with_context(|| format!("run tool for test {name:?}"))?;
        tracing::debug!(
            test = name,
            status = %output.status_string(),
            duration_ms = output.duration.as_millis() as u64,
            "tool finished"
        );
        self.engine.capture(&command_line, &output)?;
        self.engine.assert_exit_code(output.exit_code, 0)?;
        Ok(output)
    }

    /// Checksum-compare one produced file with its golden counterpart as test `name`.
    pub(super) fn compare_file(
        &mut self,
        name: &str,
        produced: &Path,
        golden: &Path,
    ) -> Result<bool> {
        self.engine.run(name)?;
        let comparison = compare_files(produced, golden);
        self.engine.record(comparison.passed, comparison.detail)
    }

    /// Compare every golden file in `dirs.golden` matching `pattern` with the
    /// same-named produced file. Finding nothing is a failure.
    pub(super) fn compare_golden_set(
        &mut self,
        id: &str,
        dirs: &ScenarioDirs,
        pattern: &str,
    ) -> Result<()> {
        let golden = match discover_golden(&dirs.golden, pattern) {
            Ok(found) if !found.is_empty() => found,
            Ok(_) => {
                self.engine.run(&format!("{id}:golden"))?;
                self.engine.record(
                    false,
                    format!(
                        "golden pattern {pattern:?} matched no files in {}",
                        dirs.golden.display()
                    ),
                )?;
                return Ok(());
            }
            Err(err) => {
                self.engine.run(&format!("{id}:golden"))?;
                self.engine.record(false, format!("{err:#}"))?;
                return Ok(());
            }
        };
        for golden_path in golden {
            let name = file_name_str(&golden_path)?.to_string();
            self.compare_file(
                &format!("{id}:{name}"),
                &dirs.produced(&name),
                &golden_path,
            )?;
        }
        Ok(())
    }
}

pub(super) fn scenario_started(id: &str) -> Instant {
    tracing::info!(scenario = id, "scenario start");
    Instant::now()
}

pub(super) fn scenario_finished(id: &str, started: Instant) {
    tracing::info!(
        scenario = id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scenario finished"
    );
}
