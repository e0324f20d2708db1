//! Suite file loading and validation.
//!
//! A suite names the tool command, the fixture/golden/scratch roots, and the
//! scenario parameter space. Relative roots resolve against the directory
//! that contains the suite file.
use crate::invoke::ToolCommand;
use crate::layout::{path_within, validate_relative_path, SuiteLayout};
use crate::query::FieldQueryBackend;
use crate::scenarios::types::SuiteScenarios;
use crate::templates;
use crate::util::resolve_against;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUITE_SCHEMA_VERSION: u32 = 1;
const FIXTURE_ID_PLACEHOLDER: &str = "{id}";
pub const REFERENCE_PLACEHOLDER: &str = "{reference}";

fn default_annotation_baseline() -> String {
    "anno_answers.vcf.gz".to_string()
}

fn default_fixture_pattern() -> String {
    format!("input{FIXTURE_ID_PLACEHOLDER}.vcf.gz")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    pub program: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wrapper: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SuiteRoots {
    pub fixtures: String,
    pub golden: String,
    pub scratch: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    pub schema_version: u32,
    pub tool: ToolConfig,
    pub roots: SuiteRoots,
    /// Fixture-relative reference sequence passed to `bench` and `collapse`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    #[serde(default)]
    pub field_query: FieldQueryBackend,
    #[serde(default = "default_annotation_baseline")]
    pub annotation_baseline: String,
    #[serde(default = "default_fixture_pattern")]
    pub fixture_pattern: String,
    #[serde(default)]
    pub scenarios: SuiteScenarios,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_run: Vec<Vec<String>>,
}

/// A validated suite plus the directory its relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedSuite {
    pub config: SuiteConfig,
    pub base_dir: PathBuf,
}

impl LoadedSuite {
    pub fn layout(&self) -> SuiteLayout {
        let roots = &self.config.roots;
        SuiteLayout::new(
            resolve_against(&self.base_dir, Path::new(&roots.fixtures)),
            resolve_against(&self.base_dir, Path::new(&roots.golden)),
            resolve_against(&self.base_dir, Path::new(&roots.scratch)),
        )
    }

    /// Tool command with a path-like program resolved against the suite directory.
    pub fn tool(&self) -> ToolCommand {
        let tool = &self.config.tool;
        let program = if tool.program.contains('/') {
            resolve_against(&self.base_dir, Path::new(&tool.program))
                .display()
                .to_string()
        } else {
            tool.program.clone()
        };
        ToolCommand {
            wrapper: tool.wrapper.clone(),
            program,
            base_args: tool.base_args.clone(),
            env: tool.env.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config
            .timeout_seconds
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }

    pub fn reference(&self) -> Option<PathBuf> {
        let layout = self.layout();
        self.config
            .reference
            .as_deref()
            .map(|rel| layout.fixture(rel))
    }

    /// Fixture file name for a pairwise side, e.g. `1` -> `input1.vcf.gz`.
    pub fn pair_fixture(&self, id: &str) -> String {
        self.config.fixture_pattern.replace(FIXTURE_ID_PLACEHOLDER, id)
    }
}

/// Load and validate a suite from disk.
pub fn load_suite(path: &Path) -> Result<LoadedSuite> {
    let bytes = fs::read(path).with_context(|| format!("read suite {}", path.display()))?;
    let config: SuiteConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse suite JSON {}", path.display()))?;
    // The tool runs from the scratch root, so every path handed to it must be absolute.
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let base_dir = fs::canonicalize(parent)
        .with_context(|| format!("resolve suite directory {}", parent.display()))?;
    let suite = LoadedSuite { config, base_dir };
    let errors = validate_suite(&suite);
    if !errors.is_empty() {
        return Err(anyhow!(
            "invalid suite {}:\n  {}",
            path.display(),
            errors.join("\n  ")
        ));
    }
    Ok(suite)
}

/// Every problem in the suite, so an author can fix them in one pass.
pub fn validate_suite(suite: &LoadedSuite) -> Vec<String> {
    let config = &suite.config;
    let mut errors = Vec::new();
    if config.schema_version != SUITE_SCHEMA_VERSION {
        errors.push(format!(
            "unsupported suite schema_version {} (expected {SUITE_SCHEMA_VERSION})",
            config.schema_version
        ));
    }
    if config.tool.program.trim().is_empty() {
        errors.push("tool.program must be non-empty".to_string());
    }
    if config.tool.wrapper.iter().any(|word| word.trim().is_empty()) {
        errors.push("tool.wrapper must not contain empty words".to_string());
    }
    for (label, root) in [
        ("fixtures", &config.roots.fixtures),
        ("golden", &config.roots.golden),
        ("scratch", &config.roots.scratch),
    ] {
        if root.trim().is_empty() {
            errors.push(format!("roots.{label} must be non-empty"));
        }
    }
    let layout = suite.layout();
    for (label, protected) in [
        ("golden", layout.golden_dir()),
        ("fixtures", layout.fixtures_dir()),
    ] {
        let scratch = layout.scratch_root();
        if path_within(scratch, protected) || path_within(protected, scratch) {
            errors.push(format!(
                "roots.scratch must not overlap roots.{label} (scratch dirs are wiped)"
            ));
        }
    }
    if let Some(reference) = &config.reference {
        if let Err(err) = validate_relative_path(reference) {
            errors.push(format!("reference {err}"));
        }
    }
    if let Some(timeout) = config.timeout_seconds {
        if !(timeout > 0.0 && Duration::try_from_secs_f64(timeout).is_ok()) {
            errors.push(format!(
                "timeout_seconds must be a positive, representable duration, got {timeout}"
            ));
        }
    }
    if let Err(err) = validate_relative_path(&config.annotation_baseline) {
        errors.push(format!("annotation_baseline {err}"));
    }
    if !config.fixture_pattern.contains(FIXTURE_ID_PLACEHOLDER) {
        errors.push(format!("fixture_pattern must contain {FIXTURE_ID_PLACEHOLDER}"));
    }
    let needs_reference = !config.scenarios.pairwise.is_empty()
        || !config.scenarios.hap_collapse.is_empty()
        || !config.scenarios.multi_collapse.is_empty();
    if needs_reference && config.reference.is_none() {
        errors.push("reference is required by pairwise and collapse scenarios".to_string());
    }
    if config.reference.is_none() {
        for (id, args) in config.scenarios.extra_args() {
            if args.iter().any(|arg| arg.contains(REFERENCE_PLACEHOLDER)) {
                errors.push(format!(
                    "{id}: extra_args use {REFERENCE_PLACEHOLDER} but the suite has no reference"
                ));
            }
        }
    }
    for (idx, step) in config.post_run.iter().enumerate() {
        match step.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => errors.push(format!("post_run[{idx}] must start with a program name")),
        }
    }

    if config.scenarios.planned().is_empty() {
        errors.push("suite declares no scenarios".to_string());
    }
    config.scenarios.validate(&mut errors);

    let mut seen = BTreeSet::new();
    for planned in config.scenarios.planned() {
        if !seen.insert(planned.id.clone()) {
            errors.push(format!("duplicate scenario id {:?}", planned.id));
        }
    }
    for name in config.scenarios.derived_test_names() {
        if !seen.insert(name.clone()) {
            errors.push(format!(
                "scenario id {name:?} collides with the keep strategy comparison test"
            ));
        }
    }
    errors
}

/// Default suite for the toolkit's own regression layout.
pub fn suite_stub() -> Result<String> {
    let config: SuiteConfig =
        serde_json::from_str(templates::SUITE_JSON).context("parse suite template")?;
    let mut text = serde_json::to_string_pretty(&config).context("serialize suite stub")?;
    text.push('\n');
    Ok(text)
}
