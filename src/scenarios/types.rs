//! Scenario parameters and per-family config records.
//!
//! Each family has its own record so a suite file cannot hand a collapse
//! scenario an annotation option; every record is validated before anything
//! is invoked.
use crate::layout::{validate_dir_name, validate_relative_path};
use crate::query::validate_field_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_repeat() -> u32 {
    1
}

fn default_golden_pattern() -> String {
    "*.vcf".to_string()
}

/// Which of several overlapping records survives collapsing.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum KeepStrategy {
    First,
    Common,
    Maxqual,
}

impl KeepStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeepStrategy::First => "first",
            KeepStrategy::Common => "common",
            KeepStrategy::Maxqual => "maxqual",
        }
    }
}

/// Annotation methods whose output is an annotated VCF.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Annotator {
    Gcpct,
    Gtcnt,
    Trf,
    Repmask,
    Remap,
    Hompct,
    Numneigh,
    Svinfo,
    Dpcnt,
    Lcr,
}

impl Annotator {
    pub fn method(&self) -> &'static str {
        match self {
            Annotator::Gcpct => "gcpct",
            Annotator::Gtcnt => "gtcnt",
            Annotator::Trf => "trf",
            Annotator::Repmask => "repmask",
            Annotator::Remap => "remap",
            Annotator::Hompct => "hompct",
            Annotator::Numneigh => "numneigh",
            Annotator::Svinfo => "svinfo",
            Annotator::Dpcnt => "dpcnt",
            Annotator::Lcr => "lcr",
        }
    }

    /// INFO fields the annotator is expected to populate.
    pub fn default_fields(&self) -> &'static [&'static str] {
        match self {
            Annotator::Gcpct => &["GCPCT"],
            Annotator::Gtcnt => &["GTCNT"],
            Annotator::Trf => &[
                "TRF",
                "TRFdiff",
                "TRFrepeat",
                "TRFovl",
                "TRFperiod",
                "TRFcopies",
                "TRFscore",
                "TRFentropy",
            ],
            Annotator::Repmask => &["RM_score", "RM_repeat", "RM_clsfam"],
            Annotator::Remap => &["REMAP"],
            Annotator::Hompct => &["HOMPCT"],
            Annotator::Numneigh => &["NumNeighbors", "NeighId"],
            Annotator::Svinfo => &["SVTYPE", "SVLEN"],
            Annotator::Dpcnt => &["DPCNT"],
            Annotator::Lcr => &["LCR"],
        }
    }
}

/// `version`: stdout must contain the declared version string.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct VersionConfig {
    pub expected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

/// `bench` of two fixture sets, compared file by file against `bench{left}{right}/`.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PairwiseScenarioConfig {
    pub left: String,
    pub right: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default = "default_golden_pattern")]
    pub golden_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

impl PairwiseScenarioConfig {
    pub fn pair_name(&self) -> String {
        format!("{}{}", self.left, self.right)
    }

    pub fn id(&self) -> String {
        format!("bench{}", self.pair_name())
    }
}

/// Haplotype-aware `collapse` of a single fixture.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct HapCollapseConfig {
    pub input: String,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

impl HapCollapseConfig {
    pub fn id(&self) -> String {
        format!("collapse_{}", fixture_stem(&self.input))
    }

    pub fn outputs(&self) -> CollapseOutputs {
        let stem = fixture_stem(&self.input);
        CollapseOutputs {
            collapsed: format!("{stem}_collapsed.vcf"),
            removed: format!("{stem}_removed.vcf"),
        }
    }
}

/// Multi-sample `collapse` with an explicit keep strategy.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StrategyScenarioConfig {
    pub input: String,
    pub strategy: KeepStrategy,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

impl StrategyScenarioConfig {
    pub fn id(&self) -> String {
        format!(
            "collapse_{}_{}",
            fixture_stem(&self.input),
            self.strategy.as_str()
        )
    }

    pub fn outputs(&self) -> CollapseOutputs {
        let stem = fixture_stem(&self.input);
        let keep = self.strategy.as_str();
        CollapseOutputs {
            collapsed: format!("{stem}_collapsed_{keep}.vcf"),
            removed: format!("{stem}_removed_{keep}.vcf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseOutputs {
    pub collapsed: String,
    pub removed: String,
}

impl CollapseOutputs {
    pub fn names(&self) -> [&str; 2] {
        [self.collapsed.as_str(), self.removed.as_str()]
    }
}

/// `anno <method>` checked by INFO field projections.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AnnotationScenarioConfig {
    pub annotator: Annotator,
    pub input: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Golden-relative known-good annotated VCF; defaults to the suite's baseline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

impl AnnotationScenarioConfig {
    pub fn id(&self) -> String {
        format!("anno_{}", self.annotator.method())
    }

    pub fn output_name(&self) -> String {
        format!("anno_{}.vcf", self.annotator.method())
    }

    pub fn effective_fields(&self) -> Vec<String> {
        if self.fields.is_empty() {
            self.annotator
                .default_fields()
                .iter()
                .map(|field| field.to_string())
                .collect()
        } else {
            self.fields.clone()
        }
    }
}

/// `vcf2df` export compared by table equality.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TableExportConfig {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

impl TableExportConfig {
    pub fn id(&self) -> String {
        format!("vcf2df_{}", fixture_stem(&self.output))
    }
}

/// `consistency` over several fixtures; stdout is the artifact.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConsistencyConfig {
    pub name: String,
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

impl ConsistencyConfig {
    pub fn id(&self) -> String {
        self.name.clone()
    }

    pub fn output_name(&self) -> String {
        format!("{}.txt", self.name)
    }
}

/// Every scenario family in the suite, in run order.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SuiteScenarios {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pairwise: Vec<PairwiseScenarioConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consistency: Vec<ConsistencyConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hap_collapse: Vec<HapCollapseConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multi_collapse: Vec<StrategyScenarioConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationScenarioConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableExportConfig>,
}

/// Family of a planned scenario, used by `list` and the report.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioFamily {
    Version,
    Pairwise,
    Consistency,
    HapCollapse,
    MultiCollapse,
    Annotation,
    Table,
}

impl ScenarioFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioFamily::Version => "version",
            ScenarioFamily::Pairwise => "pairwise",
            ScenarioFamily::Consistency => "consistency",
            ScenarioFamily::HapCollapse => "hap_collapse",
            ScenarioFamily::MultiCollapse => "multi_collapse",
            ScenarioFamily::Annotation => "annotation",
            ScenarioFamily::Table => "table",
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct PlannedScenario {
    pub id: String,
    pub family: ScenarioFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

impl SuiteScenarios {
    /// Test names the runner adds on top of the planned ids: one strategy
    /// comparison per collapse input that has at least two keep strategies.
    pub fn derived_test_names(&self) -> Vec<String> {
        let mut per_stem: BTreeMap<&str, usize> = BTreeMap::new();
        for config in &self.multi_collapse {
            *per_stem.entry(fixture_stem(&config.input)).or_default() += 1;
        }
        per_stem
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .map(|(stem, _)| keep_distinct_id(stem))
            .collect()
    }

    /// `extra_args` of every scenario, keyed by scenario id.
    pub fn extra_args(&self) -> Vec<(String, &[String])> {
        let mut all: Vec<(String, &[String])> = Vec::new();
        all.extend(self.pairwise.iter().map(|c| (c.id(), c.extra_args.as_slice())));
        all.extend(self.consistency.iter().map(|c| (c.id(), c.extra_args.as_slice())));
        all.extend(self.hap_collapse.iter().map(|c| (c.id(), c.extra_args.as_slice())));
        all.extend(self.multi_collapse.iter().map(|c| (c.id(), c.extra_args.as_slice())));
        all.extend(self.annotations.iter().map(|c| (c.id(), c.extra_args.as_slice())));
        all.extend(self.tables.iter().map(|c| (c.id(), c.extra_args.as_slice())));
        all
    }

    /// Flatten the suite into scenario ids in run order.
    pub fn planned(&self) -> Vec<PlannedScenario> {
        let mut planned = Vec::new();
        let mut push = |id: String, family, disabled: &Option<String>| {
            planned.push(PlannedScenario {
                id,
                family,
                disabled: disabled.clone(),
            })
        };
        if let Some(version) = &self.version {
            push("version".to_string(), ScenarioFamily::Version, &version.disabled);
        }
        for config in &self.pairwise {
            push(config.id(), ScenarioFamily::Pairwise, &config.disabled);
        }
        for config in &self.consistency {
            push(config.id(), ScenarioFamily::Consistency, &config.disabled);
        }
        for config in &self.hap_collapse {
            push(config.id(), ScenarioFamily::HapCollapse, &config.disabled);
        }
        for config in &self.multi_collapse {
            push(config.id(), ScenarioFamily::MultiCollapse, &config.disabled);
        }
        for config in &self.annotations {
            push(config.id(), ScenarioFamily::Annotation, &config.disabled);
        }
        for config in &self.tables {
            push(config.id(), ScenarioFamily::Table, &config.disabled);
        }
        planned
    }

    /// Collect every problem in the scenario records.
    pub fn validate(&self, errors: &mut Vec<String>) {
        if let Some(version) = &self.version {
            if version.expected.trim().is_empty() {
                errors.push("version.expected must be non-empty".to_string());
            }
            check_disabled("version", &version.disabled, errors);
        }
        for config in &self.pairwise {
            let label = format!("pairwise {}", config.id());
            for (side, id) in [("left", &config.left), ("right", &config.right)] {
                if id.trim().is_empty() {
                    errors.push(format!("{label}: {side} fixture id must be non-empty"));
                } else if validate_dir_name(id).is_err() {
                    errors.push(format!("{label}: {side} fixture id {id:?} is not a plain name"));
                }
            }
            if globset::Glob::new(&config.golden_pattern).is_err() {
                errors.push(format!(
                    "{label}: invalid golden_pattern {:?}",
                    config.golden_pattern
                ));
            }
            check_disabled(&label, &config.disabled, errors);
        }
        for config in &self.consistency {
            let label = format!("consistency {}", config.name);
            if validate_dir_name(&config.name).is_err() {
                errors.push(format!("{label}: name must be a plain file name"));
            }
            if config.inputs.len() < 2 {
                errors.push(format!("{label}: needs at least two inputs"));
            }
            for input in &config.inputs {
                check_fixture(&label, input, errors);
            }
            check_disabled(&label, &config.disabled, errors);
        }
        for config in &self.hap_collapse {
            let label = format!("hap_collapse {}", config.id());
            check_fixture(&label, &config.input, errors);
            check_repeat(&label, config.repeat, errors);
            check_disabled(&label, &config.disabled, errors);
        }
        for config in &self.multi_collapse {
            let label = format!("multi_collapse {}", config.id());
            check_fixture(&label, &config.input, errors);
            check_repeat(&label, config.repeat, errors);
            if config
                .extra_args
                .iter()
                .any(|arg| arg == "-k" || arg == "--keep" || arg.starts_with("--keep="))
            {
                errors.push(format!(
                    "{label}: keep strategy belongs in `strategy`, not extra_args"
                ));
            }
            check_disabled(&label, &config.disabled, errors);
        }
        for config in &self.annotations {
            let label = format!("annotation {}", config.id());
            check_fixture(&label, &config.input, errors);
            for field in config.effective_fields() {
                if let Err(err) = validate_field_name(&field) {
                    errors.push(format!("{label}: {err}"));
                }
            }
            if let Some(baseline) = &config.baseline {
                if let Err(err) = validate_relative_path(baseline) {
                    errors.push(format!("{label}: baseline {err}"));
                }
            }
            check_disabled(&label, &config.disabled, errors);
        }
        for config in &self.tables {
            let label = format!("table {}", config.id());
            check_fixture(&label, &config.input, errors);
            if validate_dir_name(&config.output).is_err() {
                errors.push(format!("{label}: output must be a plain file name"));
            } else if !(config.output.ends_with(".json") || config.output.ends_with(".jsonl")) {
                errors.push(format!("{label}: output must end in .json or .jsonl"));
            }
            check_disabled(&label, &config.disabled, errors);
        }
    }
}

/// Test comparing the outputs of every keep strategy run on one input.
pub fn keep_distinct_id(stem: &str) -> String {
    format!("collapse_{stem}_keep_distinct")
}

/// File name up to its first dot: `input2.vcf.gz` -> `input2`.
pub fn fixture_stem(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.split('.').next().unwrap_or(base)
}

fn check_fixture(label: &str, input: &str, errors: &mut Vec<String>) {
    if let Err(err) = validate_relative_path(input) {
        errors.push(format!("{label}: input {err}"));
    } else if fixture_stem(input).is_empty() {
        errors.push(format!("{label}: input {input:?} has no file stem"));
    }
}

fn check_repeat(label: &str, repeat: u32, errors: &mut Vec<String>) {
    if repeat == 0 {
        errors.push(format!("{label}: repeat must be >= 1"));
    }
}

fn check_disabled(label: &str, disabled: &Option<String>, errors: &mut Vec<String>) {
    if let Some(reason) = disabled {
        if reason.trim().is_empty() {
            errors.push(format!("{label}: disabled requires a reason"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_outputs_follow_golden_naming() {
        let pair = PairwiseScenarioConfig {
            left: "1".to_string(),
            right: "2".to_string(),
            extra_args: Vec::new(),
            golden_pattern: default_golden_pattern(),
            disabled: None,
        };
        assert_eq!(pair.id(), "bench12");

        let multi = StrategyScenarioConfig {
            input: "multi.vcf.gz".to_string(),
            strategy: KeepStrategy::Maxqual,
            repeat: 1,
            extra_args: Vec::new(),
            disabled: None,
        };
        assert_eq!(multi.id(), "collapse_multi_maxqual");
        assert_eq!(
            multi.outputs().names(),
            ["multi_collapsed_maxqual.vcf", "multi_removed_maxqual.vcf"]
        );

        let hap = HapCollapseConfig {
            input: "phased/input_hap.vcf.gz".to_string(),
            repeat: 1,
            extra_args: Vec::new(),
            disabled: None,
        };
        assert_eq!(hap.id(), "collapse_input_hap");
        assert_eq!(hap.outputs().collapsed, "input_hap_collapsed.vcf");
    }

    #[test]
    fn keep_strategy_round_trips_through_names() {
        for strategy in [KeepStrategy::First, KeepStrategy::Common, KeepStrategy::Maxqual] {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{}\"", strategy.as_str()));
        }
        assert!(serde_json::from_str::<KeepStrategy>("\"last\"").is_err());
    }

    #[test]
    fn annotation_fields_default_per_annotator() {
        let config: AnnotationScenarioConfig =
            serde_json::from_str(r#"{"annotator":"numneigh","input":"input1.vcf.gz"}"#).unwrap();
        assert_eq!(config.effective_fields(), vec!["NumNeighbors", "NeighId"]);
        assert_eq!(config.output_name(), "anno_numneigh.vcf");
    }

    #[test]
    fn validate_collects_every_problem() {
        let scenarios: SuiteScenarios = serde_json::from_str(
            r#"{
                "pairwise": [{"left": "", "right": "2", "golden_pattern": "[bad"}],
                "multi_collapse": [{"input": "multi.vcf.gz", "strategy": "first", "repeat": 0, "extra_args": ["--keep", "common"]}],
                "annotations": [{"annotator": "gcpct", "input": "../x.vcf", "fields": ["1BAD"]}],
                "tables": [{"input": "input1.vcf.gz", "output": "df.jl", "disabled": " "}]
            }"#,
        )
        .unwrap();
        let mut errors = Vec::new();
        scenarios.validate(&mut errors);
        let text = errors.join("\n");
        assert!(text.contains("left fixture id must be non-empty"), "{text}");
        assert!(text.contains("invalid golden_pattern"), "{text}");
        assert!(text.contains("repeat must be >= 1"), "{text}");
        assert!(text.contains("keep strategy belongs in `strategy`"), "{text}");
        assert!(text.contains("invalid INFO field name"), "{text}");
        assert!(text.contains("input path must be relative"), "{text}");
        assert!(text.contains("must end in .json or .jsonl"), "{text}");
        assert!(text.contains("disabled requires a reason"), "{text}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<HapCollapseConfig>(r#"{"input":"a.vcf","keep":"first"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn strategy_comparison_is_reserved_per_input_with_two_strategies() {
        let scenarios: SuiteScenarios = serde_json::from_str(
            r#"{
                "multi_collapse": [
                    {"input": "multi.vcf.gz", "strategy": "first"},
                    {"input": "multi.vcf.gz", "strategy": "maxqual"},
                    {"input": "single.vcf.gz", "strategy": "common"}
                ],
                "annotations": [{"annotator": "gcpct", "input": "input1.vcf.gz", "extra_args": ["-r", "{reference}"]}]
            }"#,
        )
        .unwrap();
        assert_eq!(
            scenarios.derived_test_names(),
            vec!["collapse_multi_keep_distinct"]
        );
        let args = scenarios.extra_args();
        let anno = args.iter().find(|(id, _)| id == "anno_gcpct").unwrap();
        assert_eq!(anno.1, ["-r", "{reference}"]);
    }

    #[test]
    fn planned_lists_families_in_run_order() {
        let scenarios: SuiteScenarios = serde_json::from_str(
            r#"{
                "version": {"expected": "v4"},
                "tables": [{"input": "input1.vcf.gz", "output": "df.json", "disabled": "pandas missing"}],
                "pairwise": [{"left": "1", "right": "3"}]
            }"#,
        )
        .unwrap();
        let planned = scenarios.planned();
        let ids: Vec<&str> = planned.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["version", "bench13", "vcf2df_df"]);
        assert_eq!(planned[2].disabled.as_deref(), Some("pandas missing"));
    }
}
