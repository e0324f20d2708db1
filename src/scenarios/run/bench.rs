use super::{scenario_finished, scenario_started, RunContext};
use crate::scenarios::types::{ConsistencyConfig, PairwiseScenarioConfig, VersionConfig};
use anyhow::{Context, Result};
use std::fs;

const VERSION_TEST: &str = "version";

pub(super) fn run_version(ctx: &mut RunContext<'_>, config: &VersionConfig) -> Result<()> {
    if !ctx.admit(VERSION_TEST, &config.disabled)? {
        return Ok(());
    }
    let started = scenario_started(VERSION_TEST);
    ctx.invoke_tool(VERSION_TEST, &["version".to_string()])?;
    ctx.engine.assert_in_stdout(&config.expected)?;
    scenario_finished(VERSION_TEST, started);
    Ok(())
}

/// `bench` refuses an existing output directory, so the scratch dir is
/// cleared and left for the tool to create.
pub(super) fn run_pairwise(ctx: &mut RunContext<'_>, config: &PairwiseScenarioConfig) -> Result<()> {
    let id = config.id();
    if !ctx.admit(&id, &config.disabled)? {
        return Ok(());
    }
    let started = scenario_started(&id);
    let dirs = ctx.layout.scenario(&id, &id)?;
    dirs.clear()?;

    let mut args = vec![
        "bench".to_string(),
        "-b".to_string(),
        ctx.fixture(&ctx.suite.pair_fixture(&config.left)),
        "-c".to_string(),
        ctx.fixture(&ctx.suite.pair_fixture(&config.right)),
        "-f".to_string(),
        ctx.reference()?,
        "-o".to_string(),
        dirs.scratch.display().to_string(),
    ];
    args.extend(ctx.expand_args(&config.extra_args, &dirs.scratch)?);
    ctx.invoke_tool(&id, &args)?;
    ctx.compare_golden_set(&id, &dirs, &config.golden_pattern)?;
    scenario_finished(&id, started);
    Ok(())
}

/// `consistency` reports on stdout; the captured text is saved into scratch
/// and compared like any produced file.
pub(super) fn run_consistency(ctx: &mut RunContext<'_>, config: &ConsistencyConfig) -> Result<()> {
    let id = config.id();
    if !ctx.admit(&id, &config.disabled)? {
        return Ok(());
    }
    let started = scenario_started(&id);
    let dirs = ctx.layout.scenario(&id, "")?;
    dirs.prepare()?;

    let mut args = vec!["consistency".to_string()];
    args.extend(ctx.expand_args(&config.extra_args, &dirs.scratch)?);
    args.extend(config.inputs.iter().map(|input| ctx.fixture(input)));
    let output = ctx.invoke_tool(&id, &args)?;

    let name = config.output_name();
    let produced = dirs.produced(&name);
    fs::write(&produced, &output.stdout)
        .with_context(|| format!("write {}", produced.display()))?;
    ctx.compare_file(&format!("{id}:{name}"), &produced, &dirs.golden_file(&name))?;
    scenario_finished(&id, started);
    Ok(())
}
