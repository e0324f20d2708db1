use super::{scenario_finished, scenario_started, RunContext};
use crate::checksum::digest;
use crate::layout::ScenarioDirs;
use crate::scenarios::types::{
    fixture_stem, keep_distinct_id, CollapseOutputs, HapCollapseConfig, KeepStrategy,
    StrategyScenarioConfig,
};
use anyhow::Result;
use std::collections::BTreeMap;

/// Digests of one run's outputs, in `CollapseOutputs::names` order.
type OutputDigests = Vec<Option<String>>;

struct CollapseRun<'c> {
    id: String,
    input: &'c str,
    outputs: CollapseOutputs,
    tool_args: Vec<String>,
    repeat: u32,
}

pub(super) fn run_hap_collapse(ctx: &mut RunContext<'_>, config: &HapCollapseConfig) -> Result<()> {
    let id = config.id();
    if !ctx.admit(&id, &config.disabled)? {
        return Ok(());
    }
    let mut tool_args = vec!["--hap".to_string()];
    tool_args.extend(config.extra_args.iter().cloned());
    run_collapse(
        ctx,
        CollapseRun {
            id,
            input: &config.input,
            outputs: config.outputs(),
            tool_args,
            repeat: config.repeat,
        },
    )?;
    Ok(())
}

/// Run each keep strategy as its own scenario, then check that strategies
/// run on the same input did not all produce the same answer.
pub(super) fn run_strategies(
    ctx: &mut RunContext<'_>,
    configs: &[StrategyScenarioConfig],
) -> Result<()> {
    let mut by_input: BTreeMap<String, Vec<(KeepStrategy, OutputDigests)>> = BTreeMap::new();
    for config in configs {
        let id = config.id();
        if !ctx.admit(&id, &config.disabled)? {
            continue;
        }
        let mut tool_args = vec!["--keep".to_string(), config.strategy.as_str().to_string()];
        tool_args.extend(config.extra_args.iter().cloned());
        let digests = run_collapse(
            ctx,
            CollapseRun {
                id,
                input: &config.input,
                outputs: config.outputs(),
                tool_args,
                repeat: config.repeat,
            },
        )?;
        by_input
            .entry(fixture_stem(&config.input).to_string())
            .or_default()
            .push((config.strategy, digests));
    }
    for (stem, runs) in by_input {
        if runs.len() >= 2 {
            check_keep_distinct(ctx, &stem, &runs)?;
        }
    }
    Ok(())
}

fn run_collapse(ctx: &mut RunContext<'_>, run: CollapseRun<'_>) -> Result<OutputDigests> {
    let started = scenario_started(&run.id);
    let dirs = ctx.layout.scenario(&run.id, "")?;
    let args = collapse_args(ctx, &run, &dirs)?;

    dirs.prepare()?;
    ctx.invoke_tool(&run.id, &args)?;
    for name in run.outputs.names() {
        ctx.compare_file(
            &format!("{}:{name}", run.id),
            &dirs.produced(name),
            &dirs.golden_file(name),
        )?;
    }
    let first = output_digests(&dirs, &run.outputs);

    for round in 2..=run.repeat {
        let name = format!("{}:rerun{round}", run.id);
        dirs.prepare()?;
        ctx.invoke_tool(&name, &args)?;
        let again = output_digests(&dirs, &run.outputs);
        ctx.engine.assert_equal(
            by_name(&run.outputs, &again),
            by_name(&run.outputs, &first),
        )?;
    }
    scenario_finished(&run.id, started);
    Ok(first)
}

fn collapse_args(
    ctx: &RunContext<'_>,
    run: &CollapseRun<'_>,
    dirs: &ScenarioDirs,
) -> Result<Vec<String>> {
    let mut args = vec![
        "collapse".to_string(),
        "-i".to_string(),
        ctx.fixture(run.input),
        "-o".to_string(),
        dirs.produced(&run.outputs.collapsed).display().to_string(),
        "-c".to_string(),
        dirs.produced(&run.outputs.removed).display().to_string(),
        "-f".to_string(),
        ctx.reference()?,
    ];
    args.extend(ctx.expand_args(&run.tool_args, &dirs.scratch)?);
    Ok(args)
}

fn output_digests(dirs: &ScenarioDirs, outputs: &CollapseOutputs) -> OutputDigests {
    outputs
        .names()
        .into_iter()
        .map(|name| {
            digest(&dirs.produced(name))
                .ok()
                .map(|digest| digest.to_string())
        })
        .collect()
}

fn by_name<'a>(
    outputs: &'a CollapseOutputs,
    digests: &'a OutputDigests,
) -> BTreeMap<&'a str, &'a Option<String>> {
    outputs.names().into_iter().zip(digests).collect()
}

fn check_keep_distinct(
    ctx: &mut RunContext<'_>,
    stem: &str,
    runs: &[(KeepStrategy, OutputDigests)],
) -> Result<()> {
    ctx.engine.run(&keep_distinct_id(stem))?;
    let mut problems = Vec::new();
    for (idx, (left, left_digests)) in runs.iter().enumerate() {
        if left_digests.iter().any(Option::is_none) {
            problems.push(format!("{} produced no comparable outputs", left.as_str()));
            continue;
        }
        for (right, right_digests) in &runs[idx + 1..] {
            if left_digests == right_digests {
                problems.push(format!(
                    "{} and {} produced identical outputs",
                    left.as_str(),
                    right.as_str()
                ));
            }
        }
    }
    let strategies: Vec<&str> = runs.iter().map(|(strategy, _)| strategy.as_str()).collect();
    let detail = if problems.is_empty() {
        format!("distinct outputs for {}", strategies.join(", "))
    } else {
        problems.join("; ")
    };
    ctx.engine.record(problems.is_empty(), detail)?;
    Ok(())
}
