use super::{scenario_finished, scenario_started, RunContext};
use crate::scenarios::types::TableExportConfig;
use crate::table;
use anyhow::Result;

/// Table exports are compared structurally: equal tables need not be
/// byte-identical once serialized.
pub(super) fn run_table_export(ctx: &mut RunContext<'_>, config: &TableExportConfig) -> Result<()> {
    let id = config.id();
    if !ctx.admit(&id, &config.disabled)? {
        return Ok(());
    }
    let started = scenario_started(&id);
    let dirs = ctx.layout.scenario(&id, "")?;
    dirs.prepare()?;
    let produced = dirs.produced(&config.output);

    let mut args = vec!["vcf2df".to_string()];
    args.extend(ctx.expand_args(&config.extra_args, &dirs.scratch)?);
    args.push(ctx.fixture(&config.input));
    args.push(produced.display().to_string());
    ctx.invoke_tool(&id, &args)?;

    ctx.engine.run(&format!("{id}:{}", config.output))?;
    let (passed, detail) = match table::compare_files(&produced, &dirs.golden_file(&config.output))
    {
        Ok(comparison) => (comparison.is_equal(), comparison.to_string()),
        Err(err) => (false, format!("{err:#}")),
    };
    ctx.engine.record(passed, detail)?;
    scenario_finished(&id, started);
    Ok(())
}
