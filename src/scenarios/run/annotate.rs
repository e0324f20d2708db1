use super::{scenario_finished, scenario_started, RunContext};
use crate::query::projection_digest;
use crate::scenarios::types::AnnotationScenarioConfig;
use anyhow::Result;

/// Run one annotator and compare each of its INFO fields, as a sorted
/// `CHROM POS FIELD` projection, against the known-good annotated VCF.
pub(super) fn run_annotation(
    ctx: &mut RunContext<'_>,
    config: &AnnotationScenarioConfig,
) -> Result<()> {
    let id = config.id();
    if !ctx.admit(&id, &config.disabled)? {
        return Ok(());
    }
    let started = scenario_started(&id);
    let dirs = ctx.layout.scenario(&id, "")?;
    dirs.prepare()?;
    let produced = dirs.produced(&config.output_name());
    let baseline = ctx.layout.golden(
        config
            .baseline
            .as_deref()
            .unwrap_or(&ctx.suite.config.annotation_baseline),
    );

    let mut args = vec![
        "anno".to_string(),
        config.annotator.method().to_string(),
        "-i".to_string(),
        ctx.fixture(&config.input),
        "-o".to_string(),
        produced.display().to_string(),
    ];
    args.extend(ctx.expand_args(&config.extra_args, &dirs.scratch)?);
    ctx.invoke_tool(&id, &args)?;

    for field in config.effective_fields() {
        ctx.engine.run(&format!("{id}:{field}"))?;
        let fields = [field];
        let expected = projection_digest(ctx.query.as_ref(), &baseline, &fields);
        let actual = projection_digest(ctx.query.as_ref(), &produced, &fields);
        let (passed, detail) = match (actual, expected) {
            (Ok(actual), Ok(expected)) if actual == expected => {
                (true, format!("projection sha256 {actual}"))
            }
            (Ok(actual), Ok(expected)) => (
                false,
                format!("projection mismatch: produced {actual} != golden {expected}"),
            ),
            (Err(err), _) => (false, format!("produced: {err:#}")),
            (_, Err(err)) => (false, format!("golden: {err:#}")),
        };
        ctx.engine.record(passed, detail)?;
    }
    scenario_finished(&id, started);
    Ok(())
}
