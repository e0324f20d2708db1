use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::io::Write;
use tracing_subscriber::EnvFilter;

mod assertions;
mod checksum;
mod cli;
mod config;
mod invoke;
mod layout;
mod query;
mod report;
mod scenarios;
mod table;
mod templates;
mod util;

use cli::{Command, DigestArgs, InitArgs, ListArgs, RootArgs, RunArgs, TableDiffArgs};
use report::RunReport;
use scenarios::RunOptions;

/// Exit status for a suite that could not run at all.
const EXIT_INFRA: i32 = 2;

fn main() {
    let args = RootArgs::parse();
    init_logging(args.verbose);
    let code = match dispatch(args.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_INFRA
        }
    };
    let _ = std::io::stdout().flush();
    std::process::exit(code);
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Run(args) => cmd_run(args),
        Command::List(args) => cmd_list(args),
        Command::Init(args) => cmd_init(args),
        Command::Digest(args) => cmd_digest(args),
        Command::TableDiff(args) => cmd_table_diff(args),
    }
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let suite = config::load_suite(&args.suite)?;
    let options = RunOptions {
        only: args.only.clone(),
    };
    let engine = scenarios::run_suite(&suite, &options)?;
    if engine.cases().is_empty() {
        if let Some(pattern) = &options.only {
            return Err(anyhow!("--only {pattern:?} matched no scenarios"));
        }
    }
    print!("{}", engine.render_summary());

    let layout = suite.layout();
    let report_path = args.report.unwrap_or_else(|| layout.report_path());
    report::write_report(&report_path, &RunReport::new(&args.suite, &engine))?;
    report::run_post_steps(
        &suite.config.post_run,
        layout.scratch_root(),
        suite.timeout(),
    );
    Ok(engine.exit_code())
}

fn cmd_list(args: ListArgs) -> Result<i32> {
    let suite = config::load_suite(&args.suite)?;
    let planned = suite.config.scenarios.planned();
    if args.json {
        let text = serde_json::to_string_pretty(&planned).context("serialize scenario list")?;
        println!("{text}");
        return Ok(0);
    }
    for scenario in &planned {
        match &scenario.disabled {
            Some(reason) => println!(
                "{}\t{}\tdisabled: {reason}",
                scenario.id,
                scenario.family.as_str()
            ),
            None => println!("{}\t{}", scenario.id, scenario.family.as_str()),
        }
    }
    Ok(0)
}

fn cmd_init(args: InitArgs) -> Result<i32> {
    if args.suite.exists() && !args.force {
        return Err(anyhow!(
            "suite already exists: {} (use --force to overwrite)",
            args.suite.display()
        ));
    }
    if let Some(parent) = args.suite.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    let text = config::suite_stub()?;
    fs::write(&args.suite, text)
        .with_context(|| format!("write suite {}", args.suite.display()))?;
    println!("wrote {}", args.suite.display());
    Ok(0)
}

fn cmd_digest(args: DigestArgs) -> Result<i32> {
    for path in &args.files {
        let digest = checksum::digest(path)?;
        println!("{digest}  {}", path.display());
    }
    Ok(0)
}

fn cmd_table_diff(args: TableDiffArgs) -> Result<i32> {
    let comparison = table::compare_files(&args.produced, &args.golden)?;
    println!("{comparison}");
    Ok(if comparison.is_equal() { 0 } else { 1 })
}
