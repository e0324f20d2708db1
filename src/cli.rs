//! CLI argument parsing for the conformance harness.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "svconf",
    version,
    about = "Golden-answer conformance harness for structural-variant tools",
    after_help = "Exit status:\n  0  every test passed (skips allowed)\n  1  at least one test failed\n  2  the suite could not run (bad suite, missing tool or roots)\n\nExamples:\n  svconf init --suite repo_utils/suite.json\n  svconf list --suite repo_utils/suite.json\n  svconf run --suite repo_utils/suite.json --only 'bench*'\n  svconf digest test_results/bench12/tp-base.vcf\n  svconf table-diff test_results/vcf2df_df/df.json repo_utils/answer_key/df.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    List(ListArgs),
    Init(InitArgs),
    Digest(DigestArgs),
    TableDiff(TableDiffArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Run the suite and compare every output with its golden answer")]
pub struct RunArgs {
    /// Suite file (JSON)
    #[arg(long, value_name = "FILE")]
    pub suite: PathBuf,

    /// Only run scenarios whose id matches this glob
    #[arg(long, value_name = "GLOB")]
    pub only: Option<String>,

    /// Where to write the JSON report (default: <scratch>/report.json)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Validate a suite and list its scenarios without running them")]
pub struct ListArgs {
    /// Suite file (JSON)
    #[arg(long, value_name = "FILE")]
    pub suite: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Write the default suite file")]
pub struct InitArgs {
    /// Destination for the suite file
    #[arg(long, value_name = "FILE")]
    pub suite: PathBuf,

    /// Overwrite an existing suite file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Print SHA-256 content digests")]
pub struct DigestArgs {
    /// Files to hash
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Compare two exported tables structurally")]
pub struct TableDiffArgs {
    /// Produced table (.json split orientation or .jsonl records)
    #[arg(value_name = "PRODUCED")]
    pub produced: PathBuf,

    /// Golden table
    #[arg(value_name = "GOLDEN")]
    pub golden: PathBuf,
}
