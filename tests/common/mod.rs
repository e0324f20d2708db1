//! Shared test infrastructure for integration tests.
//!
//! Each test gets a throwaway suite directory holding a POSIX `sh` stand-in
//! for the toolkit, an empty fixtures root, and whatever golden answers the
//! test writes.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const VCF_HEADER: &str = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

/// Behaves like the toolkit's sub-commands closely enough to exercise every
/// scenario family. `FAKE_*` variables (set through the suite's `tool.env`)
/// inject defects.
const FAKE_TOOL: &str = r##"#!/bin/sh
cmd="$1"
shift
last=""
for arg in "$@"; do last="$arg"; done
opt() {
  flag="$1"
  shift
  while [ $# -gt 0 ]; do
    if [ "$1" = "$flag" ]; then
      echo "$2"
      return
    fi
    shift
  done
}
case "$cmd" in
  version)
    echo "Truvari v4.2.2"
    ;;
  bench)
    out=$(opt -o "$@")
    if [ -e "$out" ]; then
      echo "output directory exists: $out" >&2
      exit 1
    fi
    if [ -n "$FAKE_BENCH_EXIT" ]; then
      echo "bench exploded" >&2
      exit "$FAKE_BENCH_EXIT"
    fi
    mkdir -p "$out"
    base=$(basename "$(opt -b "$@")")
    comp=$(basename "$(opt -c "$@")")
    printf 'tp %s %s\n' "$base" "$comp" > "$out/tp-base.vcf"
    printf 'fn %s\n' "$base" > "$out/fn.vcf"
    printf 'log %s\n' "$$" > "$out/log.txt"
    ;;
  collapse)
    out=$(opt -o "$@")
    removed=$(opt -c "$@")
    keep=$(opt --keep "$@")
    if [ -n "$FAKE_IGNORE_KEEP" ]; then keep=""; fi
    salt=""
    if [ -n "$FAKE_UNSTABLE" ]; then salt=" $$"; fi
    printf 'collapsed %s%s\n' "$keep" "$salt" > "$out"
    printf 'removed %s\n' "$keep" > "$removed"
    ;;
  anno)
    out=$(opt -o "$@")
    printf '##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n' > "$out"
    printf 'chr1\t20\t.\tG\tGC\t.\tPASS\tGCPCT=55;RUN=%s\n' "$$" >> "$out"
    printf 'chr1\t10\t.\tA\tAT\t.\tPASS\tGCPCT=40;RUN=%s\n' "$$" >> "$out"
    ;;
  consistency)
    echo "#Files $#"
    for arg in "$@"; do basename "$arg"; done
    ;;
  vcf2df)
    printf '{"b": 0.5, "a": 1}\n{"b": 0.25, "a": 2}\n' > "$last"
    ;;
  *)
    echo "unknown command $cmd" >&2
    exit 2
    ;;
esac
"##;

/// `tool` override running the stand-in with extra environment. The script
/// is run through `sh` so a freshly written file is never exec'd directly.
pub fn tool_with_env(env: Value) -> Value {
    json!({"tool": {"wrapper": ["sh"], "program": "bin/fake-truvari", "env": env}})
}

/// A suite directory: `bin/fake-truvari`, `fixtures/`, `answer_key/`, and
/// `scratch/` once a run has happened.
pub struct SuiteDir {
    dir: TempDir,
}

impl SuiteDir {
    pub fn new() -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("fixtures"))?;
        fs::create_dir_all(dir.path().join("answer_key"))?;
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin)?;
        let tool = bin.join("fake-truvari");
        fs::write(&tool, FAKE_TOOL)?;
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755))?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn scratch(&self, rel: &str) -> PathBuf {
        self.root().join("scratch").join(rel)
    }

    /// Write a golden answer at `rel` under `answer_key/`.
    pub fn golden(&self, rel: &str, contents: &str) {
        let path = self.root().join("answer_key").join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create golden dir");
        }
        fs::write(&path, contents).expect("write golden file");
    }

    /// Goldens matching what the fake tool produces for `bench` of `left` vs `right`.
    pub fn bench_golden(&self, left: &str, right: &str) {
        let dir = format!("bench{left}{right}");
        self.golden(
            &format!("{dir}/tp-base.vcf"),
            &format!("tp input{left}.vcf.gz input{right}.vcf.gz\n"),
        );
        self.golden(&format!("{dir}/fn.vcf"), &format!("fn input{left}.vcf.gz\n"));
    }

    /// Write `suite.json` with the given scenarios and extra top-level fields.
    pub fn write_suite(&self, scenarios: Value, extra: Value) -> PathBuf {
        let mut suite = json!({
            "schema_version": 1,
            "tool": tool_with_env(json!({}))["tool"],
            "roots": {"fixtures": "fixtures", "golden": "answer_key", "scratch": "scratch"},
            "reference": "reference.fa",
            "timeout_seconds": 30,
            "annotation_baseline": "anno_answers.vcf",
            "scenarios": scenarios,
        });
        if let (Some(target), Value::Object(extra)) = (suite.as_object_mut(), extra) {
            for (key, value) in extra {
                target.insert(key, value);
            }
        }
        let path = self.root().join("suite.json");
        fs::write(&path, serde_json::to_string_pretty(&suite).expect("serialize suite"))
            .expect("write suite");
        path
    }

    pub fn svconf(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_svconf"))
            .args(args)
            .current_dir(self.root())
            .env_remove("RUST_LOG")
            .output()
            .expect("spawn svconf")
    }

    pub fn run_suite(&self, extra_args: &[&str]) -> RunResult {
        let mut args = vec!["run", "--suite", "suite.json"];
        args.extend_from_slice(extra_args);
        RunResult::from(self.svconf(&args))
    }
}

pub struct RunResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for RunResult {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl RunResult {
    pub fn has_line(&self, line: &str) -> bool {
        self.stdout.lines().any(|candidate| candidate == line)
    }

    pub fn assert_line(&self, line: &str) {
        assert!(
            self.has_line(line),
            "expected line {line:?} in stdout:\n{}\nstderr:\n{}",
            self.stdout,
            self.stderr
        );
    }
}
