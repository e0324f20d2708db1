//! Golden answer discovery.
use anyhow::{anyhow, Context, Result};
use globset::Glob;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files directly under `dir` whose basename matches `pattern`, sorted.
///
/// A missing directory is an `Err`; an empty result is returned as-is and the
/// caller decides that comparing nothing is a failure.
pub fn discover_golden(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("golden directory not found: {}", dir.display()));
    }
    let matcher = Glob::new(pattern)
        .with_context(|| format!("compile golden pattern {pattern:?}"))?
        .compile_matcher();
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    tracing::debug!(dir = %dir.display(), pattern, count = found.len(), "golden files");
    Ok(found)
}
