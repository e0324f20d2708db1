//! Typed paths into a suite layout.
//!
//! Every scenario gets a golden directory (read-only) and its own scratch
//! directory under the scratch root. The scratch directory is wiped and
//! recreated right before the scenario runs and left in place afterwards.
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const REPORT_FILE: &str = "report.json";

#[derive(Debug, Clone)]
pub struct SuiteLayout {
    fixtures: PathBuf,
    golden: PathBuf,
    scratch: PathBuf,
}

impl SuiteLayout {
    pub fn new(fixtures: PathBuf, golden: PathBuf, scratch: PathBuf) -> Self {
        Self {
            fixtures,
            golden,
            scratch,
        }
    }

    pub fn fixtures_dir(&self) -> &Path {
        &self.fixtures
    }

    pub fn golden_dir(&self) -> &Path {
        &self.golden
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch
    }

    pub fn fixture(&self, rel: &str) -> PathBuf {
        self.fixtures.join(rel)
    }

    pub fn golden(&self, rel: &str) -> PathBuf {
        self.golden.join(rel)
    }

    pub fn report_path(&self) -> PathBuf {
        self.scratch.join(REPORT_FILE)
    }

    /// Map a scenario to its golden directory (`golden_rel` under the golden
    /// root, `""` for the root itself) and its private scratch directory.
    pub fn scenario(&self, scratch_name: &str, golden_rel: &str) -> Result<ScenarioDirs> {
        validate_dir_name(scratch_name)?;
        if !golden_rel.is_empty() {
            validate_relative_path(golden_rel)?;
        }
        Ok(ScenarioDirs {
            golden: if golden_rel.is_empty() {
                self.golden.clone()
            } else {
                self.golden.join(golden_rel)
            },
            scratch: self.scratch.join(scratch_name),
        })
    }

    /// Fail early when the read-only inputs are missing or the scratch root
    /// cannot be created.
    pub fn check(&self) -> Result<()> {
        for (label, dir) in [("fixtures", &self.fixtures), ("golden", &self.golden)] {
            if !dir.is_dir() {
                return Err(anyhow!("{label} directory not found: {}", dir.display()));
            }
        }
        fs::create_dir_all(&self.scratch)
            .with_context(|| format!("create scratch root {}", self.scratch.display()))?;
        let marker = self.scratch.join(".write-check");
        fs::write(&marker, b"").with_context(|| {
            format!("scratch root is not writable: {}", self.scratch.display())
        })?;
        fs::remove_file(&marker).with_context(|| format!("remove {}", marker.display()))?;
        Ok(())
    }
}

/// Golden and scratch directories for one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioDirs {
    pub golden: PathBuf,
    pub scratch: PathBuf,
}

impl ScenarioDirs {
    /// Destroy any previous contents of the scratch directory and recreate it.
    pub fn prepare(&self) -> Result<()> {
        if self.scratch.exists() {
            fs::remove_dir_all(&self.scratch)
                .with_context(|| format!("wipe {}", self.scratch.display()))?;
        }
        fs::create_dir_all(&self.scratch)
            .with_context(|| format!("create {}", self.scratch.display()))?;
        tracing::debug!(scratch = %self.scratch.display(), "scratch prepared");
        Ok(())
    }

    /// Like [`ScenarioDirs::prepare`] but leaves the scratch directory absent,
    /// for tools that refuse to write into an existing output directory.
    pub fn clear(&self) -> Result<()> {
        if self.scratch.exists() {
            fs::remove_dir_all(&self.scratch)
                .with_context(|| format!("wipe {}", self.scratch.display()))?;
        }
        if let Some(parent) = self.scratch.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        tracing::debug!(scratch = %self.scratch.display(), "scratch cleared");
        Ok(())
    }

    pub fn produced(&self, name: &str) -> PathBuf {
        self.scratch.join(name)
    }

    pub fn golden_file(&self, name: &str) -> PathBuf {
        self.golden.join(name)
    }
}

pub fn validate_dir_name(name: &str) -> Result<()> {
    let re = Regex::new(r"^[A-Za-z0-9_.-]+$")?;
    if !re.is_match(name) || name == "." || name == ".." {
        return Err(anyhow!("invalid scratch directory name {name:?}"));
    }
    Ok(())
}

/// Reject absolute paths and parent traversal in suite-relative names.
pub fn validate_relative_path(rel: &str) -> Result<()> {
    let path = Path::new(rel);
    if rel.trim().is_empty() {
        return Err(anyhow!("path must be non-empty"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(anyhow!("path must be relative without '..': {rel:?}")),
        }
    }
    Ok(())
}

/// True when `inner` is `outer` or lies beneath it, compared lexically.
pub fn path_within(inner: &Path, outer: &Path) -> bool {
    let normalize = |path: &Path| -> Vec<String> {
        let mut parts: Vec<String> = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    parts.pop();
                }
                other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
            }
        }
        parts
    };
    let inner = normalize(inner);
    let outer = normalize(outer);
    inner.len() >= outer.len() && inner[..outer.len()] == outer[..]
}
