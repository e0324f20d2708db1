//! Content digests for flat output files.
//!
//! Comparison is purely on bytes: two files with different names or
//! locations but identical content always match.
use anyhow::{Context, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const READ_CHUNK: usize = 64 * 1024;

/// SHA-256 of a file or byte projection, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn digest(path: &Path) -> Result<Digest> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let read = reader
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(Digest(format!("{:x}", hasher.finalize())))
}

pub fn digest_bytes(bytes: &[u8]) -> Digest {
    Digest(crate::util::sha256_hex(bytes))
}

pub fn compare(path_a: &Path, path_b: &Path) -> Result<bool> {
    Ok(digest(path_a)? == digest(path_b)?)
}

/// Outcome of comparing a produced file with its golden counterpart.
#[derive(Debug, Clone)]
pub struct FileComparison {
    pub produced: PathBuf,
    pub golden: PathBuf,
    pub passed: bool,
    pub detail: String,
}

/// Compare two files without ever failing: unreadable sides become a failed
/// comparison whose detail names the path.
pub fn compare_files(produced: &Path, golden: &Path) -> FileComparison {
    let (passed, detail) = if !produced.is_file() {
        (
            false,
            format!("produced file missing: {}", produced.display()),
        )
    } else if !golden.is_file() {
        (false, format!("golden file missing: {}", golden.display()))
    } else {
        match compare(produced, golden) {
            Ok(true) => (true, format!("content matches {}", golden.display())),
            Ok(false) => (
                false,
                format!(
                    "digest mismatch: {} differs from {}",
                    produced.display(),
                    golden.display()
                ),
            ),
            Err(err) => (false, format!("{err:#}")),
        }
    };
    tracing::debug!(
        produced = %produced.display(),
        golden = %golden.display(),
        passed,
        "checksum comparison"
    );
    FileComparison {
        produced: produced.to_path_buf(),
        golden: golden.to_path_buf(),
        passed,
        detail,
    }
}
