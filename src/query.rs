//! INFO field projections of VCF files.
//!
//! A projection is one `CHROM\tPOS\tFIELD...` row per record, sorted and
//! newline-joined so it can be hashed independently of record order and of
//! every INFO field that was not asked for.
use crate::checksum::{digest_bytes, Digest};
use crate::invoke::{invoke, Invocation};
use anyhow::{anyhow, Context, Result};
use flate2::read::MultiGzDecoder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::Duration;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MISSING: &str = ".";

/// How INFO fields are pulled out of a VCF.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldQueryBackend {
    #[default]
    Native,
    Bcftools,
}

pub trait FieldQuery {
    /// Unsorted projection rows for `fields`, one per VCF record.
    fn extract(&self, vcf: &Path, fields: &[String]) -> Result<Vec<String>>;
}

/// Reads plain or bgzip-compressed VCF text directly.
#[derive(Debug, Default)]
pub struct NativeQuery;

impl FieldQuery for NativeQuery {
    fn extract(&self, vcf: &Path, fields: &[String]) -> Result<Vec<String>> {
        let reader = open_vcf(vcf)?;
        let mut rows = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("read {}", vcf.display()))?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 8 {
                return Err(anyhow!(
                    "{}:{}: expected at least 8 columns, found {}",
                    vcf.display(),
                    line_no + 1,
                    cols.len()
                ));
            }
            let mut row = format!("{}\t{}", cols[0], cols[1]);
            for field in fields {
                row.push('\t');
                row.push_str(info_value(cols[7], field));
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Shells out to `bcftools query` with a literal format argument.
#[derive(Debug)]
pub struct BcftoolsQuery {
    pub program: String,
    pub timeout: Option<Duration>,
}

impl FieldQuery for BcftoolsQuery {
    fn extract(&self, vcf: &Path, fields: &[String]) -> Result<Vec<String>> {
        let invocation = Invocation::new(vec![
            self.program.clone(),
            "query".to_string(),
            "-f".to_string(),
            bcftools_format(fields),
            vcf.display().to_string(),
        ])
        .timeout(self.timeout);
        let output = invoke(&invocation)?;
        if !output.success() {
            return Err(anyhow!(
                "{} failed ({}): {}",
                invocation.command_line(),
                output.status_string(),
                output.stderr_text().trim()
            ));
        }
        Ok(output
            .stdout_text()
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

pub fn bcftools_format(fields: &[String]) -> String {
    let mut format = String::from("%CHROM\t%POS");
    for field in fields {
        format.push_str("\t%INFO/");
        format.push_str(field);
    }
    format.push('\n');
    format
}

pub fn query_for(backend: FieldQueryBackend, timeout: Option<Duration>) -> Box<dyn FieldQuery> {
    match backend {
        FieldQueryBackend::Native => Box::new(NativeQuery),
        FieldQueryBackend::Bcftools => Box::new(BcftoolsQuery {
            program: "bcftools".to_string(),
            timeout,
        }),
    }
}

/// Sort rows and join them into newline-terminated bytes.
pub fn projection(mut rows: Vec<String>) -> Vec<u8> {
    rows.sort();
    let mut out = String::new();
    for row in rows {
        out.push_str(&row);
        out.push('\n');
    }
    out.into_bytes()
}

pub fn projection_digest(query: &dyn FieldQuery, vcf: &Path, fields: &[String]) -> Result<Digest> {
    let rows = query
        .extract(vcf, fields)
        .with_context(|| format!("extract {fields:?} from {}", vcf.display()))?;
    Ok(digest_bytes(&projection(rows)))
}

/// Check an INFO key against the VCF key grammar.
pub fn validate_field_name(field: &str) -> Result<()> {
    let re = Regex::new(r"^[A-Za-z_][0-9A-Za-z_.]*$")?;
    if !re.is_match(field) {
        return Err(anyhow!("invalid INFO field name {field:?}"));
    }
    Ok(())
}

fn info_value<'a>(info: &'a str, field: &str) -> &'a str {
    if info == MISSING {
        return MISSING;
    }
    for entry in info.split(';') {
        match entry.split_once('=') {
            Some((key, value)) if key == field => return value,
            None if entry == field => return "1",
            _ => {}
        }
    }
    MISSING
}

fn open_vcf(path: &Path) -> Result<Box<dyn BufRead>> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut magic = [0u8; 2];
    let read = file
        .read(&mut magic)
        .with_context(|| format!("read {}", path.display()))?;
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    if read == 2 && magic == GZIP_MAGIC {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
