//! Structural equality for exported tables.
//!
//! Tables are read from pandas-compatible JSON: `.json` in split orientation
//! (`columns`/`index`/`data`) or `.jsonl` in records orientation. Byte-level
//! serialization of equal tables is not stable, so these artifacts are
//! compared cell by cell instead of by digest.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// In-memory table with named columns and row-major cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub index: Option<Vec<Value>>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SplitTable {
    columns: Vec<String>,
    #[serde(default)]
    index: Option<Vec<Value>>,
    data: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let table = Self {
            columns,
            index: None,
            rows,
        };
        table.check_shape()?;
        Ok(table)
    }

    fn check_shape(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if !seen.insert(column.as_str()) {
                return Err(anyhow!("duplicate column {column:?}"));
            }
        }
        for (idx, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(anyhow!(
                    "row {idx} has {} cells, expected {}",
                    row.len(),
                    self.columns.len()
                ));
            }
        }
        if let Some(index) = &self.index {
            if index.len() != self.rows.len() {
                return Err(anyhow!(
                    "index has {} labels for {} rows",
                    index.len(),
                    self.rows.len()
                ));
            }
        }
        Ok(())
    }

    fn column_positions(&self) -> BTreeMap<&str, usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(pos, name)| (name.as_str(), pos))
            .collect()
    }
}

/// Load a serialized table, failing on a missing, unknown, or malformed file.
pub fn load(path: &Path) -> Result<Table> {
    let text = fs::read_to_string(path).with_context(|| format!("read table {}", path.display()))?;
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    let table = match extension {
        "json" => parse_split(&text),
        "jsonl" => parse_records(&text),
        other => Err(anyhow!(
            "unsupported table format {other:?} (expected .json or .jsonl)"
        )),
    }
    .with_context(|| format!("load table {}", path.display()))?;
    Ok(table)
}

fn parse_split(text: &str) -> Result<Table> {
    let split: SplitTable = serde_json::from_str(text).context("parse split-oriented JSON")?;
    let table = Table {
        columns: split.columns,
        index: split.index,
        rows: split.data,
    };
    table.check_shape()?;
    Ok(table)
}

fn parse_records(text: &str) -> Result<Table> {
    let mut columns: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: Map<String, Value> = serde_json::from_str(line)
            .with_context(|| format!("parse record on line {}", line_no + 1))?;
        let names = columns.get_or_insert_with(|| record.keys().cloned().collect());
        if record.len() != names.len() || names.iter().any(|name| !record.contains_key(name)) {
            return Err(anyhow!(
                "record on line {} does not have the columns of the first record",
                line_no + 1
            ));
        }
        let row = names
            .iter()
            .map(|name| record.get(name).cloned().unwrap_or(Value::Null))
            .collect();
        rows.push(row);
    }
    let columns = columns.ok_or_else(|| anyhow!("records table has no rows"))?;
    Table::new(columns, rows)
}

/// First point where two tables stop agreeing.
#[derive(Debug, Clone, PartialEq)]
pub enum TableDivergence {
    Columns {
        only_actual: Vec<String>,
        only_expected: Vec<String>,
    },
    RowCount {
        actual: usize,
        expected: usize,
    },
    IndexPresence {
        actual: bool,
        expected: bool,
    },
    Index {
        row: usize,
        actual: Value,
        expected: Value,
    },
    Cell {
        row: usize,
        column: String,
        actual: Value,
        expected: Value,
    },
}

impl fmt::Display for TableDivergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableDivergence::Columns {
                only_actual,
                only_expected,
            } => write!(
                f,
                "column sets differ: only in produced {only_actual:?}, only in golden {only_expected:?}"
            ),
            TableDivergence::RowCount { actual, expected } => {
                write!(f, "row count differs: produced {actual}, golden {expected}")
            }
            TableDivergence::IndexPresence { actual, expected } => write!(
                f,
                "index presence differs: produced {actual}, golden {expected}"
            ),
            TableDivergence::Index {
                row,
                actual,
                expected,
            } => write!(
                f,
                "index differs at row {row}: produced {actual}, golden {expected}"
            ),
            TableDivergence::Cell {
                row,
                column,
                actual,
                expected,
            } => write!(
                f,
                "cell differs at row {row}, column {column:?}: produced {actual}, golden {expected}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableComparison {
    Equal,
    Diverged(TableDivergence),
}

impl TableComparison {
    pub fn is_equal(&self) -> bool {
        matches!(self, TableComparison::Equal)
    }
}

impl fmt::Display for TableComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableComparison::Equal => write!(f, "tables equal"),
            TableComparison::Diverged(divergence) => write!(f, "{divergence}"),
        }
    }
}

/// Load both sides and compare; a side that cannot be loaded is an `Err`
/// naming the path.
pub fn compare_files(produced: &Path, golden: &Path) -> Result<TableComparison> {
    let actual = load(produced).context("produced table")?;
    let expected = load(golden).context("golden table")?;
    let comparison = equivalent(&actual, &expected);
    tracing::debug!(
        produced = %produced.display(),
        golden = %golden.display(),
        equal = comparison.is_equal(),
        "table comparison"
    );
    Ok(comparison)
}

/// Compare tables: column order is ignored, row order is not, and every cell
/// must be exactly equal (no float tolerance; `1` and `1.0` differ).
pub fn equivalent(actual: &Table, expected: &Table) -> TableComparison {
    let actual_cols = actual.column_positions();
    let expected_cols = expected.column_positions();
    let actual_names: BTreeSet<&str> = actual_cols.keys().copied().collect();
    let expected_names: BTreeSet<&str> = expected_cols.keys().copied().collect();
    if actual_names != expected_names {
        return TableComparison::Diverged(TableDivergence::Columns {
            only_actual: actual_names
                .difference(&expected_names)
                .map(|name| name.to_string())
                .collect(),
            only_expected: expected_names
                .difference(&actual_names)
                .map(|name| name.to_string())
                .collect(),
        });
    }

    if actual.rows.len() != expected.rows.len() {
        return TableComparison::Diverged(TableDivergence::RowCount {
            actual: actual.rows.len(),
            expected: expected.rows.len(),
        });
    }

    match (&actual.index, &expected.index) {
        (Some(actual_index), Some(expected_index)) => {
            if let Some((row, (a, e))) = actual_index
                .iter()
                .zip(expected_index)
                .enumerate()
                .find(|(_, (a, e))| a != e)
            {
                return TableComparison::Diverged(TableDivergence::Index {
                    row,
                    actual: a.clone(),
                    expected: e.clone(),
                });
            }
        }
        (None, None) => {}
        (a, e) => {
            return TableComparison::Diverged(TableDivergence::IndexPresence {
                actual: a.is_some(),
                expected: e.is_some(),
            })
        }
    }

    for (row, (actual_row, expected_row)) in actual.rows.iter().zip(&expected.rows).enumerate() {
        for (column, expected_pos) in &expected_cols {
            let actual_pos = actual_cols[column];
            let a = &actual_row[actual_pos];
            let e = &expected_row[*expected_pos];
            if a != e {
                return TableComparison::Diverged(TableDivergence::Cell {
                    row,
                    column: column.to_string(),
                    actual: a.clone(),
                    expected: e.clone(),
                });
            }
        }
    }
    TableComparison::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::new(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn column_order_is_ignored() {
        let a = table(
            &["chrom", "svlen"],
            vec![vec![json!("chr1"), json!(-50)], vec![json!("chr2"), json!(12)]],
        );
        let b = table(
            &["svlen", "chrom"],
            vec![vec![json!(-50), json!("chr1")], vec![json!(12), json!("chr2")]],
        );
        assert_eq!(equivalent(&a, &b), TableComparison::Equal);
    }

    #[test]
    fn row_order_matters() {
        let a = table(&["id"], vec![vec![json!(1)], vec![json!(2)]]);
        let b = table(&["id"], vec![vec![json!(2)], vec![json!(1)]]);
        assert_eq!(
            equivalent(&a, &b),
            TableComparison::Diverged(TableDivergence::Cell {
                row: 0,
                column: "id".to_string(),
                actual: json!(1),
                expected: json!(2),
            })
        );
    }

    #[test]
    fn floats_compare_exactly() {
        let a = table(&["pctsim"], vec![vec![json!(0.9512)]]);
        let b = table(&["pctsim"], vec![vec![json!(0.951_200_000_000_1)]]);
        assert!(!equivalent(&a, &b).is_equal());

        let int = table(&["n"], vec![vec![json!(1)]]);
        let float = table(&["n"], vec![vec![json!(1.0)]]);
        assert!(!equivalent(&int, &float).is_equal());
    }

    #[test]
    fn column_and_row_count_divergence_are_reported() {
        let a = table(&["a", "b"], vec![vec![json!(1), json!(2)]]);
        let b = table(&["a", "c"], vec![vec![json!(1), json!(2)]]);
        match equivalent(&a, &b) {
            TableComparison::Diverged(TableDivergence::Columns {
                only_actual,
                only_expected,
            }) => {
                assert_eq!(only_actual, vec!["b"]);
                assert_eq!(only_expected, vec!["c"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let short = table(&["a", "b"], Vec::new());
        let divergence = equivalent(&a, &short);
        assert_eq!(
            divergence,
            TableComparison::Diverged(TableDivergence::RowCount {
                actual: 1,
                expected: 0
            })
        );
    }

    #[test]
    fn loads_split_orientation_with_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "df.json",
            r#"{"columns":["chrom","start","qual"],"index":["k1","k2"],"data":[["chr1",10,1.5],["chr2",20,null]]}"#,
        );
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.columns, vec!["chrom", "start", "qual"]);
        assert_eq!(loaded.index, Some(vec![json!("k1"), json!("k2")]));
        assert_eq!(loaded.rows[1][2], Value::Null);
    }

    #[test]
    fn split_and_records_of_same_data_are_equivalent() {
        let dir = tempfile::tempdir().unwrap();
        let split = write(
            dir.path(),
            "df.json",
            r#"{"columns":["chrom","start"],"data":[["chr1",10],["chr2",20]]}"#,
        );
        let records = write(
            dir.path(),
            "df.jsonl",
            "{\"start\":10,\"chrom\":\"chr1\"}\n{\"chrom\":\"chr2\",\"start\":20}\n",
        );
        let a = load(&split).unwrap();
        let b = load(&records).unwrap();
        assert!(equivalent(&a, &b).is_equal());
    }

    #[test]
    fn index_mismatch_is_reported() {
        let mut a = table(&["x"], vec![vec![json!(1)]]);
        let mut b = a.clone();
        a.index = Some(vec![json!("k1")]);
        b.index = Some(vec![json!("k9")]);
        assert!(matches!(
            equivalent(&a, &b),
            TableComparison::Diverged(TableDivergence::Index { row: 0, .. })
        ));
        b.index = None;
        assert!(matches!(
            equivalent(&a, &b),
            TableComparison::Diverged(TableDivergence::IndexPresence { .. })
        ));
    }

    #[test]
    fn corrupt_or_missing_tables_fail_loudly() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).is_err());

        let truncated = write(dir.path(), "bad.json", r#"{"columns":["a"],"data":[[1"#);
        assert!(load(&truncated).is_err());

        let ragged = write(dir.path(), "ragged.json", r#"{"columns":["a","b"],"data":[[1]]}"#);
        let err = load(&ragged).unwrap_err();
        assert!(format!("{err:#}").contains("row 0 has 1 cells"), "{err:#}");

        let unknown = write(dir.path(), "df.jl", "binary");
        assert!(load(&unknown).is_err());

        let empty = write(dir.path(), "empty.jsonl", "\n");
        assert!(load(&empty).is_err());

        let mismatched = write(dir.path(), "m.jsonl", "{\"a\":1}\n{\"b\":2}\n");
        assert!(load(&mismatched).is_err());

        let dupes = write(dir.path(), "d.json", r#"{"columns":["a","a"],"data":[]}"#);
        assert!(load(&dupes).is_err());
    }

    #[test]
    fn compare_files_names_the_missing_side() {
        let dir = tempfile::tempdir().unwrap();
        let produced = write(dir.path(), "df.jsonl", "{\"a\": 1}\n");
        let err = compare_files(&produced, &dir.path().join("golden.jsonl")).unwrap_err();
        assert!(format!("{err:#}").starts_with("golden table"));
        let same = compare_files(&produced, &produced).unwrap();
        assert!(same.is_equal());
        assert_eq!(same.to_string(), "tables equal");
    }

    #[test]
    fn divergence_detail_names_row_and_column() {
        let a = table(&["a"], vec![vec![json!(0.5)]]);
        let b = table(&["a"], vec![vec![json!(0.25)]]);
        let TableComparison::Diverged(divergence) = equivalent(&a, &b) else {
            panic!("expected divergence");
        };
        assert_eq!(
            divergence.to_string(),
            "cell differs at row 0, column \"a\": produced 0.5, golden 0.25"
        );
    }
}
