//! Sample metadata and its expansion to per-run records.

use crate::error::{MicrovizError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Column listing the analysis run identifiers of a sample, separated by `;`.
pub const RUN_ID_COLUMN: &str = "assembly_run_ids";

/// Sample metadata loaded from a CSV export.
///
/// Every field is kept as a string; empty cells and `NA` count as missing.
/// One row describes one sample, which may cover several analysis runs.
#[derive(Debug, Clone)]
pub struct SampleMetadata {
    column_names: Vec<String>,
    records: Vec<HashMap<String, String>>,
}

impl SampleMetadata {
    /// Load metadata from a CSV file with a header row.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().from_path(path.as_ref())?;
        let column_names: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        if column_names.is_empty() {
            return Err(MicrovizError::EmptyData(
                "metadata file has no header".to_string(),
            ));
        }

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut fields = HashMap::new();
            for (name, value) in column_names.iter().zip(record.iter()) {
                let value = value.trim();
                if value.is_empty() || value == "NA" || value == "na" {
                    continue;
                }
                fields.insert(name.clone(), value.to_string());
            }
            records.push(fields);
        }
        if records.is_empty() {
            return Err(MicrovizError::EmptyData(
                "no samples in metadata".to_string(),
            ));
        }
        Ok(Self {
            column_names,
            records,
        })
    }

    /// Column names, in file order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of sample rows.
    pub fn n_samples(&self) -> usize {
        self.records.len()
    }

    /// Value of `column` in row `row`, if present.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        self.records
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    /// Expand multi-run rows into one record per analysis run.
    ///
    /// The run list in [`RUN_ID_COLUMN`] is split on `;`; each run inherits
    /// every field of its sample row. When the same run identifier appears
    /// more than once, the first occurrence wins. Rows without a run
    /// identifier are skipped.
    pub fn expand_runs(&self) -> Result<RunMetadata> {
        if !self.has_column(RUN_ID_COLUMN) {
            return Err(MicrovizError::MissingColumn(RUN_ID_COLUMN.to_string()));
        }

        let mut run_ids = Vec::new();
        let mut by_run = HashMap::new();
        let mut records = Vec::new();

        for sample in &self.records {
            let Some(runs) = sample.get(RUN_ID_COLUMN) else {
                continue;
            };
            for run in runs.split(';') {
                let run = run.trim();
                if run.is_empty() || by_run.contains_key(run) {
                    continue;
                }
                by_run.insert(run.to_string(), records.len());
                run_ids.push(run.to_string());
                let mut fields = sample.clone();
                fields.insert(RUN_ID_COLUMN.to_string(), run.to_string());
                records.push(fields);
            }
        }

        Ok(RunMetadata {
            run_ids,
            by_run,
            records,
        })
    }
}

/// Metadata rekeyed by analysis run identifier.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    run_ids: Vec<String>,
    by_run: HashMap<String, usize>,
    records: Vec<HashMap<String, String>>,
}

impl RunMetadata {
    /// Run identifiers in expansion order.
    pub fn run_ids(&self) -> &[String] {
        &self.run_ids
    }

    /// Number of runs.
    pub fn n_runs(&self) -> usize {
        self.run_ids.len()
    }

    /// Check if a run is known.
    pub fn contains(&self, run: &str) -> bool {
        self.by_run.contains_key(run)
    }

    /// Value of `column` for `run`, if the run and field are present.
    pub fn get(&self, run: &str, column: &str) -> Option<&str> {
        self.by_run
            .get(run)
            .and_then(|&idx| self.records[idx].get(column))
            .map(String::as_str)
    }
}
