//! Study catalog and per-run study assignments.

use crate::config::CatalogOptions;
use crate::error::{MicrovizError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Column identifying a study.
pub const STUDY_ID_COLUMN: &str = "study_id";
/// Column holding the study's biome lineage.
pub const BIOME_COLUMN: &str = "biome";

/// Descriptive table with one row per study.
///
/// Loading applies the configured cleanup: biome relabeling, study
/// exclusions, prefix stripping, and removal of unnamed index columns
/// left behind by spreadsheet exports.
#[derive(Debug, Clone)]
pub struct StudyCatalog {
    column_names: Vec<String>,
    study_ids: Vec<String>,
    records: Vec<HashMap<String, String>>,
    by_study: HashMap<String, usize>,
}

impl StudyCatalog {
    /// Load the catalog from a CSV file, applying the cleanup rules.
    pub fn from_csv<P: AsRef<Path>>(path: P, options: &CatalogOptions) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().from_path(path.as_ref())?;
        let raw_columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        if !raw_columns.iter().any(|c| c == STUDY_ID_COLUMN) {
            return Err(MicrovizError::MissingColumn(STUDY_ID_COLUMN.to_string()));
        }

        let keep: Vec<usize> = raw_columns
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.to_ascii_lowercase().contains("unnamed"))
            .map(|(idx, _)| idx)
            .collect();
        let column_names: Vec<String> = keep.iter().map(|&i| raw_columns[i].clone()).collect();

        let mut study_ids = Vec::new();
        let mut records = Vec::new();
        let mut by_study = HashMap::new();

        for record in reader.records() {
            let record = record?;
            let mut fields = HashMap::new();
            for &idx in &keep {
                let value = record.get(idx).unwrap_or("").trim();
                if value.is_empty() {
                    continue;
                }
                fields.insert(raw_columns[idx].clone(), value.to_string());
            }

            let Some(study) = fields.get(STUDY_ID_COLUMN).cloned() else {
                continue;
            };
            if options.exclude_studies.iter().any(|s| s == &study) {
                continue;
            }

            if let Some(biome) = fields.get_mut(BIOME_COLUMN) {
                if let Some(renamed) = options.biome_renames.get(biome) {
                    *biome = renamed.clone();
                }
                if let Some(prefix) = &options.strip_biome_prefix {
                    *biome = biome.replace(prefix.as_str(), "");
                }
            }

            by_study.insert(study.clone(), records.len());
            study_ids.push(study);
            records.push(fields);
        }

        if records.is_empty() {
            return Err(MicrovizError::EmptyData(
                "no studies in catalog".to_string(),
            ));
        }
        Ok(Self {
            column_names,
            study_ids,
            records,
            by_study,
        })
    }

    /// Study accessions in file order.
    pub fn study_ids(&self) -> &[String] {
        &self.study_ids
    }

    /// Number of studies.
    pub fn n_studies(&self) -> usize {
        self.study_ids.len()
    }

    /// Column names after cleanup.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Check if a study is present.
    pub fn has_study(&self, study: &str) -> bool {
        self.by_study.contains_key(study)
    }

    /// Value of `column` for `study`, if present.
    pub fn get(&self, study: &str, column: &str) -> Option<&str> {
        self.by_study
            .get(study)
            .and_then(|&idx| self.records[idx].get(column))
            .map(String::as_str)
    }

    /// The cleaned biome label of a study.
    pub fn biome(&self, study: &str) -> Option<&str> {
        self.get(study, BIOME_COLUMN)
    }
}

/// Mapping from analysis run identifier to study accession.
///
/// Loaded from a two-column export: the run identifier followed by the
/// study it belongs to.
#[derive(Debug, Clone)]
pub struct StudyAssignments {
    by_run: HashMap<String, String>,
}

impl StudyAssignments {
    /// Load assignments from a CSV file.
    ///
    /// The first column holds the run identifier; the study comes from the
    /// `study_id` column.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().from_path(path.as_ref())?;
        let headers = reader.headers()?.clone();
        let study_col = headers
            .iter()
            .position(|h| h == STUDY_ID_COLUMN)
            .ok_or_else(|| MicrovizError::MissingColumn(STUDY_ID_COLUMN.to_string()))?;

        let mut by_run = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let run = record.get(0).unwrap_or("").trim();
            let study = record.get(study_col).unwrap_or("").trim();
            if run.is_empty() || study.is_empty() {
                continue;
            }
            by_run
                .entry(run.to_string())
                .or_insert_with(|| study.to_string());
        }
        if by_run.is_empty() {
            return Err(MicrovizError::EmptyData(
                "no study assignments".to_string(),
            ));
        }
        Ok(Self { by_run })
    }

    /// Build assignments directly from (run, study) pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let by_run = pairs
            .into_iter()
            .map(|(run, study)| (run.into(), study.into()))
            .collect();
        Self { by_run }
    }

    /// The study a run belongs to, if known.
    pub fn study_of(&self, run: &str) -> Option<&str> {
        self.by_run.get(run).map(String::as_str)
    }

    /// Number of assigned runs.
    pub fn n_runs(&self) -> usize {
        self.by_run.len()
    }
}
