//! Abundance tables keyed by taxon and sample identifiers.
//!
//! Per-study tables are exported with one column per taxonomic level plus
//! one column per analysis run; [`load_study_table`] selects the key column
//! for the requested rank and drops the coarser levels. Pre-merged tables
//! (one per biome, or one spanning all biomes) load directly through
//! [`AbundanceTable::from_csv`].

use crate::error::{MicrovizError, Result};
use nalgebra::DMatrix;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Taxonomic rank of a per-study abundance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxonomicRank {
    Phylum,
    Genus,
    Species,
}

impl TaxonomicRank {
    /// Column holding the taxon identifier at this rank.
    pub fn key_column(&self) -> &'static str {
        match self {
            TaxonomicRank::Phylum => "phylum",
            TaxonomicRank::Genus => "Genus",
            TaxonomicRank::Species => "Genus_Species",
        }
    }

    /// Filename fragment identifying tables of this rank.
    pub fn file_tag(&self) -> &'static str {
        match self {
            TaxonomicRank::Phylum => "phylum_taxonomy",
            TaxonomicRank::Genus => "genus_taxonomy",
            TaxonomicRank::Species => "species_taxonomy",
        }
    }

    /// Taxonomy columns dropped at this rank, compared case-insensitively.
    fn dropped_columns(&self) -> &'static [&'static str] {
        match self {
            TaxonomicRank::Phylum => &["superkingdom", "kingdom"],
            TaxonomicRank::Genus => &[
                "superkingdom",
                "kingdom",
                "phylum",
                "class",
                "order",
                "family",
                "family_genus",
            ],
            TaxonomicRank::Species => &[
                "superkingdom",
                "kingdom",
                "phylum",
                "class",
                "order",
                "family",
                "genus",
                "species",
            ],
        }
    }
}

impl fmt::Display for TaxonomicRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaxonomicRank::Phylum => "Phylum",
            TaxonomicRank::Genus => "Genus",
            TaxonomicRank::Species => "Species",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TaxonomicRank {
    type Err = MicrovizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "phylum" => Ok(TaxonomicRank::Phylum),
            "genus" => Ok(TaxonomicRank::Genus),
            "species" => Ok(TaxonomicRank::Species),
            other => Err(MicrovizError::InvalidParameter(format!(
                "unknown taxonomic rank '{}'",
                other
            ))),
        }
    }
}

/// A taxon and its summed abundance, as produced by the top-taxa summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTaxon {
    pub taxon: String,
    pub total: f64,
}

/// A dense abundance table: rows are taxa, columns are samples.
///
/// Taxon identifiers are unique; rows sharing a key are merged by summing
/// when the table is loaded. Missing cells are stored as 0.
#[derive(Debug, Clone)]
pub struct AbundanceTable {
    /// Dense matrix (taxa × samples).
    data: DMatrix<f64>,
    /// Taxon identifiers (row names).
    taxon_ids: Vec<String>,
    /// Sample identifiers (column names).
    sample_ids: Vec<String>,
}

impl AbundanceTable {
    /// Create a new table from a matrix and identifiers.
    pub fn new(
        data: DMatrix<f64>,
        taxon_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != taxon_ids.len() {
            return Err(MicrovizError::DimensionMismatch {
                expected: nrows,
                actual: taxon_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(MicrovizError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        Ok(Self {
            data,
            taxon_ids,
            sample_ids,
        })
    }

    /// Load a pre-merged table from a CSV file.
    ///
    /// Expected format: first column holds the taxon key, remaining columns
    /// are samples. Cells that are empty or fail to parse count as missing.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().from_path(path.as_ref())?;
        let headers = reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(MicrovizError::EmptyData(
                "abundance table must have at least one sample column".to_string(),
            ));
        }
        let sample_ids: Vec<String> = headers.iter().skip(1).map(String::from).collect();
        let sample_cols: Vec<usize> = (1..headers.len()).collect();

        let mut rows = RowAccumulator::new(sample_cols.len());
        for record in reader.records() {
            let record = record?;
            rows.push(&record, 0, &sample_cols);
        }
        rows.into_table(sample_ids)
    }

    /// Write the table to a CSV file with the given key-column header.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P, key_header: &str) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        let mut header = vec![key_header.to_string()];
        header.extend(self.sample_ids.iter().cloned());
        writer.write_record(&header)?;
        for (row, taxon) in self.taxon_ids.iter().enumerate() {
            let mut fields = vec![taxon.clone()];
            for col in 0..self.n_samples() {
                fields.push(self.data[(row, col)].to_string());
            }
            writer.write_record(&fields)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Number of taxa (rows).
    #[inline]
    pub fn n_taxa(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Taxon identifiers.
    #[inline]
    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    /// Sample identifiers, in column order.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// The underlying matrix (taxa × samples).
    #[inline]
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Value at (taxon row, sample column).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[(row, col)]
    }

    /// The matrix transposed to samples × taxa, the orientation the
    /// dissimilarity engine works in.
    pub fn samples_by_taxa(&self) -> DMatrix<f64> {
        self.data.transpose()
    }

    /// The `n` taxa with the highest total abundance, descending.
    ///
    /// Ties break by taxon identifier so the order is reproducible.
    pub fn top_taxa(&self, n: usize) -> Vec<TopTaxon> {
        let totals = self
            .taxon_ids
            .iter()
            .enumerate()
            .map(|(row, taxon)| TopTaxon {
                taxon: taxon.clone(),
                total: self.data.row(row).iter().sum(),
            })
            .collect();
        rank_taxa(totals, n)
    }

    /// The `n` most abundant taxa as percentages of the table total.
    ///
    /// An all-zero table yields zero percentages.
    pub fn relative_top_taxa(&self, n: usize) -> Vec<TopTaxon> {
        let grand_total: f64 = self.data.iter().sum();
        let mut top = self.top_taxa(n);
        to_percentages(&mut top, grand_total);
        top
    }

    /// Per-group top taxa as percentages of each group's total.
    ///
    /// `labels` assigns one group label per sample column. Groups come back
    /// sorted by label; within each group taxa are ranked like
    /// [`AbundanceTable::top_taxa`]. An all-zero group yields zero
    /// percentages.
    pub fn top_taxa_by_group(
        &self,
        labels: &[String],
        n: usize,
    ) -> Result<Vec<(String, Vec<TopTaxon>)>> {
        if labels.len() != self.n_samples() {
            return Err(MicrovizError::DimensionMismatch {
                expected: self.n_samples(),
                actual: labels.len(),
            });
        }
        let mut unique: Vec<&String> = labels.iter().collect();
        unique.sort();
        unique.dedup();

        let mut out = Vec::with_capacity(unique.len());
        for group in unique {
            let cols: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, l)| *l == group)
                .map(|(c, _)| c)
                .collect();
            let totals: Vec<TopTaxon> = self
                .taxon_ids
                .iter()
                .enumerate()
                .map(|(row, taxon)| TopTaxon {
                    taxon: taxon.clone(),
                    total: cols.iter().map(|&c| self.data[(row, c)]).sum(),
                })
                .collect();
            let group_total: f64 = totals.iter().map(|t| t.total).sum();
            let mut top = rank_taxa(totals, n);
            to_percentages(&mut top, group_total);
            out.push((group.clone(), top));
        }
        Ok(out)
    }
}

/// Sort descending by total (ties by taxon id) and keep the first `n`.
fn rank_taxa(mut totals: Vec<TopTaxon>, n: usize) -> Vec<TopTaxon> {
    totals.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.taxon.cmp(&b.taxon))
    });
    totals.truncate(n);
    totals
}

fn to_percentages(entries: &mut [TopTaxon], total: f64) {
    for entry in entries {
        entry.total = if total > 0.0 {
            entry.total / total * 100.0
        } else {
            0.0
        };
    }
}

/// A pooled table spanning several studies: rows are samples, columns are
/// the union of the studies' taxa.
#[derive(Debug, Clone)]
pub struct PooledTable {
    /// Dense matrix (samples × taxa).
    data: DMatrix<f64>,
    sample_ids: Vec<String>,
    /// Study accession per sample, parallel to `sample_ids`.
    study_ids: Vec<String>,
    taxon_ids: Vec<String>,
}

impl PooledTable {
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn n_taxa(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    #[inline]
    pub fn study_ids(&self) -> &[String] {
        &self.study_ids
    }

    #[inline]
    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }
}

/// Pool per-study tables into one samples × taxa matrix for comparison.
///
/// Taxa are the union across tables in first-seen order; a taxon absent
/// from a study contributes 0 for that study's samples.
pub fn pool_tables(tables: &[(&str, &AbundanceTable)]) -> Result<PooledTable> {
    if tables.is_empty() {
        return Err(MicrovizError::EmptyData("no tables to pool".to_string()));
    }

    let mut taxon_ids: Vec<String> = Vec::new();
    let mut taxon_index: HashMap<String, usize> = HashMap::new();
    for (_, table) in tables {
        for taxon in table.taxon_ids() {
            if !taxon_index.contains_key(taxon) {
                taxon_index.insert(taxon.clone(), taxon_ids.len());
                taxon_ids.push(taxon.clone());
            }
        }
    }

    let n_samples: usize = tables.iter().map(|(_, t)| t.n_samples()).sum();
    let mut data = DMatrix::zeros(n_samples, taxon_ids.len());
    let mut sample_ids = Vec::with_capacity(n_samples);
    let mut study_ids = Vec::with_capacity(n_samples);

    let mut sample_row = 0;
    for (study, table) in tables {
        for (col, sample) in table.sample_ids().iter().enumerate() {
            sample_ids.push(sample.clone());
            study_ids.push((*study).to_string());
            for (row, taxon) in table.taxon_ids().iter().enumerate() {
                let target = taxon_index[taxon];
                data[(sample_row, target)] = table.get(row, col);
            }
            sample_row += 1;
        }
    }

    Ok(PooledTable {
        data,
        sample_ids,
        study_ids,
        taxon_ids,
    })
}

/// Find the abundance table file for a study at the given rank.
///
/// Files are expected under `dir/{study}/` with names matching
/// `{study}*taxonomy*.csv` and containing the rank's filename tag.
/// Directory entries are scanned in sorted order so the first match is
/// stable across platforms.
pub fn locate_study_table(dir: &Path, study: &str, rank: TaxonomicRank) -> Result<PathBuf> {
    let study_dir = dir.join(study);
    let missing = || MicrovizError::MissingFile {
        study: study.to_string(),
        rank: rank.to_string(),
        dir: dir.display().to_string(),
    };

    let entries = fs::read_dir(&study_dir).map_err(|_| missing())?;
    let broad = Regex::new(&format!("^{}.*taxonomy.*\\.csv$", regex::escape(study)))
        .map_err(|e| MicrovizError::InvalidParameter(e.to_string()))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| broad.is_match(name) && name.contains(rank.file_tag()))
        .collect();
    names.sort();

    let first = names.into_iter().next().ok_or_else(missing)?;
    let path = study_dir.join(first);

    // A header-only export is indistinguishable from no data.
    if fs::metadata(&path)?.len() <= 1 {
        return Err(MicrovizError::EmptyData(format!(
            "abundance table '{}' is empty",
            path.display()
        )));
    }
    Ok(path)
}

/// Load and preprocess the abundance table for a study at the given rank.
///
/// Coarser taxonomy columns are dropped, rows are keyed by the rank's
/// label column, rows with no value in any sample column are removed, and
/// duplicate keys are merged by summing.
pub fn load_study_table(dir: &Path, study: &str, rank: TaxonomicRank) -> Result<AbundanceTable> {
    let path = locate_study_table(dir, study, rank)?;
    let mut reader = csv::ReaderBuilder::new().from_path(&path)?;
    let headers = reader.headers()?.clone();

    let key_col = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(rank.key_column()))
        .ok_or_else(|| MicrovizError::MissingColumn(rank.key_column().to_string()))?;

    let dropped = rank.dropped_columns();
    let sample_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(idx, name)| {
            *idx != key_col && !dropped.iter().any(|d| name.eq_ignore_ascii_case(d))
        })
        .map(|(idx, _)| idx)
        .collect();
    if sample_cols.is_empty() {
        return Err(MicrovizError::EmptyData(format!(
            "no sample columns in '{}'",
            path.display()
        )));
    }
    let sample_ids: Vec<String> = sample_cols
        .iter()
        .map(|&idx| headers[idx].to_string())
        .collect();

    let mut rows = RowAccumulator::new(sample_cols.len());
    for record in reader.records() {
        let record = record?;
        rows.push(&record, key_col, &sample_cols);
    }
    rows.into_table(sample_ids)
}

/// Accumulates parsed rows, merging duplicate keys and dropping rows that
/// are missing in every sample column.
struct RowAccumulator {
    n_cols: usize,
    keys: Vec<String>,
    values: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
}

impl RowAccumulator {
    fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            keys: Vec::new(),
            values: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push(&mut self, record: &csv::StringRecord, key_col: usize, sample_cols: &[usize]) {
        let key = match record.get(key_col) {
            Some(k) if !k.trim().is_empty() => k.trim().to_string(),
            _ => return,
        };

        let mut parsed = Vec::with_capacity(self.n_cols);
        let mut any_present = false;
        for &col in sample_cols {
            let cell = record.get(col).unwrap_or("").trim();
            match cell.parse::<f64>() {
                Ok(v) if !cell.is_empty() => {
                    parsed.push(v);
                    any_present = true;
                }
                _ => parsed.push(0.0),
            }
        }
        if !any_present {
            return;
        }

        match self.index.get(&key) {
            Some(&row) => {
                for (slot, v) in self.values[row].iter_mut().zip(parsed) {
                    *slot += v;
                }
            }
            None => {
                self.index.insert(key.clone(), self.keys.len());
                self.keys.push(key);
                self.values.push(parsed);
            }
        }
    }

    fn into_table(self, sample_ids: Vec<String>) -> Result<AbundanceTable> {
        if self.keys.is_empty() {
            return Err(MicrovizError::EmptyData(
                "no taxon rows in abundance table".to_string(),
            ));
        }
        let n_rows = self.keys.len();
        let data = DMatrix::from_fn(n_rows, self.n_cols, |r, c| self.values[r][c]);
        AbundanceTable::new(data, self.keys, sample_ids)
    }
}
