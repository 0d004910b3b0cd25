//! Entry points for the four beta-diversity input shapes.
//!
//! The modes differ only in how sample identifiers and grouping metadata
//! are derived; the distance computation itself is shared. The matrix
//! order always follows the abundance table's column order, and the sample
//! frame is aligned to it rather than the other way around.

use crate::data::{AbundanceTable, PooledTable, SampleMetadata};
use crate::diversity::bray_curtis::{bray_curtis, DissimilarityMatrix};
use crate::error::Result;
use log::warn;

/// Grouping metadata for one matrix row.
///
/// Fields missing from the metadata stay `None`; a run with no metadata
/// record at all keeps its matrix slot with every field unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleRecord {
    pub run_id: String,
    pub sample_id: Option<String>,
    /// Biome as recorded in the sample metadata.
    pub biome: Option<String>,
    /// Composite `feature - material` label, single-biome mode only.
    pub specific_biome: Option<String>,
    pub country: Option<String>,
    pub experiment_type: Option<String>,
    pub pipeline_version: Option<String>,
    pub platform: Option<String>,
}

/// Sample records aligned to a dissimilarity matrix, one per row.
#[derive(Debug, Clone, Default)]
pub struct SampleFrame {
    records: Vec<SampleRecord>,
}

impl SampleFrame {
    /// Build a frame from records already in matrix order.
    pub fn from_records(records: Vec<SampleRecord>) -> Self {
        SampleFrame { records }
    }

    /// Records in matrix order.
    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    /// Record at a matrix row.
    pub fn get(&self, idx: usize) -> Option<&SampleRecord> {
        self.records.get(idx)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A dissimilarity matrix together with its aligned sample frame.
#[derive(Debug, Clone)]
pub struct BetaDiversity {
    pub matrix: DissimilarityMatrix,
    pub samples: SampleFrame,
}

/// Beta diversity across every biome at once.
///
/// The merged table is taxa × samples; the metadata is expanded to one
/// record per analysis run before the frame join.
pub fn beta_diversity_all_biomes(
    table: &AbundanceTable,
    metadata: &SampleMetadata,
) -> Result<BetaDiversity> {
    beta_with_frame(table, metadata, false)
}

/// Beta diversity within one biome.
///
/// Adds the composite `specific_biome` label, with `NA` standing in for
/// a missing feature or material component.
pub fn beta_diversity_single_biome(
    table: &AbundanceTable,
    metadata: &SampleMetadata,
) -> Result<BetaDiversity> {
    beta_with_frame(table, metadata, true)
}

/// Beta diversity for a single study's abundance table.
///
/// Run identifiers are local to the study; expanding metadata whose rows
/// list a single run is a no-op, so the same alignment applies.
pub fn beta_diversity_study(
    table: &AbundanceTable,
    metadata: &SampleMetadata,
) -> Result<BetaDiversity> {
    beta_with_frame(table, metadata, false)
}

/// Beta diversity over a pooled multi-study table.
///
/// The pooled table is already samples × taxa and carries its own study
/// assignment, so no metadata join happens here.
pub fn beta_diversity_comparison(pooled: &PooledTable) -> Result<DissimilarityMatrix> {
    bray_curtis(pooled.data(), pooled.sample_ids())
}

fn beta_with_frame(
    table: &AbundanceTable,
    metadata: &SampleMetadata,
    compose_specific: bool,
) -> Result<BetaDiversity> {
    let runs = metadata.expand_runs()?;
    let matrix = bray_curtis(&table.samples_by_taxa(), table.sample_ids())?;

    let records = table
        .sample_ids()
        .iter()
        .map(|run| {
            if !runs.contains(run) {
                warn!("no metadata record for run '{}'", run);
            }
            let field = |column: &str| runs.get(run, column).map(String::from);
            let mut record = SampleRecord {
                run_id: run.clone(),
                sample_id: field("sample_id"),
                biome: field("biome"),
                specific_biome: None,
                country: field("sampling_country"),
                experiment_type: field("experiment_type"),
                pipeline_version: field("pipeline_version"),
                platform: field("instrument_platform"),
            };
            if compose_specific {
                let feature = runs.get(run, "biome_feature").unwrap_or("NA");
                let material = runs.get(run, "biome_material").unwrap_or("NA");
                record.specific_biome = Some(format!("{} - {}", feature, material));
            }
            record
        })
        .collect();

    Ok(BetaDiversity {
        matrix,
        samples: SampleFrame { records },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::pool_tables;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_table(sample_ids: &[&str]) -> AbundanceTable {
        let n = sample_ids.len();
        let data = DMatrix::from_fn(2, n, |r, c| ((r + 1) * (c + 1)) as f64);
        AbundanceTable::new(
            data,
            vec!["Proteobacteria".to_string(), "Firmicutes".to_string()],
            sample_ids.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    fn create_metadata() -> SampleMetadata {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sample_id,assembly_run_ids,biome,biome_feature,biome_material,sampling_country,experiment_type,pipeline_version,instrument_platform"
        )
        .unwrap();
        writeln!(
            file,
            "S1,R1;R2,Wastewater,sludge,activated,Denmark,metagenomic,5.0,Illumina"
        )
        .unwrap();
        writeln!(file, "S2,R3,Wastewater,,,Spain,metagenomic,4.1,Illumina").unwrap();
        file.flush().unwrap();
        SampleMetadata::from_csv(file.path()).unwrap()
    }

    #[test]
    fn test_all_biomes_alignment_follows_columns() {
        let table = create_table(&["R3", "R1", "R2"]);
        let result = beta_diversity_all_biomes(&table, &create_metadata()).unwrap();

        assert_eq!(result.matrix.ids(), &["R3", "R1", "R2"]);
        assert_eq!(result.samples.len(), 3);
        assert_eq!(result.samples.get(0).unwrap().sample_id.as_deref(), Some("S2"));
        assert_eq!(result.samples.get(1).unwrap().sample_id.as_deref(), Some("S1"));
        assert_eq!(
            result.samples.get(0).unwrap().country.as_deref(),
            Some("Spain")
        );
        assert!(result.samples.get(0).unwrap().specific_biome.is_none());
    }

    #[test]
    fn test_unknown_run_keeps_slot() {
        let table = create_table(&["R1", "R9"]);
        let result = beta_diversity_all_biomes(&table, &create_metadata()).unwrap();

        assert_eq!(result.matrix.n_samples(), 2);
        let unknown = result.samples.get(1).unwrap();
        assert_eq!(unknown.run_id, "R9");
        assert!(unknown.sample_id.is_none());
        assert!(unknown.biome.is_none());
    }

    #[test]
    fn test_single_biome_composite_label() {
        let table = create_table(&["R1", "R3"]);
        let result = beta_diversity_single_biome(&table, &create_metadata()).unwrap();

        assert_eq!(
            result.samples.get(0).unwrap().specific_biome.as_deref(),
            Some("sludge - activated")
        );
        // S2 has neither feature nor material
        assert_eq!(
            result.samples.get(1).unwrap().specific_biome.as_deref(),
            Some("NA - NA")
        );
    }

    #[test]
    fn test_study_mode_biome_from_metadata() {
        let table = create_table(&["R1", "R2"]);
        let result = beta_diversity_study(&table, &create_metadata()).unwrap();
        assert_eq!(
            result.samples.get(0).unwrap().biome.as_deref(),
            Some("Wastewater")
        );
    }

    #[test]
    fn test_nan_abundance_cell_yields_finite_distances() {
        // "NaN" parses as a valid f64, so it survives the loader
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Genus,R1,R2").unwrap();
        writeln!(file, "Escherichia,NaN,1").unwrap();
        writeln!(file, "Shigella,2,3").unwrap();
        file.flush().unwrap();
        let table = AbundanceTable::from_csv(file.path()).unwrap();

        let result = beta_diversity_study(&table, &create_metadata()).unwrap();
        for i in 0..result.matrix.n_samples() {
            for j in 0..result.matrix.n_samples() {
                assert!(result.matrix.get(i, j).is_finite());
            }
        }
        assert_relative_eq!(result.matrix.get(0, 1), 0.0);
    }

    #[test]
    fn test_comparison_mode_matrix_only() {
        let t1 = create_table(&["R1", "R2"]);
        let t2 = create_table(&["R3"]);
        let pooled = pool_tables(&[("MGYS1", &t1), ("MGYS2", &t2)]).unwrap();
        let matrix = beta_diversity_comparison(&pooled).unwrap();

        assert_eq!(matrix.ids(), &["R1", "R2", "R3"]);
        assert_relative_eq!(matrix.get(0, 0), 0.0);
        // identical taxon profile in both tables' first columns
        assert_relative_eq!(matrix.get(0, 2), 0.0);
    }

    #[test]
    fn test_single_column_table_is_insufficient() {
        let table = create_table(&["R1"]);
        assert!(beta_diversity_study(&table, &create_metadata()).is_err());
    }
}
