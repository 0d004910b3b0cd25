//! Grouping joins between an ordination embedding and study descriptors.
//!
//! The projector in [`super::pcoa`] knows nothing about biomes or studies;
//! this module attaches the categorical variables a scatter plot groups by.
//! Each constructor mirrors one dashboard view: all biomes together, a
//! single biome, a single study, or a pooled study comparison.

use std::collections::HashMap;

use log::warn;
use serde::Serialize;

use super::pcoa::OrdinationResult;
use crate::data::{PooledTable, StudyAssignments, StudyCatalog};
use crate::diversity::{SampleFrame, SampleRecord};
use crate::error::{MicrovizError, Result};
use std::path::Path;
use std::str::FromStr;

const COUNTRY_COLUMN: &str = "sampling_country";
const EXPERIMENT_TYPE_COLUMN: &str = "experiment_type";
const PIPELINE_VERSION_COLUMN: &str = "pipeline_version";
const PLATFORM_COLUMN: &str = "instrument_platform";

/// Composite produced when both biome feature and material are missing.
const MISSING_COMPOSITE: &str = "NA - NA";

/// One annotated sample of an embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameRecord {
    pub run_id: String,
    pub pc1: f64,
    pub pc2: f64,
    pub study: Option<String>,
    /// `"<study> - <biome>"`, present only when both parts are known.
    pub study_label: Option<String>,
    pub biome: Option<String>,
    pub specific_biome: Option<String>,
    pub country: Option<String>,
    pub experiment_type: Option<String>,
    pub pipeline_version: Option<String>,
    pub platform: Option<String>,
}

/// Categorical variable used to group samples in a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Biome,
    Study,
    StudyAndBiome,
    Country,
    ExperimentType,
    PipelineVersion,
    Platform,
    SpecificBiome,
}

impl GroupBy {
    /// The record field this grouping reads.
    pub fn value<'a>(&self, record: &'a FrameRecord) -> Option<&'a str> {
        match self {
            GroupBy::Biome => record.biome.as_deref(),
            GroupBy::Study => record.study.as_deref(),
            GroupBy::StudyAndBiome => record.study_label.as_deref(),
            GroupBy::Country => record.country.as_deref(),
            GroupBy::ExperimentType => record.experiment_type.as_deref(),
            GroupBy::PipelineVersion => record.pipeline_version.as_deref(),
            GroupBy::Platform => record.platform.as_deref(),
            GroupBy::SpecificBiome => record.specific_biome.as_deref(),
        }
    }
}

impl std::fmt::Display for GroupBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GroupBy::Biome => "biome",
            GroupBy::Study => "study",
            GroupBy::StudyAndBiome => "study-biome",
            GroupBy::Country => "country",
            GroupBy::ExperimentType => "experiment-type",
            GroupBy::PipelineVersion => "pipeline-version",
            GroupBy::Platform => "platform",
            GroupBy::SpecificBiome => "specific-biome",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for GroupBy {
    type Err = MicrovizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "biome" => Ok(GroupBy::Biome),
            "study" => Ok(GroupBy::Study),
            "study-biome" => Ok(GroupBy::StudyAndBiome),
            "country" => Ok(GroupBy::Country),
            "experiment-type" => Ok(GroupBy::ExperimentType),
            "pipeline-version" => Ok(GroupBy::PipelineVersion),
            "platform" => Ok(GroupBy::Platform),
            "specific-biome" => Ok(GroupBy::SpecificBiome),
            other => Err(MicrovizError::InvalidParameter(format!(
                "unknown grouping '{}'",
                other
            ))),
        }
    }
}

/// An embedding joined with per-sample grouping variables.
///
/// Row order equals the embedding's sample order.
#[derive(Debug, Clone)]
pub struct OrdinationFrame {
    records: Vec<FrameRecord>,
}

impl OrdinationFrame {
    /// Annotate an all-biomes embedding with study-level descriptors.
    ///
    /// Each run is mapped to its study, then the study's catalog row
    /// contributes biome, country, experiment type (capitalized), pipeline
    /// version and platform. Runs without a study assignment keep empty
    /// descriptors and are logged.
    pub fn all_biomes(
        result: &OrdinationResult,
        samples: &SampleFrame,
        assignments: &StudyAssignments,
        catalog: &StudyCatalog,
    ) -> Result<Self> {
        let records = catalog_join(result, samples, assignments, catalog, false)?;
        Ok(OrdinationFrame { records })
    }

    /// Annotate a single-biome embedding.
    ///
    /// Same joins as [`OrdinationFrame::all_biomes`], plus the per-run
    /// specific biome (feature/material composite). A composite of
    /// `"NA - NA"`, or a missing one, falls back to the catalog biome.
    pub fn single_biome(
        result: &OrdinationResult,
        samples: &SampleFrame,
        assignments: &StudyAssignments,
        catalog: &StudyCatalog,
    ) -> Result<Self> {
        let records = catalog_join(result, samples, assignments, catalog, true)?;
        Ok(OrdinationFrame { records })
    }

    /// Annotate a single-study embedding from its run metadata alone.
    ///
    /// The biome comes from each run's metadata record; no catalog join
    /// is performed.
    pub fn single_study(result: &OrdinationResult, samples: &SampleFrame) -> Result<Self> {
        check_lengths(result.n_samples(), samples.len())?;
        let by_run = index_samples(samples);
        let records = result
            .sample_ids
            .iter()
            .enumerate()
            .map(|(idx, run)| {
                let sample = by_run.get(run.as_str()).copied();
                FrameRecord {
                    run_id: run.clone(),
                    pc1: result.pc1[idx],
                    pc2: result.pc2[idx],
                    biome: sample.and_then(|s| s.biome.clone()),
                    specific_biome: sample.and_then(|s| s.specific_biome.clone()),
                    country: sample.and_then(|s| s.country.clone()),
                    experiment_type: sample.and_then(|s| s.experiment_type.clone()),
                    pipeline_version: sample.and_then(|s| s.pipeline_version.clone()),
                    platform: sample.and_then(|s| s.platform.clone()),
                    ..FrameRecord::default()
                }
            })
            .collect();
        Ok(OrdinationFrame { records })
    }

    /// Annotate a pooled-comparison embedding with each sample's study.
    pub fn study_comparison(result: &OrdinationResult, pooled: &PooledTable) -> Result<Self> {
        check_lengths(result.n_samples(), pooled.n_samples())?;
        let by_sample: HashMap<&str, &str> = pooled
            .sample_ids()
            .iter()
            .zip(pooled.study_ids())
            .map(|(sample, study)| (sample.as_str(), study.as_str()))
            .collect();
        let records = result
            .sample_ids
            .iter()
            .enumerate()
            .map(|(idx, run)| {
                let study = by_sample.get(run.as_str()).map(|s| s.to_string());
                if study.is_none() {
                    warn!("sample '{}' is not in the pooled table", run);
                }
                FrameRecord {
                    run_id: run.clone(),
                    pc1: result.pc1[idx],
                    pc2: result.pc2[idx],
                    study,
                    ..FrameRecord::default()
                }
            })
            .collect();
        Ok(OrdinationFrame { records })
    }

    /// Annotated rows, in embedding order.
    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted distinct values of a grouping variable, missing excluded.
    pub fn group_values(&self, group: GroupBy) -> Vec<String> {
        let mut values: Vec<String> = self
            .records
            .iter()
            .filter_map(|r| group.value(r))
            .map(String::from)
            .collect();
        values.sort();
        values.dedup();
        values
    }

    /// Write the annotated embedding to a CSV file, empty cells for
    /// missing values.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record([
            "run_id",
            "PC1",
            "PC2",
            "study",
            "study_biome",
            "biome",
            "specific_biome",
            "sampling_country",
            "experiment_type",
            "pipeline_version",
            "instrument_platform",
        ])?;
        for record in &self.records {
            writer.write_record([
                record.run_id.as_str(),
                &record.pc1.to_string(),
                &record.pc2.to_string(),
                record.study.as_deref().unwrap_or(""),
                record.study_label.as_deref().unwrap_or(""),
                record.biome.as_deref().unwrap_or(""),
                record.specific_biome.as_deref().unwrap_or(""),
                record.country.as_deref().unwrap_or(""),
                record.experiment_type.as_deref().unwrap_or(""),
                record.pipeline_version.as_deref().unwrap_or(""),
                record.platform.as_deref().unwrap_or(""),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn check_lengths(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(MicrovizError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

fn index_samples(samples: &SampleFrame) -> HashMap<&str, &SampleRecord> {
    samples
        .records()
        .iter()
        .map(|record| (record.run_id.as_str(), record))
        .collect()
}

fn catalog_join(
    result: &OrdinationResult,
    samples: &SampleFrame,
    assignments: &StudyAssignments,
    catalog: &StudyCatalog,
    with_specific: bool,
) -> Result<Vec<FrameRecord>> {
    check_lengths(result.n_samples(), samples.len())?;
    let by_run = index_samples(samples);
    let records = result
        .sample_ids
        .iter()
        .enumerate()
        .map(|(idx, run)| {
            let study = assignments.study_of(run);
            if study.is_none() {
                warn!("run '{}' has no study assignment", run);
            }
            let biome = study.and_then(|s| catalog.biome(s)).map(String::from);
            let study_label = match (study, &biome) {
                (Some(s), Some(b)) => Some(format!("{} - {}", s, b)),
                _ => None,
            };
            let specific_biome = if with_specific {
                by_run
                    .get(run.as_str())
                    .and_then(|s| s.specific_biome.clone())
                    .filter(|s| s != MISSING_COMPOSITE)
                    .or_else(|| biome.clone())
            } else {
                None
            };
            FrameRecord {
                run_id: run.clone(),
                pc1: result.pc1[idx],
                pc2: result.pc2[idx],
                study: study.map(String::from),
                study_label,
                biome,
                specific_biome,
                country: study
                    .and_then(|s| catalog.get(s, COUNTRY_COLUMN))
                    .map(String::from),
                experiment_type: study
                    .and_then(|s| catalog.get(s, EXPERIMENT_TYPE_COLUMN))
                    .map(capitalize),
                pipeline_version: study
                    .and_then(|s| catalog.get(s, PIPELINE_VERSION_COLUMN))
                    .map(String::from),
                platform: study
                    .and_then(|s| catalog.get(s, PLATFORM_COLUMN))
                    .map(String::from),
            }
        })
        .collect();
    Ok(records)
}

/// Uppercase the first character, lowercase the rest.
fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogOptions;
    use crate::data::{pool_tables, AbundanceTable};
    use nalgebra::DMatrix;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn test_catalog() -> StudyCatalog {
        let file = write_csv(
            "study_id,biome,sampling_country,experiment_type,pipeline_version,instrument_platform\n\
             S1,Marine,Norway,metagenomic,5.0,Illumina\n\
             S2,Soil,Chile,amplicon,4.1,Ion Torrent\n",
        );
        StudyCatalog::from_csv(file.path(), &CatalogOptions::default()).unwrap()
    }

    fn test_result() -> OrdinationResult {
        OrdinationResult {
            sample_ids: vec!["R1".to_string(), "R2".to_string()],
            pc1: vec![0.5, -0.5],
            pc2: vec![0.0, 0.0],
            proportion_explained: [1.0, 0.0],
        }
    }

    fn test_frame() -> SampleFrame {
        SampleFrame::from_records(vec![
            SampleRecord {
                run_id: "R1".to_string(),
                biome: Some("Marine".to_string()),
                specific_biome: Some("Water - Sediment".to_string()),
                ..SampleRecord::default()
            },
            SampleRecord {
                run_id: "R2".to_string(),
                biome: Some("Soil".to_string()),
                specific_biome: Some("NA - NA".to_string()),
                ..SampleRecord::default()
            },
        ])
    }

    fn test_assignments() -> StudyAssignments {
        StudyAssignments::from_pairs([("R1", "S1"), ("R2", "S2")])
    }

    #[test]
    fn test_all_biomes_joins_catalog_columns() {
        let frame = OrdinationFrame::all_biomes(
            &test_result(),
            &test_frame(),
            &test_assignments(),
            &test_catalog(),
        )
        .unwrap();
        let first = &frame.records()[0];
        assert_eq!(first.study.as_deref(), Some("S1"));
        assert_eq!(first.study_label.as_deref(), Some("S1 - Marine"));
        assert_eq!(first.biome.as_deref(), Some("Marine"));
        assert_eq!(first.country.as_deref(), Some("Norway"));
        assert_eq!(first.experiment_type.as_deref(), Some("Metagenomic"));
        assert_eq!(first.pipeline_version.as_deref(), Some("5.0"));
        assert_eq!(first.platform.as_deref(), Some("Illumina"));
        assert!(first.specific_biome.is_none());
    }

    #[test]
    fn test_single_biome_specific_fallback() {
        let frame = OrdinationFrame::single_biome(
            &test_result(),
            &test_frame(),
            &test_assignments(),
            &test_catalog(),
        )
        .unwrap();
        let records = frame.records();
        assert_eq!(records[0].specific_biome.as_deref(), Some("Water - Sediment"));
        // "NA - NA" yields the catalog biome instead
        assert_eq!(records[1].specific_biome.as_deref(), Some("Soil"));
    }

    #[test]
    fn test_unassigned_run_keeps_empty_descriptors() {
        let assignments = StudyAssignments::from_pairs([("R1", "S1")]);
        let frame = OrdinationFrame::all_biomes(
            &test_result(),
            &test_frame(),
            &assignments,
            &test_catalog(),
        )
        .unwrap();
        let second = &frame.records()[1];
        assert!(second.study.is_none());
        assert!(second.study_label.is_none());
        assert!(second.biome.is_none());
        assert_eq!(second.pc1, -0.5);
    }

    #[test]
    fn test_single_study_uses_run_metadata() {
        let frame = OrdinationFrame::single_study(&test_result(), &test_frame()).unwrap();
        let records = frame.records();
        assert_eq!(records[0].biome.as_deref(), Some("Marine"));
        assert!(records[0].study.is_none());
        assert_eq!(records[1].biome.as_deref(), Some("Soil"));
    }

    #[test]
    fn test_study_comparison_labels_samples() {
        let table_a = AbundanceTable::new(
            DMatrix::from_row_slice(1, 2, &[3.0, 1.0]),
            vec!["tax_a".to_string()],
            vec!["R1".to_string(), "R2".to_string()],
        )
        .unwrap();
        let table_b = AbundanceTable::new(
            DMatrix::from_row_slice(1, 1, &[5.0]),
            vec!["tax_b".to_string()],
            vec!["R3".to_string()],
        )
        .unwrap();
        let pooled = pool_tables(&[("S1", &table_a), ("S2", &table_b)]).unwrap();
        let result = OrdinationResult {
            sample_ids: pooled.sample_ids().to_vec(),
            pc1: vec![0.1, 0.2, 0.3],
            pc2: vec![0.0, 0.0, 0.0],
            proportion_explained: [0.9, 0.1],
        };
        let frame = OrdinationFrame::study_comparison(&result, &pooled).unwrap();
        let studies: Vec<_> = frame
            .records()
            .iter()
            .map(|r| r.study.as_deref().unwrap())
            .collect();
        assert_eq!(studies, vec!["S1", "S1", "S2"]);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let frame = SampleFrame::from_records(vec![SampleRecord {
            run_id: "R1".to_string(),
            ..SampleRecord::default()
        }]);
        let err = OrdinationFrame::single_study(&test_result(), &frame).unwrap_err();
        assert!(matches!(
            err,
            MicrovizError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_group_values_sorted_distinct() {
        let frame = OrdinationFrame::all_biomes(
            &test_result(),
            &test_frame(),
            &test_assignments(),
            &test_catalog(),
        )
        .unwrap();
        assert_eq!(frame.group_values(GroupBy::Biome), vec!["Marine", "Soil"]);
        assert_eq!(
            frame.group_values(GroupBy::Country),
            vec!["Chile", "Norway"]
        );
        assert!(frame.group_values(GroupBy::SpecificBiome).is_empty());
    }

    #[test]
    fn test_group_by_round_trips_names() {
        for group in [
            GroupBy::Biome,
            GroupBy::Study,
            GroupBy::StudyAndBiome,
            GroupBy::Country,
            GroupBy::ExperimentType,
            GroupBy::PipelineVersion,
            GroupBy::Platform,
            GroupBy::SpecificBiome,
        ] {
            let parsed: GroupBy = group.to_string().parse().unwrap();
            assert_eq!(parsed, group);
        }
        assert!("nonsense".parse::<GroupBy>().is_err());
    }

    #[test]
    fn test_capitalize_matches_display_rules() {
        assert_eq!(capitalize("metagenomic"), "Metagenomic");
        assert_eq!(capitalize("AMPLICON"), "Amplicon");
        assert_eq!(capitalize(""), "");
    }
}
