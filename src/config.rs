//! Dashboard configuration.
//!
//! All paths, catalog cleanup rules, and graph style tables live in one YAML
//! document that is deserialized once and passed explicitly into the
//! analysis functions. Nothing in this crate reads configuration from
//! global state.

use crate::error::{MicrovizError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Style entry for one knowledge-graph node label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStyle {
    pub color: String,
    #[serde(rename = "border-color")]
    pub border_color: String,
}

/// Style entry for one knowledge-graph edge label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeStyle {
    pub color: String,
}

/// Merged abundance/taxonomy file pair for a single biome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiomeFiles {
    pub abundance: PathBuf,
    pub taxonomy: Option<PathBuf>,
    pub samples: Option<PathBuf>,
    /// Per-sample study assignments for this biome.
    pub study_ids: Option<PathBuf>,
}

/// Merged files spanning every biome: the inputs of the all-biomes flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllBiomesFiles {
    pub abundance: PathBuf,
    pub samples: PathBuf,
    pub study_ids: PathBuf,
}

/// Cleanup rules applied when loading the study catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogOptions {
    /// Biome lineage strings rewritten to short display labels.
    #[serde(default)]
    pub biome_renames: HashMap<String, String>,
    /// Study accessions dropped from the catalog.
    #[serde(default)]
    pub exclude_studies: Vec<String>,
    /// Prefix stripped from the `biome` column, e.g. `root:Engineered:`.
    #[serde(default)]
    pub strip_biome_prefix: Option<String>,
}

/// Top-level configuration document.
///
/// The graph path tables map biome name (spaces replaced by underscores)
/// and experiment type to a path stem; [`DashboardConfig::association_network_path`]
/// and [`DashboardConfig::knowledge_subgraph_path`] append the `.graphml`
/// extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Directory holding per-study abundance tables, one subdirectory per
    /// study accession.
    pub abundance_dir: Option<PathBuf>,
    /// Study catalog CSV.
    pub studies_file: Option<PathBuf>,
    #[serde(default)]
    pub catalog: CatalogOptions,
    /// Merged files per biome, keyed by biome name.
    #[serde(default)]
    pub merged_files_per_biome: HashMap<String, BiomeFiles>,
    pub merged_files_allbiomes: Option<AllBiomesFiles>,
    /// Association network path stems: biome -> experiment type -> stem.
    #[serde(default)]
    pub microbial_asso_nets: HashMap<String, HashMap<String, String>>,
    /// Knowledge-graph subgraph path stems: biome -> experiment type -> stem.
    #[serde(default)]
    pub knowledge_graphs: HashMap<String, HashMap<String, String>>,
    /// Path stem of the complete knowledge graph.
    pub complete_kg: Option<String>,
    /// Node styles keyed by node label.
    #[serde(default)]
    pub kg_nodes: HashMap<String, NodeStyle>,
    /// Edge styles keyed by edge label.
    #[serde(default)]
    pub kg_edges: HashMap<String, EdgeStyle>,
}

impl DashboardConfig {
    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Load from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(MicrovizError::from)
    }

    /// Save to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(MicrovizError::from)
    }

    /// Resolve the GraphML path of an association network.
    ///
    /// `biome` may contain spaces; the lookup key uses underscores.
    pub fn association_network_path(&self, biome: &str, experiment: &str) -> Result<PathBuf> {
        let key = biome.replace(' ', "_");
        let stem = self
            .microbial_asso_nets
            .get(&key)
            .and_then(|by_exp| by_exp.get(experiment))
            .ok_or_else(|| {
                MicrovizError::InvalidParameter(format!(
                    "no association network configured for '{}' / '{}'",
                    biome, experiment
                ))
            })?;
        Ok(PathBuf::from(format!("{}.graphml", stem)))
    }

    /// Resolve the GraphML path of a knowledge-graph subgraph.
    pub fn knowledge_subgraph_path(&self, biome: &str, experiment: &str) -> Result<PathBuf> {
        let key = biome.replace(' ', "_");
        let stem = self
            .knowledge_graphs
            .get(&key)
            .and_then(|by_exp| by_exp.get(experiment))
            .ok_or_else(|| {
                MicrovizError::InvalidParameter(format!(
                    "no knowledge subgraph configured for '{}' / '{}'",
                    biome, experiment
                ))
            })?;
        Ok(PathBuf::from(format!("{}.graphml", stem)))
    }

    /// Resolve the GraphML path of the complete knowledge graph.
    pub fn complete_kg_path(&self) -> Result<PathBuf> {
        let stem = self.complete_kg.as_ref().ok_or_else(|| {
            MicrovizError::InvalidParameter("no complete knowledge graph configured".to_string())
        })?;
        Ok(PathBuf::from(format!("{}.graphml", stem)))
    }
}
