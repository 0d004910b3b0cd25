//! Analytical core of a microbiome exploration dashboard.
//!
//! This library turns MGnify-style study exports into the objects a
//! dashboard plots: Bray-Curtis dissimilarity matrices, PCoA embeddings,
//! and visually annotated association networks and knowledge-graph
//! subgraphs.
//!
//! # Overview
//!
//! The library is organized around the analysis flow:
//!
//! - **data**: abundance tables, run metadata, study catalog and assignments
//! - **diversity**: Bray-Curtis dissimilarity and the per-view wrappers
//! - **ordination**: PCoA projection and plot-grouping joins
//! - **graph**: GraphML loading, visual enrichment, export
//! - **config**: the YAML document naming files and style tables
//! - **cache**: session-scoped memoization of expensive loads
//!
//! # Example
//!
//! ```no_run
//! use microviz::prelude::*;
//! use std::path::Path;
//!
//! // Load one study at genus rank and embed its samples
//! let table = load_study_table(Path::new("data/abundance"), "MGYS00001", TaxonomicRank::Genus).unwrap();
//! let metadata = SampleMetadata::from_csv("data/abundance/MGYS00001_samples.csv").unwrap();
//! let beta = beta_diversity_study(&table, &metadata).unwrap();
//! let embedding = pcoa(&beta.matrix).unwrap();
//!
//! // Style an association network for display
//! let mut network = read_graphml("nets/human_gut_metagenomic.graphml").unwrap();
//! style_association_network(&mut network, SizeRange::ASSOCIATION);
//! ```

pub mod cache;
pub mod config;
pub mod data;
pub mod diversity;
pub mod error;
pub mod graph;
pub mod ordination;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::cache::AnalysisCache;
    pub use crate::config::{
        AllBiomesFiles, BiomeFiles, CatalogOptions, DashboardConfig, EdgeStyle, NodeStyle,
    };
    pub use crate::data::{
        load_study_table, locate_study_table, pool_tables, AbundanceTable, PooledTable,
        RunMetadata, SampleMetadata, StudyAssignments, StudyCatalog, TaxonomicRank, TopTaxon,
    };
    pub use crate::diversity::{
        beta_diversity_all_biomes, beta_diversity_comparison, beta_diversity_single_biome,
        beta_diversity_study, bray_curtis, BetaDiversity, DissimilarityMatrix, SampleFrame,
        SampleRecord,
    };
    pub use crate::error::{MicrovizError, Result};
    pub use crate::graph::{
        read_graphml, read_graphml_str, style_association_network, style_knowledge_subgraph,
        write_cytoscape_json, write_edge_list, write_graphml, EdgeAttrs, Network, NodeAttrs,
        SizeRange,
    };
    pub use crate::ordination::{pcoa, FrameRecord, GroupBy, OrdinationFrame, OrdinationResult};
}
