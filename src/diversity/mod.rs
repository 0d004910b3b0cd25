//! Beta-diversity computation.
//!
//! [`bray_curtis`] turns a samples-by-taxa abundance matrix into a
//! [`DissimilarityMatrix`]; the mode functions in this module wrap it with
//! the run-level metadata joins each dashboard view needs.

mod bray_curtis;
mod modes;

pub use bray_curtis::{bray_curtis, DissimilarityMatrix};
pub use modes::{
    beta_diversity_all_biomes, beta_diversity_comparison, beta_diversity_single_biome,
    beta_diversity_study, BetaDiversity, SampleFrame, SampleRecord,
};
