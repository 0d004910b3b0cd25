//! Data structures for abundance tables, sample metadata, and studies.

mod abundance;
mod metadata;
mod studies;

pub use abundance::{
    load_study_table, locate_study_table, pool_tables, AbundanceTable, PooledTable,
    TaxonomicRank, TopTaxon,
};
pub use metadata::{RunMetadata, SampleMetadata, RUN_ID_COLUMN};
pub use studies::{StudyAssignments, StudyCatalog, BIOME_COLUMN, STUDY_ID_COLUMN};
