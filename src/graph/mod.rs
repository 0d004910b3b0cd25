//! Network loading, enrichment and export.
//!
//! GraphML files come in through [`read_graphml`], get their display
//! attributes computed by the `style_*` functions, and leave through the
//! writers in this module. The [`Network`] model is shared by all three
//! stages.

mod enrich;
mod export;
mod graphml;
mod model;

pub use enrich::{style_association_network, style_knowledge_subgraph, SizeRange};
pub use export::{write_cytoscape_json, write_edge_list, write_graphml};
pub use graphml::{read_graphml, read_graphml_str};
pub use model::{EdgeAttrs, Network, NodeAttrs};
