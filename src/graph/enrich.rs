//! Visual attribute enrichment for loaded graphs.
//!
//! Association networks are colored by cluster membership and sized by
//! degree; knowledge-graph subgraphs are styled from the configured label
//! tables and sized by betweenness centrality. Enrichment only fills the
//! typed display fields of [`Network`] nodes and edges; declared data is
//! left untouched.

use log::warn;
use std::collections::HashMap;

use super::model::Network;
use crate::config::{EdgeStyle, NodeStyle};
use crate::error::{MicrovizError, Result};

const NAME_ATTR: &str = "name";
const CLUSTER_ATTR: &str = "cluster";
const LABELS_ATTR: &str = "labels";
const EDGE_LABEL_ATTR: &str = "label";
const DEGREE_ATTR: &str = "degree";
const BETWEENNESS_ATTR: &str = "betweenness_centrality";

/// Qualitative 24-color palette cycled over cluster labels.
const CLUSTER_PALETTE: [&str; 24] = [
    "#2E91E5", "#E15F99", "#1CA71C", "#FB0D0D", "#DA16FF", "#222A2A", "#B68100", "#750D86",
    "#EB663B", "#511CFB", "#00A08B", "#FB00D1", "#FC0080", "#B2828D", "#6C7C32", "#778AAE",
    "#862A16", "#A777F1", "#620042", "#1616A7", "#DA60CA", "#6C4516", "#0D2A63", "#AF0038",
];

/// Inclusive node size bounds, in display pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeRange {
    min: f64,
    max: f64,
}

impl SizeRange {
    /// Default bounds for association-network nodes.
    pub const ASSOCIATION: SizeRange = SizeRange {
        min: 6.0,
        max: 30.0,
    };

    /// Default bounds for knowledge-graph nodes.
    pub const KNOWLEDGE: SizeRange = SizeRange {
        min: 10.0,
        max: 50.0,
    };

    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
            return Err(MicrovizError::InvalidParameter(format!(
                "invalid size range [{}, {}]",
                min, max
            )));
        }
        Ok(SizeRange { min, max })
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Map `value` from `[lo, hi]` onto the size bounds.
    ///
    /// The range endpoints map exactly onto `min` and `max`; a degenerate
    /// input range maps everything to the minimum size.
    fn rescale(&self, value: f64, lo: f64, hi: f64) -> f64 {
        if hi <= lo || value <= lo {
            return self.min;
        }
        if value >= hi {
            return self.max;
        }
        self.min + (value - lo) / (hi - lo) * (self.max - self.min)
    }
}

/// Style an association network in place.
///
/// Node size tracks the stored `degree` attribute, color comes from a
/// palette assigned over the sorted distinct `cluster` values, and the
/// display label is the `name` attribute when present, the node id
/// otherwise. Nodes without a cluster keep no color. An empty graph is
/// left untouched.
pub fn style_association_network(network: &mut Network, sizes: SizeRange) {
    let metrics: Vec<f64> = network
        .nodes()
        .map(|node| node.metric_value(DEGREE_ATTR))
        .collect();
    if metrics.is_empty() {
        return;
    }
    let (lo, hi) = bounds(&metrics);
    let palette = cluster_palette(network);
    for (node, &metric) in network.nodes_mut().zip(metrics.iter()) {
        node.size = Some(sizes.rescale(metric, lo, hi));
        node.color = node
            .data
            .get(CLUSTER_ATTR)
            .and_then(|cluster| palette.get(cluster))
            .cloned();
        node.label = Some(
            node.data
                .get(NAME_ATTR)
                .cloned()
                .unwrap_or_else(|| node.id.clone()),
        );
    }
}

/// Style a knowledge-graph subgraph in place.
///
/// Node size tracks the stored `betweenness_centrality` attribute. The
/// display label is the last `:`-separated segment of the `labels`
/// attribute and selects the node's fill and border colors from
/// `node_styles`; edge colors come from `edge_styles` keyed by the edge
/// `label` attribute. Labels with no style entry are logged and left
/// uncolored.
pub fn style_knowledge_subgraph(
    network: &mut Network,
    sizes: SizeRange,
    node_styles: &HashMap<String, NodeStyle>,
    edge_styles: &HashMap<String, EdgeStyle>,
) {
    let metrics: Vec<f64> = network
        .nodes()
        .map(|node| node.metric_value(BETWEENNESS_ATTR))
        .collect();
    if metrics.is_empty() {
        return;
    }
    let (lo, hi) = bounds(&metrics);
    for (node, &metric) in network.nodes_mut().zip(metrics.iter()) {
        node.size = Some(sizes.rescale(metric, lo, hi));
        let label = node
            .data
            .get(LABELS_ATTR)
            .map(|labels| strip_label(labels).to_string());
        match label.as_deref().and_then(|l| node_styles.get(l)) {
            Some(style) => {
                node.color = Some(style.color.clone());
                node.border_color = Some(style.border_color.clone());
            }
            None => {
                warn!(
                    "node '{}': no style for label '{}'",
                    node.id,
                    label.as_deref().unwrap_or("")
                );
                node.color = None;
                node.border_color = None;
            }
        }
        node.label = label.or_else(|| Some(node.id.clone()));
    }
    for edge in network.edges_mut() {
        let label = edge.data.get(EDGE_LABEL_ATTR).cloned();
        edge.color = match label.as_deref().and_then(|l| edge_styles.get(l)) {
            Some(style) => Some(style.color.clone()),
            None => {
                warn!(
                    "edge label '{}' has no style entry",
                    label.as_deref().unwrap_or("")
                );
                None
            }
        };
        edge.label = label;
    }
}

fn bounds(values: &[f64]) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    (lo, hi)
}

/// Sorted distinct cluster values mapped onto the palette, cycling when
/// there are more clusters than colors.
fn cluster_palette(network: &Network) -> HashMap<String, String> {
    let mut values: Vec<String> = network
        .nodes()
        .filter_map(|node| node.data.get(CLUSTER_ATTR))
        .cloned()
        .collect();
    values.sort();
    values.dedup();
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, CLUSTER_PALETTE[i % CLUSTER_PALETTE.len()].to_string()))
        .collect()
}

/// Last `:`-separated segment, so `Protein:Enzyme` and `:Enzyme` both
/// yield `Enzyme`.
fn strip_label(labels: &str) -> &str {
    labels.rsplit(':').next().unwrap_or(labels)
}
