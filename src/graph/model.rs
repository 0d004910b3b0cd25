//! In-memory property graph shared by loaders, enrichers and exporters.
//!
//! Nodes are keyed by the stable string ids used in GraphML files; a
//! side index maps them to petgraph indices so lookups stay O(1).

use log::warn;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::HashMap;

/// Attributes carried by one node.
///
/// `data` holds the raw declared attributes by name; the typed fields are
/// filled in by enrichment and consumed by exporters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeAttrs {
    pub id: String,
    pub label: Option<String>,
    pub size: Option<f64>,
    pub color: Option<String>,
    pub border_color: Option<String>,
    pub data: HashMap<String, String>,
}

impl NodeAttrs {
    /// Node with an id and nothing else.
    pub fn named(id: impl Into<String>) -> Self {
        NodeAttrs {
            id: id.into(),
            ..NodeAttrs::default()
        }
    }

    /// Display label, falling back to the node id.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    /// Numeric value of a declared attribute.
    ///
    /// A missing attribute reads as 0; a non-numeric one is logged and
    /// also reads as 0.
    pub fn metric_value(&self, key: &str) -> f64 {
        match self.data.get(key) {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(value) => value,
                Err(_) => {
                    warn!(
                        "node '{}': attribute '{}' is not numeric ('{}'), using 0",
                        self.id, key, raw
                    );
                    0.0
                }
            },
            None => 0.0,
        }
    }
}

/// Attributes carried by one edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EdgeAttrs {
    pub label: Option<String>,
    pub color: Option<String>,
    pub data: HashMap<String, String>,
}

/// Property graph with string node ids.
///
/// Storage is always a [`DiGraph`]; `directed` records what the source
/// file declared so exports can preserve it.
#[derive(Debug, Clone, Default)]
pub struct Network {
    graph: DiGraph<NodeAttrs, EdgeAttrs>,
    node_index: HashMap<String, NodeIndex>,
    directed: bool,
}

impl Network {
    pub fn new(directed: bool) -> Self {
        Network {
            graph: DiGraph::new(),
            node_index: HashMap::new(),
            directed,
        }
    }

    #[inline]
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn n_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Insert a node, replacing the attributes of an existing id.
    pub fn add_node(&mut self, attrs: NodeAttrs) -> NodeIndex {
        match self.node_index.get(&attrs.id) {
            Some(&idx) => {
                self.graph[idx] = attrs;
                idx
            }
            None => {
                let id = attrs.id.clone();
                let idx = self.graph.add_node(attrs);
                self.node_index.insert(id, idx);
                idx
            }
        }
    }

    /// Insert an edge, creating bare endpoints for ids not yet declared.
    pub fn add_edge(&mut self, source: &str, target: &str, attrs: EdgeAttrs) -> EdgeIndex {
        let s = self.ensure_node(source);
        let t = self.ensure_node(target);
        self.graph.add_edge(s, t, attrs)
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        match self.node_index.get(id) {
            Some(&idx) => idx,
            None => self.add_node(NodeAttrs::named(id)),
        }
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&NodeAttrs> {
        self.node_index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut NodeAttrs> {
        match self.node_index.get(id) {
            Some(&idx) => Some(&mut self.graph[idx]),
            None => None,
        }
    }

    /// Node attributes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeAttrs> {
        self.graph.node_weights()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut NodeAttrs> {
        self.graph.node_weights_mut()
    }

    /// Edges as (source id, target id, attributes), in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &EdgeAttrs)> {
        self.graph.edge_references().map(|edge| {
            (
                self.graph[edge.source()].id.as_str(),
                self.graph[edge.target()].id.as_str(),
                edge.weight(),
            )
        })
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut EdgeAttrs> {
        self.graph.edge_weights_mut()
    }

    /// First edge between two node ids, if any.
    pub fn edge_between(&self, source: &str, target: &str) -> Option<&EdgeAttrs> {
        let s = *self.node_index.get(source)?;
        let t = *self.node_index.get(target)?;
        self.graph.find_edge(s, t).map(|e| &self.graph[e])
    }
}
