//! Graph export: GraphML, CSV edge list, and Cytoscape JSON.
//!
//! Enriched display fields (label, size, colors) are written alongside the
//! raw declared attributes so downstream viewers see one flat attribute
//! set per element.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

use super::model::{EdgeAttrs, Network, NodeAttrs};
use crate::error::Result;

const GRAPHML_NS: &str = "http://graphml.graphdrawing.org/xmlns";

/// Write a network as GraphML.
///
/// Keys are declared for the union of attribute names seen on any node or
/// edge, in sorted order, so output is deterministic.
pub fn write_graphml<P: AsRef<Path>>(network: &Network, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new("graphml");
    root.push_attribute(("xmlns", GRAPHML_NS));
    writer.write_event(Event::Start(root))?;

    let node_keys = node_attr_names(network);
    let edge_keys = edge_attr_names(network);
    let mut next_id = 0usize;
    let node_key_ids = write_keys(&mut writer, &node_keys, "node", &mut next_id)?;
    let edge_key_ids = write_keys(&mut writer, &edge_keys, "edge", &mut next_id)?;

    let mut graph = BytesStart::new("graph");
    graph.push_attribute((
        "edgedefault",
        if network.is_directed() {
            "directed"
        } else {
            "undirected"
        },
    ));
    writer.write_event(Event::Start(graph))?;

    for node in network.nodes() {
        let mut start = BytesStart::new("node");
        start.push_attribute(("id", node.id.as_str()));
        let values: Vec<(&str, String)> = node_keys
            .iter()
            .zip(&node_key_ids)
            .filter_map(|(name, key_id)| {
                node_value(node, name).map(|v| (key_id.as_str(), v))
            })
            .collect();
        write_element(&mut writer, start, "node", &values)?;
    }

    for (source, target, attrs) in network.edges() {
        let mut start = BytesStart::new("edge");
        start.push_attribute(("source", source));
        start.push_attribute(("target", target));
        let values: Vec<(&str, String)> = edge_keys
            .iter()
            .zip(&edge_key_ids)
            .filter_map(|(name, key_id)| {
                edge_value(attrs, name).map(|v| (key_id.as_str(), v))
            })
            .collect();
        write_element(&mut writer, start, "edge", &values)?;
    }

    writer.write_event(Event::End(BytesEnd::new("graph")))?;
    writer.write_event(Event::End(BytesEnd::new("graphml")))?;
    writer.into_inner().flush()?;
    Ok(())
}

/// Write a network as a CSV edge list.
///
/// Columns are `source`, `target`, `label`, `color`, then the sorted
/// union of remaining edge attributes; missing values are left empty.
pub fn write_edge_list<P: AsRef<Path>>(network: &Network, path: P) -> Result<()> {
    let extra: Vec<String> = {
        let mut names = BTreeSet::new();
        for (_, _, attrs) in network.edges() {
            names.extend(attrs.data.keys().cloned());
        }
        names.remove("label");
        names.remove("color");
        names.into_iter().collect()
    };

    let mut writer = csv::Writer::from_path(path.as_ref())?;
    let mut header = vec![
        "source".to_string(),
        "target".to_string(),
        "label".to_string(),
        "color".to_string(),
    ];
    header.extend(extra.iter().cloned());
    writer.write_record(&header)?;

    for (source, target, attrs) in network.edges() {
        let mut row = vec![
            source.to_string(),
            target.to_string(),
            attrs
                .label
                .clone()
                .or_else(|| attrs.data.get("label").cloned())
                .unwrap_or_default(),
            attrs
                .color
                .clone()
                .or_else(|| attrs.data.get("color").cloned())
                .unwrap_or_default(),
        ];
        for name in &extra {
            row.push(attrs.data.get(name).cloned().unwrap_or_default());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a network in Cytoscape JSON form.
///
/// Every element carries a flat `data` object; node entries additionally
/// get `id`, `value` and `name` set to the node id, edge entries get
/// `source` and `target`, each overwriting any same-named attribute.
pub fn write_cytoscape_json<P: AsRef<Path>>(network: &Network, path: P) -> Result<()> {
    let nodes: Vec<Value> = network.nodes().map(node_json).collect();
    let edges: Vec<Value> = network
        .edges()
        .map(|(source, target, attrs)| edge_json(source, target, attrs))
        .collect();
    let document = serde_json::json!({
        "data": [],
        "directed": network.is_directed(),
        "multigraph": false,
        "elements": {
            "nodes": nodes,
            "edges": edges,
        },
    });
    let file = File::create(path.as_ref())?;
    serde_json::to_writer_pretty(BufWriter::new(file), &document)?;
    Ok(())
}

fn node_json(node: &NodeAttrs) -> Value {
    let mut data = Map::new();
    for (k, v) in &node.data {
        data.insert(k.clone(), Value::String(v.clone()));
    }
    if let Some(label) = &node.label {
        data.insert("label".to_string(), Value::String(label.clone()));
    }
    if let Some(size) = node.size {
        data.insert("size".to_string(), Value::from(size));
    }
    if let Some(color) = &node.color {
        data.insert("color".to_string(), Value::String(color.clone()));
    }
    if let Some(border) = &node.border_color {
        data.insert("border-color".to_string(), Value::String(border.clone()));
    }
    data.insert("id".to_string(), Value::String(node.id.clone()));
    data.insert("value".to_string(), Value::String(node.id.clone()));
    data.insert("name".to_string(), Value::String(node.id.clone()));
    serde_json::json!({ "data": data })
}

fn edge_json(source: &str, target: &str, attrs: &EdgeAttrs) -> Value {
    let mut data = Map::new();
    for (k, v) in &attrs.data {
        data.insert(k.clone(), Value::String(v.clone()));
    }
    if let Some(label) = &attrs.label {
        data.insert("label".to_string(), Value::String(label.clone()));
    }
    if let Some(color) = &attrs.color {
        data.insert("color".to_string(), Value::String(color.clone()));
    }
    data.insert("source".to_string(), Value::String(source.to_string()));
    data.insert("target".to_string(), Value::String(target.to_string()));
    serde_json::json!({ "data": data })
}

fn write_keys<W: std::io::Write>(
    writer: &mut Writer<W>,
    names: &[String],
    domain: &str,
    next_id: &mut usize,
) -> Result<Vec<String>> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id = format!("d{}", *next_id);
        *next_id += 1;
        let mut key = BytesStart::new("key");
        key.push_attribute(("id", id.as_str()));
        key.push_attribute(("for", domain));
        key.push_attribute(("attr.name", name.as_str()));
        key.push_attribute(("attr.type", attr_type(name)));
        writer.write_event(Event::Empty(key))?;
        ids.push(id);
    }
    Ok(ids)
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    start: BytesStart<'_>,
    end: &str,
    values: &[(&str, String)],
) -> Result<()> {
    if values.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for (key_id, value) in values {
        let mut data = BytesStart::new("data");
        data.push_attribute(("key", *key_id));
        writer.write_event(Event::Start(data))?;
        writer.write_event(Event::Text(BytesText::new(value)))?;
        writer.write_event(Event::End(BytesEnd::new("data")))?;
    }
    writer.write_event(Event::End(BytesEnd::new(end)))?;
    Ok(())
}

fn attr_type(name: &str) -> &'static str {
    if name == "size" {
        "double"
    } else {
        "string"
    }
}

fn node_attr_names(network: &Network) -> Vec<String> {
    let mut names = BTreeSet::new();
    for node in network.nodes() {
        names.extend(node.data.keys().cloned());
        if node.label.is_some() {
            names.insert("label".to_string());
        }
        if node.size.is_some() {
            names.insert("size".to_string());
        }
        if node.color.is_some() {
            names.insert("color".to_string());
        }
        if node.border_color.is_some() {
            names.insert("border-color".to_string());
        }
    }
    names.into_iter().collect()
}

fn edge_attr_names(network: &Network) -> Vec<String> {
    let mut names = BTreeSet::new();
    for (_, _, attrs) in network.edges() {
        names.extend(attrs.data.keys().cloned());
        if attrs.label.is_some() {
            names.insert("label".to_string());
        }
        if attrs.color.is_some() {
            names.insert("color".to_string());
        }
    }
    names.into_iter().collect()
}

/// Enriched field when set, declared attribute otherwise.
fn node_value(node: &NodeAttrs, name: &str) -> Option<String> {
    match name {
        "label" if node.label.is_some() => node.label.clone(),
        "size" if node.size.is_some() => node.size.map(|s| s.to_string()),
        "color" if node.color.is_some() => node.color.clone(),
        "border-color" if node.border_color.is_some() => node.border_color.clone(),
        _ => node.data.get(name).cloned(),
    }
}

fn edge_value(attrs: &EdgeAttrs, name: &str) -> Option<String> {
    match name {
        "label" if attrs.label.is_some() => attrs.label.clone(),
        "color" if attrs.color.is_some() => attrs.color.clone(),
        _ => attrs.data.get(name).cloned(),
    }
}
