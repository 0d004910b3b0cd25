//! GraphML reader.
//!
//! Event-driven parse of the subset of GraphML the dashboard graphs use:
//! `<key>` declarations (with `<default>`), flat `<graph>` elements, and
//! `<node>`/`<edge>` elements with `<data>` children. Attribute values are
//! stored by their declared `attr.name`; edge data named `source` or
//! `target` is discarded because those names collide with the edge
//! endpoints themselves.

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use super::model::{EdgeAttrs, Network, NodeAttrs};
use crate::error::{MicrovizError, Result};

/// Parse a GraphML file into a [`Network`].
pub fn read_graphml<P: AsRef<Path>>(path: P) -> Result<Network> {
    let reader = Reader::from_file(path.as_ref())?;
    read_from(reader)
}

/// Parse GraphML from an in-memory string.
pub fn read_graphml_str(xml: &str) -> Result<Network> {
    read_from(Reader::from_str(xml))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum KeyDomain {
    Node,
    Edge,
    All,
}

impl KeyDomain {
    fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("node") => KeyDomain::Node,
            Some("edge") => KeyDomain::Edge,
            _ => KeyDomain::All,
        }
    }

    fn applies_to_nodes(self) -> bool {
        self != KeyDomain::Edge
    }

    fn applies_to_edges(self) -> bool {
        self != KeyDomain::Node
    }
}

#[derive(Debug, Clone)]
struct KeyDef {
    name: String,
    domain: KeyDomain,
    default: Option<String>,
}

#[derive(Default)]
struct Parser {
    network: Network,
    keys: HashMap<String, KeyDef>,
    pending_key: Option<(String, KeyDef)>,
    in_default: bool,
    pending_node: Option<NodeAttrs>,
    pending_edge: Option<(String, String, EdgeAttrs)>,
    current_data: Option<String>,
}

fn read_from<R: BufRead>(mut reader: Reader<R>) -> Result<Network> {
    reader.config_mut().trim_text(true);
    let mut parser = Parser::default();
    let mut buf = Vec::new();
    loop {
        let position = reader.buffer_position() as u64;
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => parser.open(&e, false, position)?,
            Event::Empty(e) => parser.open(&e, true, position)?,
            Event::Text(e) => {
                let text = e.unescape().map_err(quick_xml::Error::from)?;
                parser.text(&text);
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                parser.text(&String::from_utf8_lossy(&raw));
            }
            Event::End(e) => parser.close(e.local_name().as_ref()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(parser.network)
}

impl Parser {
    fn open(&mut self, element: &BytesStart<'_>, is_empty: bool, position: u64) -> Result<()> {
        match element.local_name().as_ref() {
            b"key" => {
                let id = require_attr(element, "id", "key", position)?;
                let name = attr_value(element, "attr.name")?.unwrap_or_else(|| id.clone());
                let domain = KeyDomain::from_attr(attr_value(element, "for")?.as_deref());
                let def = KeyDef {
                    name,
                    domain,
                    default: None,
                };
                if is_empty {
                    self.keys.insert(id, def);
                } else {
                    self.pending_key = Some((id, def));
                }
            }
            b"default" => {
                if let Some((_, def)) = self.pending_key.as_mut() {
                    if is_empty {
                        def.default = Some(String::new());
                    } else {
                        self.in_default = true;
                        def.default = Some(String::new());
                    }
                }
            }
            b"graph" => {
                let directed = attr_value(element, "edgedefault")?.as_deref() == Some("directed");
                self.network = Network::new(directed);
            }
            b"node" => {
                let id = require_attr(element, "id", "node", position)?;
                let attrs = NodeAttrs::named(id);
                if is_empty {
                    self.finish_node(attrs);
                } else {
                    self.pending_node = Some(attrs);
                }
            }
            b"edge" => {
                let source = require_attr(element, "source", "edge", position)?;
                let target = require_attr(element, "target", "edge", position)?;
                let pending = (source, target, EdgeAttrs::default());
                if is_empty {
                    self.finish_edge(pending);
                } else {
                    self.pending_edge = Some(pending);
                }
            }
            b"data" => {
                let key = require_attr(element, "key", "data", position)?;
                let name = match self.keys.get(&key) {
                    Some(def) => def.name.clone(),
                    None => {
                        warn!("data references undeclared key '{}'", key);
                        key
                    }
                };
                if is_empty {
                    self.append_data(&name, "");
                } else {
                    self.current_data = Some(name);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if self.in_default {
            if let Some((_, def)) = self.pending_key.as_mut() {
                if let Some(default) = def.default.as_mut() {
                    default.push_str(text);
                }
            }
        } else if let Some(name) = self.current_data.clone() {
            self.append_data(&name, text);
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"key" => {
                if let Some((id, def)) = self.pending_key.take() {
                    self.keys.insert(id, def);
                }
            }
            b"default" => self.in_default = false,
            b"data" => self.current_data = None,
            b"node" => {
                if let Some(attrs) = self.pending_node.take() {
                    self.finish_node(attrs);
                }
            }
            b"edge" => {
                if let Some(pending) = self.pending_edge.take() {
                    self.finish_edge(pending);
                }
            }
            _ => {}
        }
    }

    fn append_data(&mut self, name: &str, text: &str) {
        let slot = if let Some(node) = self.pending_node.as_mut() {
            node.data.entry(name.to_string()).or_default()
        } else if let Some((_, _, edge)) = self.pending_edge.as_mut() {
            edge.data.entry(name.to_string()).or_default()
        } else {
            return;
        };
        slot.push_str(text);
    }

    fn finish_node(&mut self, mut attrs: NodeAttrs) {
        for def in self.keys.values() {
            if def.domain.applies_to_nodes() {
                if let Some(default) = &def.default {
                    attrs
                        .data
                        .entry(def.name.clone())
                        .or_insert_with(|| default.clone());
                }
            }
        }
        self.network.add_node(attrs);
    }

    fn finish_edge(&mut self, (source, target, mut attrs): (String, String, EdgeAttrs)) {
        for def in self.keys.values() {
            if def.domain.applies_to_edges() {
                if let Some(default) = &def.default {
                    attrs
                        .data
                        .entry(def.name.clone())
                        .or_insert_with(|| default.clone());
                }
            }
        }
        // these attribute names collide with the endpoint fields
        attrs.data.remove("source");
        attrs.data.remove("target");
        self.network.add_edge(&source, &target, attrs);
    }
}

fn attr_value(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    let found = element
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?;
    match found {
        Some(attribute) => {
            let value = attribute
                .unescape_value()
                .map_err(quick_xml::Error::from)?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

fn require_attr(
    element: &BytesStart<'_>,
    name: &str,
    context: &str,
    position: u64,
) -> Result<String> {
    attr_value(element, name)?.ok_or_else(|| {
        MicrovizError::Graphml(format!(
            "<{}> without '{}' attribute (byte {})",
            context, name, position
        ))
    })
}
