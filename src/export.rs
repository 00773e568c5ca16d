//! Network export
//!
//! GraphML for graph tools and a node/link JSON document for web rendering.
//! Node ids in both formats are the stable node keys (`org:<id>`,
//! `person:<id>`), never the view-local dense ids.

use crate::graph::{Network, NodeKey, PropertyMap, PropertyValue};
use crate::metrics::MetricStore;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;

const GRAPHML_NS: &str = "http://graphml.graphdrawing.org/xmlns";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("XML error: {0}")]
    Xml(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    GraphMl,
    Json,
}

impl ExportFormat {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "graphml" => Some(ExportFormat::GraphMl),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::GraphMl => "graphml",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebNode {
    pub id: String,
    pub label: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub influence: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub degraded: bool,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebLink {
    pub source: String,
    pub target: String,
    pub kind: String,
    pub weight: f64,
    pub properties: PropertyMap,
}

/// Node/link document consumed by force-directed renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebGraph {
    pub nodes: Vec<WebNode>,
    pub links: Vec<WebLink>,
}

/// Flattened node attributes, with influence merged in when metrics are given
fn node_attributes(network: &Network, metrics: Option<&MetricStore>) -> Vec<(String, PropertyMap)> {
    network
        .nodes()
        .iter()
        .map(|node| {
            let mut props = node.properties.clone();
            props.insert("label".into(), node.label.as_str().into());
            props.insert("kind".into(), node.kind().as_str().into());
            if let Some(report) = metrics.and_then(|m| m.influence(&node.key)) {
                props.insert("influence".into(), report.influence_score.into());
                props.insert("degraded".into(), report.degraded.into());
            }
            (node_id(&node.key), props)
        })
        .collect()
}

fn node_id(key: &NodeKey) -> String {
    key.to_string()
}

pub fn to_web_graph(network: &Network, metrics: Option<&MetricStore>) -> WebGraph {
    let nodes = network
        .nodes()
        .iter()
        .map(|node| {
            let report = metrics.and_then(|m| m.influence(&node.key));
            WebNode {
                id: node_id(&node.key),
                label: node.label.clone(),
                kind: node.kind().as_str().to_string(),
                influence: report.as_ref().map(|r| r.influence_score),
                degraded: report.map_or(false, |r| r.degraded),
                properties: node.properties.clone(),
            }
        })
        .collect();

    let links = network
        .edges()
        .iter()
        .filter_map(|edge| {
            Some(WebLink {
                source: node_id(&network.node(edge.source)?.key),
                target: node_id(&network.node(edge.target)?.key),
                kind: edge.kind.as_str().to_string(),
                weight: edge.weight,
                properties: edge.properties(),
            })
        })
        .collect();

    WebGraph { nodes, links }
}

pub fn write_json<W: Write>(network: &Network, metrics: Option<&MetricStore>, writer: W) -> ExportResult<()> {
    serde_json::to_writer_pretty(writer, &to_web_graph(network, metrics))?;
    Ok(())
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> ExportResult<()> {
    writer.write_event(event).map_err(|e| ExportError::Xml(e.to_string()))
}

fn emit_data<W: Write>(writer: &mut Writer<W>, key: &str, value: &PropertyValue) -> ExportResult<()> {
    let mut data = BytesStart::new("data");
    data.push_attribute(("key", key));
    emit(writer, Event::Start(data))?;
    emit(writer, Event::Text(BytesText::new(&value.to_string())))?;
    emit(writer, Event::End(BytesEnd::new("data")))
}

/// Declare one `<key>` per attribute name seen, typed by its first value
fn declare_keys<'a, W: Write>(
    writer: &mut Writer<W>,
    domain: &str,
    prefix: &str,
    maps: impl Iterator<Item = &'a PropertyMap>,
) -> ExportResult<BTreeMap<String, String>> {
    let mut types: BTreeMap<String, &'static str> = BTreeMap::new();
    for map in maps {
        for (name, value) in map {
            types.entry(name.clone()).or_insert_with(|| value.graphml_type());
        }
    }

    let mut ids = BTreeMap::new();
    for (name, attr_type) in types {
        let id = format!("{}_{}", prefix, name);
        let mut key = BytesStart::new("key");
        key.push_attribute(("id", id.as_str()));
        key.push_attribute(("for", domain));
        key.push_attribute(("attr.name", name.as_str()));
        key.push_attribute(("attr.type", attr_type));
        emit(writer, Event::Empty(key))?;
        ids.insert(name, id);
    }
    Ok(ids)
}

/// Write the network as an undirected GraphML document
pub fn write_graphml<W: Write>(network: &Network, metrics: Option<&MetricStore>, writer: W) -> ExportResult<()> {
    let mut xml = Writer::new_with_indent(writer, b' ', 2);
    emit(&mut xml, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut root = BytesStart::new("graphml");
    root.push_attribute(("xmlns", GRAPHML_NS));
    emit(&mut xml, Event::Start(root))?;

    let nodes = node_attributes(network, metrics);
    let edges: Vec<PropertyMap> = network
        .edges()
        .iter()
        .map(|e| {
            let mut props = e.properties();
            props.insert("kind".into(), e.kind.as_str().into());
            props
        })
        .collect();
    let node_keys = declare_keys(&mut xml, "node", "n", nodes.iter().map(|(_, p)| p))?;
    let edge_keys = declare_keys(&mut xml, "edge", "e", edges.iter())?;

    let mut graph = BytesStart::new("graph");
    graph.push_attribute(("id", "grantgraph"));
    graph.push_attribute(("edgedefault", "undirected"));
    emit(&mut xml, Event::Start(graph))?;

    for (id, props) in &nodes {
        let mut node = BytesStart::new("node");
        node.push_attribute(("id", id.as_str()));
        emit(&mut xml, Event::Start(node))?;
        for (name, value) in props {
            if let Some(key) = node_keys.get(name) {
                emit_data(&mut xml, key, value)?;
            }
        }
        emit(&mut xml, Event::End(BytesEnd::new("node")))?;
    }

    for (edge, props) in network.edges().iter().zip(&edges) {
        let (Some(source), Some(target)) = (network.node(edge.source), network.node(edge.target)) else {
            continue;
        };
        let mut element = BytesStart::new("edge");
        let id = format!("e{}", edge.id.as_u64());
        let source = node_id(&source.key);
        let target = node_id(&target.key);
        element.push_attribute(("id", id.as_str()));
        element.push_attribute(("source", source.as_str()));
        element.push_attribute(("target", target.as_str()));
        emit(&mut xml, Event::Start(element))?;
        for (name, value) in props {
            if let Some(key) = edge_keys.get(name) {
                emit_data(&mut xml, key, value)?;
            }
        }
        emit(&mut xml, Event::End(BytesEnd::new("edge")))?;
    }

    emit(&mut xml, Event::End(BytesEnd::new("graph")))?;
    emit(&mut xml, Event::End(BytesEnd::new("graphml")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GrantDraft, GraphFilter, GraphStore, RoleDraft};
    use crate::identity::PersonCandidate;
    use crate::metrics::{ComputeMode, MetricsEngine};

    fn network() -> Network {
        let mut store = GraphStore::new();
        store.ensure_organization(&"F".into(), Some("Fund & Trust"));
        store.ensure_organization(&"R".into(), Some("Food Bank"));
        store
            .upsert_grant(GrantDraft {
                funder: "F".into(),
                recipient: "R".into(),
                recipient_name: None,
                amount: 2_500.0,
                year: 2022,
                purpose: Some("Meals <daily>".into()),
            })
            .unwrap();
        let ann = store
            .resolve_person(&PersonCandidate::new("Ann Lee", "990", "r1").unwrap())
            .person_id();
        store
            .upsert_role(RoleDraft {
                person: ann,
                organization: "R".into(),
                title: "Treasurer".into(),
                start_date: None,
                end_date: None,
                source: "990".into(),
                filing_year: Some(2022),
                verified: true,
            })
            .unwrap();
        Network::rebuild(&store, &GraphFilter::default())
    }

    #[test]
    fn test_graphml_document() {
        let network = network();
        let mut out = Vec::new();
        write_graphml(&network, None, &mut out).unwrap();
        let xml = String::from_utf8(out).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("edgedefault=\"undirected\""));
        assert!(xml.contains("<key id=\"n_label\" for=\"node\" attr.name=\"label\" attr.type=\"string\"/>"));
        assert!(xml.contains("<key id=\"e_total_amount\" for=\"edge\" attr.name=\"total_amount\" attr.type=\"double\"/>"));
        assert!(xml.contains("<node id=\"org:F\">"));
        assert!(xml.contains("source=\"org:F\" target=\"org:R\""));
        assert!(xml.contains("Fund &amp; Trust"));
        assert!(xml.contains("Meals &lt;daily&gt;"));
        assert_eq!(xml.matches("<node ").count(), 3);
        assert_eq!(xml.matches("<edge ").count(), 2);
    }

    #[test]
    fn test_web_graph_with_metrics() {
        let network = network();
        let mut metrics = MetricStore::new();
        for run in MetricsEngine::default().compute_all(&network, ComputeMode::Full) {
            metrics.publish(run);
        }

        let web = to_web_graph(&network, Some(&metrics));
        assert_eq!(web.nodes.len(), 3);
        assert_eq!(web.links.len(), 2);
        let funder = web.nodes.iter().find(|n| n.id == "org:F").unwrap();
        assert_eq!(funder.kind, "organization");
        assert!(funder.influence.is_some());
        assert!(!funder.degraded);

        let mut out = Vec::new();
        write_json(&network, Some(&metrics), &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["links"][0]["kind"], "role");
        assert!(parsed["nodes"][0].get("degraded").is_none());
    }

    #[test]
    fn test_format_names() {
        assert_eq!(ExportFormat::from_name("GraphML"), Some(ExportFormat::GraphMl));
        assert_eq!(ExportFormat::Json.extension(), "json");
        assert_eq!(ExportFormat::from_name("svg"), None);
    }
}
