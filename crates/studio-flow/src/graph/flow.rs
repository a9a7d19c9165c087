use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use studio_core::error::{Result, StudioError};
use studio_core::traits::PortTemplates;
use studio_core::types::{NodeStatus, Position};

use super::edge::Edge;
use super::node::Node;

/// Serialized form of a graph: `{ "nodes": [...], "edges": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A workflow graph.
///
/// Nodes and edges are kept in insertion order next to an id index, so every
/// traversal (and therefore every resolved order) is reproducible. All edits
/// go through the methods below, which keep two invariants: ids are unique,
/// and every edge endpoint names an existing node and port.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node of `kind` with the ports the template lookup supplies.
    pub fn add_node(
        &mut self,
        kind: &str,
        position: Position,
        templates: &dyn PortTemplates,
    ) -> Result<Node> {
        let id = self.fresh_id(kind);
        self.add_node_with_id(id, kind, position, templates)
    }

    /// Like [`Graph::add_node`] with a caller-chosen id.
    pub fn add_node_with_id(
        &mut self,
        id: impl Into<String>,
        kind: &str,
        position: Position,
        templates: &dyn PortTemplates,
    ) -> Result<Node> {
        let ports = templates
            .ports(kind)
            .ok_or_else(|| StudioError::InvalidKind(kind.to_string()))?;
        let node = Node::new(id, kind, ports).with_position(position);
        self.insert_node(node.clone())?;
        Ok(node)
    }

    /// Insert a fully built node. Its status is reset to idle.
    pub fn insert_node(&mut self, mut node: Node) -> Result<()> {
        if self.node_index.contains_key(&node.id) {
            return Err(StudioError::DuplicateId(node.id));
        }
        if let Some(port) = node.duplicate_port() {
            return Err(StudioError::InvalidConnection(format!(
                "node '{}' declares port '{}' twice",
                node.id, port
            )));
        }
        node.status = NodeStatus::Idle;
        debug!(node_id = %node.id, kind = %node.kind, "Node added");
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, node_id: &str) -> Result<Node> {
        let pos = self
            .node_index
            .remove(node_id)
            .ok_or_else(|| StudioError::NotFound(format!("node '{}'", node_id)))?;
        let node = self.nodes.remove(pos);

        let before = self.edges.len();
        self.edges.retain(|e| !e.touches(node_id));
        debug!(
            node_id,
            removed_edges = before - self.edges.len(),
            "Node removed"
        );

        self.rebuild_index();
        Ok(node)
    }

    /// Connect an output port to an input port on another node.
    pub fn connect(
        &mut self,
        source_node_id: &str,
        source_port_id: &str,
        target_node_id: &str,
        target_port_id: &str,
    ) -> Result<Edge> {
        let edge = Edge::new(
            format!("edge-{}", Uuid::new_v4()),
            (source_node_id, source_port_id),
            (target_node_id, target_port_id),
        );
        self.insert_edge(edge.clone())?;
        Ok(edge)
    }

    /// Insert a fully built edge after the same checks as [`Graph::connect`].
    pub fn insert_edge(&mut self, edge: Edge) -> Result<()> {
        if self.edges.iter().any(|e| e.id == edge.id) {
            return Err(StudioError::DuplicateId(edge.id));
        }
        self.validate_connection(&edge)?;
        debug!(
            edge_id = %edge.id,
            from = %edge.source_node_id,
            to = %edge.target_node_id,
            "Edge added"
        );
        self.edges.push(edge);
        Ok(())
    }

    /// Remove an edge. Returns the edge if it existed.
    pub fn disconnect(&mut self, edge_id: &str) -> Option<Edge> {
        let pos = self.edges.iter().position(|e| e.id == edge_id)?;
        Some(self.edges.remove(pos))
    }

    /// Copy a node (kind, ports, config) to a new id at a shifted position.
    /// Edges are not copied.
    pub fn duplicate_node(&mut self, node_id: &str, offset: Position) -> Result<Node> {
        let original = self
            .node(node_id)
            .ok_or_else(|| StudioError::NotFound(format!("node '{}'", node_id)))?;
        let mut copy = original.clone();
        copy.id = self.fresh_id(&original.kind);
        copy.position = original.position.offset(offset);
        copy.status = NodeStatus::Idle;
        self.insert_node(copy.clone())?;
        Ok(copy)
    }

    /// Replace a node's opaque config.
    pub fn set_config(
        &mut self,
        node_id: &str,
        config: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let node = self
            .node_mut(node_id)
            .ok_or_else(|| StudioError::NotFound(format!("node '{}'", node_id)))?;
        node.config = config;
        Ok(())
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.node_index.get(node_id).map(|&i| &self.nodes[i])
    }

    pub fn edge(&self, edge_id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == edge_id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Insertion position of a node.
    pub fn position_of(&self, node_id: &str) -> Option<usize> {
        self.node_index.get(node_id).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target_node_id == node_id)
    }

    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source_node_id == node_id)
    }

    /// Required input ports with no incoming edge, as `(node_id, port_id)`.
    pub fn unsatisfied_inputs(&self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for node in &self.nodes {
            for port in node.required_inputs() {
                let connected = self
                    .incoming(&node.id)
                    .any(|e| e.target_port_id == port.id);
                if !connected {
                    missing.push((node.id.clone(), port.id.clone()));
                }
            }
        }
        missing
    }

    /// Set every node back to idle.
    pub fn reset_statuses(&mut self) {
        for node in &mut self.nodes {
            node.status = NodeStatus::Idle;
        }
    }

    pub(crate) fn set_status(&mut self, node_id: &str, status: NodeStatus) {
        if let Some(node) = self.node_mut(node_id) {
            node.status = status;
        }
    }

    /// Export to the serializable document form.
    pub fn to_document(&self) -> FlowDocument {
        FlowDocument {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Build a graph from a document, re-checking every invariant.
    /// Node statuses in the document are kept.
    pub fn from_document(doc: FlowDocument) -> Result<Self> {
        let mut graph = Self::new();
        for node in doc.nodes {
            let status = node.status;
            let id = node.id.clone();
            graph.insert_node(node)?;
            graph.set_status(&id, status);
        }
        for edge in doc.edges {
            graph.insert_edge(edge)?;
        }
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: FlowDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    fn validate_connection(&self, edge: &Edge) -> Result<()> {
        let invalid = |reason: String| Err(StudioError::InvalidConnection(reason));

        let Some(source) = self.node(&edge.source_node_id) else {
            return invalid(format!("source node '{}' does not exist", edge.source_node_id));
        };
        let Some(target) = self.node(&edge.target_node_id) else {
            return invalid(format!("target node '{}' does not exist", edge.target_node_id));
        };
        if source.id == target.id {
            return invalid(format!("node '{}' cannot connect to itself", source.id));
        }
        match source.port(&edge.source_port_id) {
            Some(p) if p.is_output() => {}
            Some(_) => {
                return invalid(format!(
                    "port '{}' on '{}' is not an output",
                    edge.source_port_id, source.id
                ))
            }
            None => {
                return invalid(format!(
                    "node '{}' has no port '{}'",
                    source.id, edge.source_port_id
                ))
            }
        }
        match target.port(&edge.target_port_id) {
            Some(p) if p.is_input() => {}
            Some(_) => {
                return invalid(format!(
                    "port '{}' on '{}' is not an input",
                    edge.target_port_id, target.id
                ))
            }
            None => {
                return invalid(format!(
                    "node '{}' has no port '{}'",
                    target.id, edge.target_port_id
                ))
            }
        }
        if self.edges.iter().any(|e| e.same_endpoints(edge)) {
            return invalid(format!(
                "{}.{} is already connected to {}.{}",
                edge.source_node_id, edge.source_port_id, edge.target_node_id, edge.target_port_id
            ));
        }
        Ok(())
    }

    fn node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        let i = *self.node_index.get(node_id)?;
        Some(&mut self.nodes[i])
    }

    fn fresh_id(&self, kind: &str) -> String {
        loop {
            let uuid = Uuid::new_v4().simple().to_string();
            let id = format!("{}-{}", kind, &uuid[..8]);
            if !self.node_index.contains_key(&id) {
                return id;
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.node_index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
    }
}
