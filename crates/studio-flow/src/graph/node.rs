use serde::{Deserialize, Serialize};

use studio_core::types::{NodeInvocation, NodeStatus, Port, Position};

/// A unit of work on the canvas.
///
/// The port list is fixed when the node is created; only edges referencing
/// the ports change afterwards. `config` is opaque to the engine and handed
/// untouched to the node action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier for this node.
    pub id: String,
    /// Role tag (input, agent, condition, action, output, ...).
    pub kind: String,
    /// Connection points, in declaration order.
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub status: NodeStatus,
}

impl Node {
    /// Create an idle node with no config.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, ports: Vec<Port>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            ports,
            position: Position::default(),
            config: serde_json::Map::new(),
            status: NodeStatus::Idle,
        }
    }

    /// Set the canvas position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Set the opaque config.
    pub fn with_config(mut self, config: serde_json::Map<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    /// Look up a port by id.
    pub fn port(&self, port_id: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == port_id)
    }

    pub fn input_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_input())
    }

    pub fn output_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_output())
    }

    /// Input ports that must be connected before the node can run.
    pub fn required_inputs(&self) -> impl Iterator<Item = &Port> {
        self.input_ports().filter(|p| p.required)
    }

    /// First duplicated port id, if any.
    pub(crate) fn duplicate_port(&self) -> Option<&str> {
        self.ports.iter().enumerate().find_map(|(i, p)| {
            self.ports[..i]
                .iter()
                .any(|q| q.id == p.id)
                .then_some(p.id.as_str())
        })
    }

    /// What the node action sees when this node executes.
    pub fn invocation(&self) -> NodeInvocation {
        NodeInvocation {
            node_id: self.id.clone(),
            kind: self.kind.clone(),
            config: self.config.clone(),
        }
    }
}
