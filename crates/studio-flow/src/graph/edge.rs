use serde::{Deserialize, Serialize};

/// A directed link from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique edge id.
    pub id: String,
    pub source_node_id: String,
    pub source_port_id: String,
    pub target_node_id: String,
    pub target_port_id: String,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: (impl Into<String>, impl Into<String>),
        target: (impl Into<String>, impl Into<String>),
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source.0.into(),
            source_port_id: source.1.into(),
            target_node_id: target.0.into(),
            target_port_id: target.1.into(),
        }
    }

    /// Whether `other` connects exactly the same two ports.
    pub fn same_endpoints(&self, other: &Edge) -> bool {
        self.source_node_id == other.source_node_id
            && self.source_port_id == other.source_port_id
            && self.target_node_id == other.target_node_id
            && self.target_port_id == other.target_port_id
    }

    /// Whether the edge starts or ends at `node_id`.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_builder() {
        let e = Edge::new("e1", ("a", "output"), ("b", "input"));
        assert_eq!(e.source_node_id, "a");
        assert_eq!(e.source_port_id, "output");
        assert_eq!(e.target_node_id, "b");
        assert_eq!(e.target_port_id, "input");
    }

    #[test]
    fn test_same_endpoints_ignores_id() {
        let a = Edge::new("e1", ("a", "output"), ("b", "input"));
        let b = Edge::new("e2", ("a", "output"), ("b", "input"));
        let c = Edge::new("e3", ("a", "output"), ("b", "context"));
        assert!(a.same_endpoints(&b));
        assert!(!a.same_endpoints(&c));
    }

    #[test]
    fn test_touches() {
        let e = Edge::new("e1", ("a", "output"), ("b", "input"));
        assert!(e.touches("a"));
        assert!(e.touches("b"));
        assert!(!e.touches("c"));
    }

    #[test]
    fn test_camel_case_json() {
        let e = Edge::new("e1", ("a", "output"), ("b", "input"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["sourceNodeId"], "a");
        assert_eq!(json["targetPortId"], "input");
    }
}
