//! Workflow graph model: nodes with typed ports, directed edges between
//! output and input ports, and the editing operations that keep the two
//! consistent.
//!
//! A `Graph` is what the canvas edits and what a run snapshots. It never
//! holds an edge whose endpoints are missing, never holds two edges between
//! the same pair of ports, and remembers insertion order so that ordering
//! decisions downstream are reproducible.

pub mod edge;
pub mod flow;
pub mod node;

pub use edge::Edge;
pub use flow::{FlowDocument, Graph};
pub use node::Node;
