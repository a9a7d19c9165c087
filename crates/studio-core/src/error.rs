use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    // Graph editing errors
    #[error("Unknown node kind: {0}")]
    InvalidKind(String),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Resolution errors
    #[error("Cyclic graph: nodes [{}] form a cycle", nodes.join(", "))]
    CyclicGraph { nodes: Vec<String> },

    #[error("Graph has no nodes")]
    EmptyGraph,

    #[error("Required input {port} on node {node} has no incoming edge")]
    MissingInput { node: String, port: String },

    // Execution errors
    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("Node timeout after {timeout_ms}ms: {node}")]
    NodeTimeout { node: String, timeout_ms: u64 },

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StudioError>;
