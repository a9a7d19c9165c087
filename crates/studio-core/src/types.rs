use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution status of a single node.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Pending,
    Running,
    Completed,
    Error,
    /// The run was cancelled while this node was executing.
    Cancelled,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Direction of a port relative to its owning node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// A connection point on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Port {
    /// Unique within the owning node only.
    pub id: String,
    pub direction: PortDirection,
    /// Input ports only: the node is not ready without an incoming edge here.
    #[serde(default)]
    pub required: bool,
}

impl Port {
    pub fn input(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Input,
            required: false,
        }
    }

    pub fn required_input(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Input,
            required: true,
        }
    }

    pub fn output(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Output,
            required: false,
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }
}

/// Canvas position. Carried for round-tripping, never interpreted by the engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, by: Position) -> Self {
        Self {
            x: self.x + by.x,
            y: self.y + by.y,
        }
    }
}

/// What a node action receives when the engine executes a node.
#[derive(Debug, Clone)]
pub struct NodeInvocation {
    pub node_id: String,
    pub kind: String,
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    NotStarted,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    /// No further node will execute in this state until a reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One line of a run's human-readable log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// Run event broadcast to all subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    /// A run began executing its first node.
    RunStarted { run_id: RunId, total_nodes: usize },
    /// A node was marked running.
    NodeStarted { run_id: RunId, node_id: String, index: usize },
    /// A node's action succeeded.
    NodeCompleted { run_id: RunId, node_id: String, elapsed_ms: u64 },
    /// A node's action failed or timed out.
    NodeFailed { run_id: RunId, node_id: String, error: String },
    /// A node was interrupted by cancellation.
    NodeCancelled { run_id: RunId, node_id: String },
    RunPaused { run_id: RunId },
    RunResumed { run_id: RunId },
    /// Every node in the order completed.
    RunCompleted { run_id: RunId, completed_nodes: usize },
    /// The run stopped on a node failure.
    RunFailed { run_id: RunId, node_id: String, error: String },
    RunCancelled { run_id: RunId },
    /// Statuses and log were cleared.
    RunReset { run_id: RunId },
}

impl FlowEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::NodeStarted { run_id, .. }
            | Self::NodeCompleted { run_id, .. }
            | Self::NodeFailed { run_id, .. }
            | Self::NodeCancelled { run_id, .. }
            | Self::RunPaused { run_id }
            | Self::RunResumed { run_id }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::RunCancelled { run_id }
            | Self::RunReset { run_id } => run_id,
        }
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted { .. } | Self::RunFailed { .. } | Self::RunCancelled { .. }
        )
    }
}
