//! Run state machine.
//!
//! A [`RunHandle`] owns a snapshot of the graph taken at start time and walks
//! its resolved order one node (or one wave) per step. Node failures never
//! surface as `Err` from stepping: they land in the node's status, the log,
//! and the run state, so a UI can render them by polling [`RunHandle::observe`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use studio_core::config::{EngineConfig, ExecutionMode};
use studio_core::error::{Result, StudioError};
use studio_core::event::EventBus;
use studio_core::traits::NodeAction;
use studio_core::types::{FlowEvent, LogEntry, NodeStatus, RunId, RunState};

use crate::graph::Graph;
use crate::resolver::{resolve_order, resolve_waves};

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on one node action; exceeding it fails the node.
    pub step_timeout: Duration,
    pub mode: ExecutionMode,
    /// Refuse to start while a required input port has no incoming edge.
    pub enforce_required_inputs: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RunOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            step_timeout: config.step_timeout(),
            mode: config.mode,
            enforce_required_inputs: config.enforce_required_inputs,
        }
    }
}

/// Read-only view of a run for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub state: RunState,
    pub order: Vec<String>,
    /// Position in `order` of the node most recently started; `None` before
    /// the first step.
    pub current_index: Option<usize>,
    /// Status of every node, in run order.
    pub node_statuses: Vec<(String, NodeStatus)>,
    pub log: Vec<LogEntry>,
}

impl RunSnapshot {
    pub fn status_of(&self, node_id: &str) -> Option<NodeStatus> {
        self.node_statuses
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, status)| *status)
    }
}

enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Drives one resolved order to completion.
pub struct RunHandle {
    run_id: RunId,
    graph: Graph,
    order: Vec<String>,
    /// Exclusive end position of each wave in `order`. Empty in sequential mode.
    wave_ends: Vec<usize>,
    action: Arc<dyn NodeAction>,
    options: RunOptions,
    state: RunState,
    resume_to: RunState,
    /// Next position in `order` to execute.
    cursor: usize,
    current_index: Option<usize>,
    log: Vec<LogEntry>,
    event_bus: Option<Arc<EventBus>>,
    cancel: CancellationToken,
}

/// Start a run with default options.
pub fn start_run(graph: &Graph, action: Arc<dyn NodeAction>) -> Result<RunHandle> {
    RunHandle::start(graph, action, RunOptions::default())
}

impl RunHandle {
    /// Resolve `graph` and prepare a run over a snapshot of it.
    ///
    /// Fails with `EmptyGraph`, `CyclicGraph`, or (when enforced)
    /// `MissingInput` without touching any node status.
    pub fn start(graph: &Graph, action: Arc<dyn NodeAction>, options: RunOptions) -> Result<Self> {
        if graph.is_empty() {
            return Err(StudioError::EmptyGraph);
        }

        let (order, wave_ends) = match options.mode {
            ExecutionMode::Sequential => (resolve_order(graph)?, Vec::new()),
            ExecutionMode::Wave => {
                let mut order = Vec::with_capacity(graph.len());
                let mut ends = Vec::new();
                for wave in resolve_waves(graph)? {
                    order.extend(wave);
                    ends.push(order.len());
                }
                (order, ends)
            }
        };

        if options.enforce_required_inputs {
            if let Some((node, port)) = graph.unsatisfied_inputs().into_iter().next() {
                return Err(StudioError::MissingInput { node, port });
            }
        }

        let mut snapshot = graph.clone();
        snapshot.reset_statuses();

        let run_id = RunId::new();
        info!(run_id = %run_id, nodes = order.len(), mode = ?options.mode, "Run prepared");

        Ok(Self {
            run_id,
            graph: snapshot,
            order,
            wave_ends,
            action,
            options,
            state: RunState::NotStarted,
            resume_to: RunState::NotStarted,
            cursor: 0,
            current_index: None,
            log: Vec::new(),
            event_bus: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Publish every transition on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// The graph snapshot this run executes, with live statuses.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Token that cancels this run from another task, including mid-step.
    /// A token taken before [`RunHandle::reset`] does not affect the new run.
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the next node in the order.
    ///
    /// No-op while paused or after the run ended. Returns the run state
    /// after the step.
    pub async fn step(&mut self) -> RunState {
        if !self.can_advance() {
            return self.state;
        }
        self.begin();

        let pos = self.cursor;
        let node_id = self.order[pos].clone();
        self.mark_running(pos, &node_id);

        let (outcome, elapsed) = self.invoke(&node_id).await;
        self.cursor = pos + 1;

        let failure = match &outcome {
            Outcome::Failed(message) => Some((node_id.clone(), message.clone())),
            _ => None,
        };
        let cancelled = matches!(outcome, Outcome::Cancelled);
        self.record(&node_id, outcome, elapsed);
        self.settle(failure, cancelled);
        self.state
    }

    /// Execute every node of the next dependency wave concurrently.
    ///
    /// Log entries are appended in wave order once the whole wave has
    /// settled, so the log is reproducible whatever order the actions finish
    /// in. A failure in the wave fails the run after the wave; later waves
    /// never start. In sequential mode this is the same as [`RunHandle::step`].
    pub async fn step_wave(&mut self) -> RunState {
        if self.options.mode == ExecutionMode::Sequential {
            return self.step().await;
        }
        if !self.can_advance() {
            return self.state;
        }
        self.begin();

        let start = self.cursor;
        let end = self
            .wave_ends
            .iter()
            .copied()
            .find(|&e| e > start)
            .unwrap_or(self.order.len());
        let wave: Vec<String> = self.order[start..end].to_vec();
        for (offset, node_id) in wave.iter().enumerate() {
            self.mark_running(start + offset, node_id);
        }

        let this = &*self;
        let outcomes = join_all(wave.iter().map(|node_id| this.invoke(node_id))).await;
        self.cursor = end;

        let mut failure = None;
        let mut cancelled = false;
        for (node_id, (outcome, elapsed)) in wave.iter().zip(outcomes) {
            match &outcome {
                Outcome::Failed(message) if failure.is_none() => {
                    failure = Some((node_id.clone(), message.clone()));
                }
                Outcome::Cancelled => cancelled = true,
                _ => {}
            }
            self.record(node_id, outcome, elapsed);
        }
        self.settle(failure, cancelled);
        self.state
    }

    /// Step (or wave, per the run's mode) until the run ends or is paused.
    pub async fn run_to_end(&mut self) -> RunState {
        loop {
            let state = match self.options.mode {
                ExecutionMode::Sequential => self.step().await,
                ExecutionMode::Wave => self.step_wave().await,
            };
            if state.is_terminal() || state == RunState::Paused {
                return state;
            }
        }
    }

    /// Stop advancing. Node statuses are untouched.
    pub fn pause(&mut self) -> bool {
        match self.state {
            RunState::NotStarted | RunState::Running => {
                self.resume_to = self.state;
                self.state = RunState::Paused;
                info!(run_id = %self.run_id, position = self.cursor, "Run paused");
                self.emit(FlowEvent::RunPaused {
                    run_id: self.run_id.clone(),
                });
                true
            }
            _ => false,
        }
    }

    /// Continue from where the run was paused.
    pub fn resume(&mut self) -> bool {
        if self.state != RunState::Paused {
            return false;
        }
        self.state = self.resume_to;
        info!(run_id = %self.run_id, position = self.cursor, "Run resumed");
        self.emit(FlowEvent::RunResumed {
            run_id: self.run_id.clone(),
        });
        true
    }

    /// Stop the run for good. No further node executes.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.cancel.cancel();
        self.mark_cancelled();
        true
    }

    /// Return every node to idle and empty the log, ready for a fresh run
    /// over the same order.
    pub fn reset(&mut self) {
        let previous = std::mem::take(&mut self.run_id);
        self.graph.reset_statuses();
        self.cursor = 0;
        self.current_index = None;
        self.log.clear();
        self.state = RunState::NotStarted;
        self.resume_to = RunState::NotStarted;
        self.cancel = CancellationToken::new();
        info!(previous = %previous, run_id = %self.run_id, "Run reset");
        self.emit(FlowEvent::RunReset { run_id: previous });
    }

    pub fn observe(&self) -> RunSnapshot {
        let node_statuses = self
            .order
            .iter()
            .map(|id| {
                let status = self.graph.node(id).map(|n| n.status).unwrap_or_default();
                (id.clone(), status)
            })
            .collect();
        RunSnapshot {
            run_id: self.run_id.clone(),
            state: self.state,
            order: self.order.clone(),
            current_index: self.current_index,
            node_statuses,
            log: self.log.clone(),
        }
    }

    fn can_advance(&mut self) -> bool {
        if !matches!(self.state, RunState::NotStarted | RunState::Running) {
            return false;
        }
        if self.cancel.is_cancelled() {
            self.mark_cancelled();
            return false;
        }
        self.cursor < self.order.len()
    }

    fn begin(&mut self) {
        if self.state != RunState::NotStarted {
            return;
        }
        self.state = RunState::Running;
        for id in &self.order {
            self.graph.set_status(id, NodeStatus::Pending);
        }
        info!(run_id = %self.run_id, nodes = self.order.len(), "Run started");
        self.emit(FlowEvent::RunStarted {
            run_id: self.run_id.clone(),
            total_nodes: self.order.len(),
        });
    }

    fn mark_running(&mut self, pos: usize, node_id: &str) {
        self.current_index = Some(pos);
        self.graph.set_status(node_id, NodeStatus::Running);
        debug!(node_id, index = pos, "Executing node");
        self.emit(FlowEvent::NodeStarted {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            index: pos,
        });
    }

    async fn invoke(&self, node_id: &str) -> (Outcome, Duration) {
        let start = Instant::now();
        let Some(node) = self.graph.node(node_id) else {
            return (
                Outcome::Failed(format!("node '{}' missing from run snapshot", node_id)),
                start.elapsed(),
            );
        };

        let timeout = self.options.step_timeout;
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Outcome::Cancelled,
            result = tokio::time::timeout(timeout, self.action.execute(node.invocation())) => {
                match result {
                    Ok(Ok(())) => Outcome::Completed,
                    Ok(Err(e)) => Outcome::Failed(failure_message(e)),
                    Err(_) => Outcome::Failed(
                        StudioError::NodeTimeout {
                            node: node_id.to_string(),
                            timeout_ms: timeout.as_millis() as u64,
                        }
                        .to_string(),
                    ),
                }
            }
        };
        (outcome, start.elapsed())
    }

    fn record(&mut self, node_id: &str, outcome: Outcome, elapsed: Duration) {
        let run_id = self.run_id.clone();
        match outcome {
            Outcome::Completed => {
                let elapsed_ms = elapsed.as_millis() as u64;
                self.graph.set_status(node_id, NodeStatus::Completed);
                self.log.push(LogEntry::now(format!("Completed node: {}", node_id)));
                debug!(node_id, elapsed_ms, "Node completed");
                self.emit(FlowEvent::NodeCompleted {
                    run_id,
                    node_id: node_id.to_string(),
                    elapsed_ms,
                });
            }
            Outcome::Failed(message) => {
                self.graph.set_status(node_id, NodeStatus::Error);
                self.log
                    .push(LogEntry::now(format!("Failed node: {}: {}", node_id, message)));
                error!(node_id, error = %message, "Node failed");
                self.emit(FlowEvent::NodeFailed {
                    run_id,
                    node_id: node_id.to_string(),
                    error: message,
                });
            }
            Outcome::Cancelled => {
                self.graph.set_status(node_id, NodeStatus::Cancelled);
                self.log.push(LogEntry::now(format!("Cancelled node: {}", node_id)));
                warn!(node_id, "Node cancelled mid-step");
                self.emit(FlowEvent::NodeCancelled {
                    run_id,
                    node_id: node_id.to_string(),
                });
            }
        }
    }

    /// Decide the run state after a step or wave.
    fn settle(&mut self, failure: Option<(String, String)>, cancelled: bool) {
        if let Some((node_id, error)) = failure {
            self.state = RunState::Failed;
            error!(run_id = %self.run_id, node_id = %node_id, "Run failed");
            self.emit(FlowEvent::RunFailed {
                run_id: self.run_id.clone(),
                node_id,
                error,
            });
        } else if cancelled {
            self.mark_cancelled();
        } else if self.cursor >= self.order.len() {
            self.state = RunState::Completed;
            info!(run_id = %self.run_id, nodes = self.order.len(), "Run completed");
            self.emit(FlowEvent::RunCompleted {
                run_id: self.run_id.clone(),
                completed_nodes: self.order.len(),
            });
        }
    }

    fn mark_cancelled(&mut self) {
        self.state = RunState::Cancelled;
        info!(run_id = %self.run_id, position = self.cursor, "Run cancelled");
        self.emit(FlowEvent::RunCancelled {
            run_id: self.run_id.clone(),
        });
    }

    fn emit(&self, event: FlowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// Message for the log: the action's own text for execution errors.
fn failure_message(err: StudioError) -> String {
    match err {
        StudioError::NodeExecution { message, .. } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::NoopAction;
    use crate::templates::TemplateRegistry;
    use studio_core::types::Position;
    use studio_test_utils::{DelayAction, RecordingAction};

    /// Input(1) -> Agent(2) -> Condition(3) -true-> Action(4) -> Output(5)
    fn claim_pipeline() -> Graph {
        let t = TemplateRegistry::builtin();
        let mut g = Graph::new();
        for (id, kind) in [
            ("1", "input"),
            ("2", "agent"),
            ("3", "condition"),
            ("4", "action"),
            ("5", "output"),
        ] {
            g.add_node_with_id(id, kind, Position::default(), &t).unwrap();
        }
        g.connect("1", "output", "2", "input").unwrap();
        g.connect("2", "output", "3", "input").unwrap();
        g.connect("3", "true", "4", "input").unwrap();
        g.connect("4", "output", "5", "input").unwrap();
        g
    }

    /// A -> B, A -> C, B -> D, C -> D with agents everywhere but the root.
    fn diamond() -> Graph {
        let t = TemplateRegistry::builtin();
        let mut g = Graph::new();
        g.add_node_with_id("A", "input", Position::default(), &t).unwrap();
        for id in ["B", "C", "D"] {
            g.add_node_with_id(id, "agent", Position::default(), &t).unwrap();
        }
        g.connect("A", "output", "B", "input").unwrap();
        g.connect("A", "output", "C", "input").unwrap();
        g.connect("B", "output", "D", "input").unwrap();
        g.connect("C", "output", "D", "context").unwrap();
        g
    }

    fn messages(handle: &RunHandle) -> Vec<String> {
        handle.log().iter().map(|e| e.message.clone()).collect()
    }

    fn wave_options() -> RunOptions {
        RunOptions {
            mode: ExecutionMode::Wave,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn runs_pipeline_to_completion() {
        let g = claim_pipeline();
        let mut handle = start_run(&g, Arc::new(NoopAction)).unwrap();
        assert_eq!(handle.order(), ["1", "2", "3", "4", "5"]);
        assert_eq!(handle.state(), RunState::NotStarted);
        assert_eq!(handle.current_index(), None);

        assert_eq!(handle.run_to_end().await, RunState::Completed);

        let snapshot = handle.observe();
        assert!(snapshot
            .node_statuses
            .iter()
            .all(|(_, s)| *s == NodeStatus::Completed));
        assert_eq!(snapshot.current_index, Some(4));
        assert_eq!(
            messages(&handle),
            vec![
                "Completed node: 1",
                "Completed node: 2",
                "Completed node: 3",
                "Completed node: 4",
                "Completed node: 5",
            ]
        );
        // The caller's graph is untouched.
        assert!(g.nodes().iter().all(|n| n.status == NodeStatus::Idle));
    }

    #[tokio::test]
    async fn step_advances_one_node() {
        let action = RecordingAction::new();
        let mut handle = start_run(&claim_pipeline(), Arc::new(action.clone())).unwrap();

        assert_eq!(handle.step().await, RunState::Running);
        let snapshot = handle.observe();
        assert_eq!(snapshot.current_index, Some(0));
        assert_eq!(snapshot.status_of("1"), Some(NodeStatus::Completed));
        assert_eq!(snapshot.status_of("2"), Some(NodeStatus::Pending));
        assert_eq!(action.calls(), vec!["1"]);
    }

    #[tokio::test]
    async fn empty_graph_rejected() {
        let result = start_run(&Graph::new(), Arc::new(NoopAction));
        assert!(matches!(result, Err(StudioError::EmptyGraph)));
    }

    #[tokio::test]
    async fn cyclic_graph_rejected_without_touching_statuses() {
        let t = TemplateRegistry::builtin();
        let mut g = Graph::new();
        g.add_node_with_id("a", "agent", Position::default(), &t).unwrap();
        g.add_node_with_id("b", "agent", Position::default(), &t).unwrap();
        g.connect("a", "output", "b", "input").unwrap();
        g.connect("b", "output", "a", "input").unwrap();

        let action = RecordingAction::new();
        match start_run(&g, Arc::new(action.clone())) {
            Err(StudioError::CyclicGraph { nodes }) => assert_eq!(nodes, vec!["a", "b"]),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("cycle should not start"),
        }
        assert!(action.calls().is_empty());
        assert!(g.nodes().iter().all(|n| n.status == NodeStatus::Idle));
    }

    #[tokio::test]
    async fn missing_required_input_rejected() {
        let t = TemplateRegistry::builtin();
        let mut g = claim_pipeline();
        g.add_node_with_id("orphan", "agent", Position::default(), &t).unwrap();

        let result = start_run(&g, Arc::new(NoopAction));
        assert!(matches!(
            result,
            Err(StudioError::MissingInput { node, port }) if node == "orphan" && port == "input"
        ));

        let relaxed = RunOptions {
            enforce_required_inputs: false,
            ..RunOptions::default()
        };
        assert!(RunHandle::start(&g, Arc::new(NoopAction), relaxed).is_ok());
    }

    #[tokio::test]
    async fn failure_stops_the_run() {
        let action = RecordingAction::new().failing_on("3");
        let mut handle = start_run(&claim_pipeline(), Arc::new(action.clone())).unwrap();

        assert_eq!(handle.run_to_end().await, RunState::Failed);
        assert_eq!(action.calls(), vec!["1", "2", "3"]);

        let snapshot = handle.observe();
        assert_eq!(snapshot.status_of("3"), Some(NodeStatus::Error));
        assert_eq!(snapshot.status_of("4"), Some(NodeStatus::Pending));
        assert_eq!(snapshot.status_of("5"), Some(NodeStatus::Pending));
        assert_eq!(messages(&handle).last().unwrap(), "Failed node: 3: boom");
        assert_eq!(handle.log().len(), 3);

        // Further steps are no-ops.
        assert_eq!(handle.step().await, RunState::Failed);
        assert_eq!(action.calls().len(), 3);
    }

    #[tokio::test]
    async fn timeout_fails_node() {
        let options = RunOptions {
            step_timeout: Duration::from_millis(20),
            ..RunOptions::default()
        };
        let action = Arc::new(DelayAction::new(Duration::from_secs(30)));
        let mut handle = RunHandle::start(&claim_pipeline(), action, options).unwrap();

        assert_eq!(handle.step().await, RunState::Failed);
        assert_eq!(handle.observe().status_of("1"), Some(NodeStatus::Error));
        assert!(messages(&handle)[0].contains("timeout after 20ms"));
    }

    #[tokio::test]
    async fn pause_and_resume_keep_position() {
        let action = RecordingAction::new();
        let mut handle = start_run(&claim_pipeline(), Arc::new(action.clone())).unwrap();

        handle.step().await;
        handle.step().await;
        assert!(handle.pause());
        let paused = handle.observe();

        assert_eq!(handle.step().await, RunState::Paused);
        assert_eq!(handle.run_to_end().await, RunState::Paused);
        assert_eq!(action.calls().len(), 2);
        assert_eq!(handle.observe().node_statuses, paused.node_statuses);
        assert_eq!(handle.current_index(), Some(1));

        assert!(handle.resume());
        assert_eq!(handle.state(), RunState::Running);
        assert_eq!(handle.run_to_end().await, RunState::Completed);
        assert_eq!(action.calls(), vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn resume_without_pause_is_noop() {
        let mut handle = start_run(&claim_pipeline(), Arc::new(NoopAction)).unwrap();
        assert!(!handle.resume());
        assert!(handle.pause());
        assert!(!handle.pause());
        assert!(handle.resume());
        assert_eq!(handle.state(), RunState::NotStarted);
    }

    #[tokio::test]
    async fn cancel_between_steps() {
        let action = RecordingAction::new();
        let mut handle = start_run(&claim_pipeline(), Arc::new(action.clone())).unwrap();

        handle.step().await;
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(handle.step().await, RunState::Cancelled);
        assert_eq!(action.calls(), vec!["1"]);
        assert_eq!(handle.log().len(), 1);
    }

    #[tokio::test]
    async fn cancel_mid_step_marks_node_cancelled() {
        let action = Arc::new(DelayAction::new(Duration::from_secs(30)));
        let mut handle = start_run(&claim_pipeline(), action).unwrap();

        let canceller = handle.canceller();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        assert_eq!(handle.step().await, RunState::Cancelled);
        let snapshot = handle.observe();
        assert_eq!(snapshot.status_of("1"), Some(NodeStatus::Cancelled));
        assert_eq!(snapshot.status_of("2"), Some(NodeStatus::Pending));
        assert_eq!(messages(&handle), vec!["Cancelled node: 1"]);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let mut handle = start_run(&claim_pipeline(), Arc::new(NoopAction)).unwrap();
        let first_id = handle.run_id().clone();
        handle.run_to_end().await;

        handle.reset();

        let snapshot = handle.observe();
        assert_eq!(snapshot.state, RunState::NotStarted);
        assert_eq!(snapshot.current_index, None);
        assert!(snapshot.log.is_empty());
        assert!(snapshot
            .node_statuses
            .iter()
            .all(|(_, s)| *s == NodeStatus::Idle));
        assert_ne!(handle.run_id(), &first_id);

        assert_eq!(handle.run_to_end().await, RunState::Completed);
        assert_eq!(handle.log().len(), 5);
    }

    #[tokio::test]
    async fn reset_after_failure_allows_new_run() {
        let action = RecordingAction::new().failing_on("2");
        let mut handle = start_run(&claim_pipeline(), Arc::new(action)).unwrap();
        assert_eq!(handle.run_to_end().await, RunState::Failed);

        handle.reset();
        assert_eq!(handle.step().await, RunState::Running);
        assert_eq!(handle.observe().status_of("1"), Some(NodeStatus::Completed));
    }

    #[tokio::test]
    async fn reruns_are_deterministic() {
        let g = diamond();
        let mut first = start_run(&g, Arc::new(RecordingAction::new())).unwrap();
        let mut second = start_run(&g, Arc::new(RecordingAction::new())).unwrap();
        first.run_to_end().await;
        second.run_to_end().await;

        assert_eq!(first.order(), second.order());
        assert_eq!(messages(&first), messages(&second));
        assert_eq!(first.order(), ["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn snapshot_isolated_from_later_edits() {
        let t = TemplateRegistry::builtin();
        let mut g = claim_pipeline();
        let mut handle = start_run(&g, Arc::new(NoopAction)).unwrap();

        g.remove_node("3").unwrap();
        g.add_node_with_id("6", "input", Position::default(), &t).unwrap();

        assert_eq!(handle.run_to_end().await, RunState::Completed);
        assert_eq!(handle.order(), ["1", "2", "3", "4", "5"]);
        assert!(handle.graph().node("6").is_none());
    }

    #[tokio::test]
    async fn waves_run_independent_nodes_together() {
        let action = RecordingAction::new();
        let mut handle =
            RunHandle::start(&diamond(), Arc::new(action.clone()), wave_options()).unwrap();

        assert_eq!(handle.step_wave().await, RunState::Running);
        assert_eq!(action.calls(), vec!["A"]);

        assert_eq!(handle.step_wave().await, RunState::Running);
        let mut calls = action.calls();
        calls.sort();
        assert_eq!(calls, vec!["A", "B", "C"]);
        assert_eq!(handle.current_index(), Some(2));

        assert_eq!(handle.step_wave().await, RunState::Completed);
        assert_eq!(
            messages(&handle),
            vec![
                "Completed node: A",
                "Completed node: B",
                "Completed node: C",
                "Completed node: D",
            ]
        );
    }

    #[tokio::test]
    async fn wave_failure_stops_later_waves() {
        let action = RecordingAction::new().failing_on("B");
        let mut handle =
            RunHandle::start(&diamond(), Arc::new(action.clone()), wave_options()).unwrap();

        assert_eq!(handle.run_to_end().await, RunState::Failed);
        let snapshot = handle.observe();
        assert_eq!(snapshot.status_of("B"), Some(NodeStatus::Error));
        assert_eq!(snapshot.status_of("C"), Some(NodeStatus::Completed));
        assert_eq!(snapshot.status_of("D"), Some(NodeStatus::Pending));
        assert!(!action.calls().contains(&"D".to_string()));
    }

    #[tokio::test]
    async fn events_follow_transitions() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let action = RecordingAction::new().failing_on("2");
        let mut handle = start_run(&claim_pipeline(), Arc::new(action))
            .unwrap()
            .with_event_bus(bus);

        handle.run_to_end().await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            let json = serde_json::to_value(&event).unwrap();
            kinds.push(json["type"].as_str().unwrap().to_string());
        }
        assert_eq!(
            kinds,
            vec![
                "run_started",
                "node_started",
                "node_completed",
                "node_started",
                "node_failed",
                "run_failed",
            ]
        );
    }
}
