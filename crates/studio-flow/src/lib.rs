//! Workflow graph engine for Agent Studio.
//!
//! The canvas edits a [`Graph`] through its mutation methods. On "run", the
//! resolver turns the graph into a deterministic order ([`resolve_order`])
//! or dependency waves ([`resolve_waves`]), and a [`RunHandle`] steps through
//! that order calling the plugged-in node action, tracking per-node status
//! and a human-readable log.

pub mod action;
pub mod graph;
pub mod resolver;
pub mod run;
pub mod run_log;
pub mod templates;

pub use action::{NoopAction, SimulatedAction};
pub use graph::{Edge, FlowDocument, Graph, Node};
pub use resolver::{resolve_order, resolve_waves};
pub use run::{start_run, RunHandle, RunOptions, RunSnapshot};
pub use run_log::RunLogger;
pub use templates::TemplateRegistry;
