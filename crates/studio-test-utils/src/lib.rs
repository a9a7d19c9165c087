//! Shared test doubles for Agent Studio crates.

use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use studio_core::error::{Result, StudioError};
use studio_core::traits::NodeAction;
use studio_core::types::NodeInvocation;

/// Node action that records every node it is asked to run.
///
/// Deterministic: the outcome depends only on the node id.
#[derive(Clone, Default)]
pub struct RecordingAction {
    calls: Arc<Mutex<Vec<String>>>,
    fail_nodes: HashSet<String>,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with a fixed message when `node_id` runs.
    pub fn failing_on(mut self, node_id: impl Into<String>) -> Self {
        self.fail_nodes.insert(node_id.into());
        self
    }

    /// Node ids invoked so far, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl NodeAction for RecordingAction {
    fn execute(&self, invocation: NodeInvocation) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(invocation.node_id.clone());
            if self.fail_nodes.contains(&invocation.node_id) {
                return Err(StudioError::NodeExecution {
                    node: invocation.node_id,
                    message: "boom".into(),
                });
            }
            Ok(())
        })
    }
}

/// Node action that sleeps for a fixed duration, then succeeds.
#[derive(Clone)]
pub struct DelayAction {
    delay: Duration,
}

impl DelayAction {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl NodeAction for DelayAction {
    fn execute(&self, _invocation: NodeInvocation) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(())
        })
    }
}

/// Write `content` to a temporary `.toml` file.
pub fn temp_config(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write toml");
    tmp
}

/// Parse `content` as TOML, panicking with the parse error.
pub fn parse_toml<T: serde::de::DeserializeOwned>(content: &str) -> T {
    toml::from_str(content).expect("valid toml")
}
