use std::collections::HashSet;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use studio_core::error::{Result, StudioError};
use studio_core::traits::NodeAction;
use studio_core::types::NodeInvocation;

/// Succeeds immediately for every node.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAction;

impl NodeAction for NoopAction {
    fn execute(&self, _invocation: NodeInvocation) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Stand-in for agent business logic: waits a fixed delay, then succeeds.
///
/// Fails for node ids registered with [`SimulatedAction::fail_on`] and for
/// nodes whose config has `"fail": true` (with an optional `"error"` message).
#[derive(Debug, Clone, Default)]
pub struct SimulatedAction {
    delay: Duration,
    fail_nodes: HashSet<String>,
}

impl SimulatedAction {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_nodes: HashSet::new(),
        }
    }

    /// Make the action fail for `node_id`.
    pub fn fail_on(mut self, node_id: impl Into<String>) -> Self {
        self.fail_nodes.insert(node_id.into());
        self
    }

    fn should_fail(&self, invocation: &NodeInvocation) -> bool {
        self.fail_nodes.contains(&invocation.node_id)
            || invocation
                .config
                .get("fail")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
    }
}

impl NodeAction for SimulatedAction {
    fn execute(&self, invocation: NodeInvocation) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.should_fail(&invocation) {
                let message = invocation
                    .config
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("simulated failure")
                    .to_string();
                return Err(StudioError::NodeExecution {
                    node: invocation.node_id,
                    message,
                });
            }
            debug!(node_id = %invocation.node_id, kind = %invocation.kind, "Simulated node finished");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(id: &str, config: serde_json::Value) -> NodeInvocation {
        NodeInvocation {
            node_id: id.into(),
            kind: "agent".into(),
            config: config.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn noop_succeeds() {
        assert!(NoopAction
            .execute(invocation("a", serde_json::json!({})))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn simulated_fails_on_listed_node() {
        let action = SimulatedAction::new(Duration::ZERO).fail_on("b");
        assert!(action
            .execute(invocation("a", serde_json::json!({})))
            .await
            .is_ok());
        let err = action
            .execute(invocation("b", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::NodeExecution { node, .. } if node == "b"));
    }

    #[tokio::test]
    async fn simulated_fails_from_config() {
        let action = SimulatedAction::new(Duration::ZERO);
        let err = action
            .execute(invocation(
                "risk",
                serde_json::json!({"fail": true, "error": "score out of range"}),
            ))
            .await
            .unwrap_err();
        match err {
            StudioError::NodeExecution { message, .. } => {
                assert_eq!(message, "score out of range")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn simulated_waits_for_delay() {
        let action = SimulatedAction::new(Duration::from_millis(20));
        let start = std::time::Instant::now();
        action
            .execute(invocation("a", serde_json::json!({})))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
