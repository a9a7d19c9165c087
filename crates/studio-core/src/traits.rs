use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{NodeInvocation, Port};

/// Per-node unit of work plugged in by the business-logic layer.
///
/// The engine treats the returned future as opaque: it awaits it (bounded by
/// the configured step timeout) and records success or failure.
pub trait NodeAction: Send + Sync + 'static {
    fn execute(&self, invocation: NodeInvocation) -> BoxFuture<'_, Result<()>>;
}

/// Port layout lookup by node kind, supplied by the editor layer.
pub trait PortTemplates: Send + Sync {
    /// Ports for a newly created node of `kind`, or `None` if the kind is unknown.
    fn ports(&self, kind: &str) -> Option<Vec<Port>>;

    /// Known kinds, for listing.
    fn kinds(&self) -> Vec<String> {
        Vec::new()
    }
}
