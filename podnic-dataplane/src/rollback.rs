//! Compensating actions recorded while provisioning.

use tracing::{debug, warn};

use crate::error::SystemError;
use crate::traits::{LinkBackend, SwitchBackend};

/// A side effect that can be undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Compensation {
    /// Delete the veth pair through its host end.
    DeletePair { host_name: String },
    /// Remove the host end from the bridge.
    RemovePort { bridge: String, iface: String },
}

/// Ordered list of compensations, undone last-in first-out.
#[derive(Debug, Default)]
pub(crate) struct Rollback {
    actions: Vec<Compensation>,
}

impl Rollback {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, action: Compensation) {
        self.actions.push(action);
    }

    /// Undo every recorded action in reverse order. Failures are logged and
    /// do not stop the remaining actions.
    pub(crate) async fn run<L, S>(self, links: &L, switch: &S)
    where
        L: LinkBackend,
        S: SwitchBackend,
    {
        for action in self.actions.into_iter().rev() {
            let result = match &action {
                Compensation::DeletePair { host_name } => match links.delete_link(host_name).await {
                    // Already gone counts as undone
                    Err(SystemError::NotFound(_)) => Ok(()),
                    other => other,
                },
                Compensation::RemovePort { bridge, iface } => switch.remove_port(bridge, iface).await,
            };

            match result {
                Ok(()) => debug!(action = ?action, "Rolled back"),
                Err(e) => warn!(action = ?action, error = %e, "Rollback step failed"),
            }
        }
    }
}
