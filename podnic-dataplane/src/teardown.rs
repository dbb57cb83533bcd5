//! Idempotent teardown of a pod attachment.

use tracing::{debug, info, instrument};

use crate::config::DataplaneSettings;
use crate::error::{DataplaneError, Result, Stage, SystemError};
use crate::naming::derive_names;
use crate::netlink::NetlinkBackend;
use crate::network::OvsPortManager;
use crate::traits::{LinkBackend, SwitchBackend};
use crate::types::TeardownOutcome;

/// Removes the bridge port and the host end of a pod's veth pair.
///
/// Safe to call repeatedly and for containers that were never provisioned.
/// The pod namespace is never entered.
pub struct TeardownCoordinator<L, S> {
    links: L,
    switch: S,
    bridge: String,
}

/// Teardown wired to rtnetlink and ovs-vsctl.
pub type SystemTeardown = TeardownCoordinator<NetlinkBackend, OvsPortManager>;

impl SystemTeardown {
    /// Must run inside a tokio runtime.
    pub fn system(settings: &DataplaneSettings) -> Result<Self> {
        let links = NetlinkBackend::connect().map_err(DataplaneError::BackendUnavailable)?;
        Self::new(links, OvsPortManager::new(settings), settings)
    }
}

impl<L, S> TeardownCoordinator<L, S>
where
    L: LinkBackend,
    S: SwitchBackend,
{
    pub fn new(links: L, switch: S, settings: &DataplaneSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            links,
            switch,
            bridge: settings.integration_bridge.clone(),
        })
    }

    #[instrument(skip(self))]
    pub async fn teardown(&self, container_id: &str) -> Result<TeardownOutcome> {
        let host_name = derive_names(container_id)?.host_name;

        self.switch
            .remove_port(&self.bridge, &host_name)
            .await
            .map_err(|source| DataplaneError::SwitchPortRemoveFailed {
                stage: Stage::RemovePort,
                source,
            })?;
        debug!(bridge = %self.bridge, iface = %host_name, "Bridge port removed");

        let exists = self
            .links
            .link_exists(&host_name)
            .await
            .map_err(|source| DataplaneError::LinkLookupFailed {
                stage: Stage::LookupHostLink,
                link: host_name.clone(),
                source,
            })?;

        if !exists {
            info!(iface = %host_name, "Host link already absent");
            return Ok(TeardownOutcome::AlreadyAbsent);
        }

        match self.links.delete_link(&host_name).await {
            Ok(()) => {}
            // Lost a race with another teardown
            Err(SystemError::NotFound(_)) => return Ok(TeardownOutcome::AlreadyAbsent),
            Err(source) => {
                return Err(DataplaneError::LinkDeleteFailed {
                    stage: Stage::DeleteHostLink,
                    link: host_name,
                    source,
                })
            }
        }

        info!(iface = %host_name, "Pod interface torn down");
        Ok(TeardownOutcome::Removed)
    }
}
