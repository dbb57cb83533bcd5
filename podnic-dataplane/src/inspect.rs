//! Read-only view of a pod's host-side attachment.

use tracing::instrument;

use crate::config::DataplaneSettings;
use crate::error::{DataplaneError, Result, Stage};
use crate::naming::derive_names;
use crate::netlink::NetlinkBackend;
use crate::network::OvsPortManager;
use crate::traits::{LinkBackend, SwitchBackend};
use crate::types::{HostInterface, SwitchPortBinding};

pub struct InterfaceInspector<L, S> {
    links: L,
    switch: S,
    bridge: String,
}

pub type SystemInspector = InterfaceInspector<NetlinkBackend, OvsPortManager>;

impl SystemInspector {
    pub fn system(settings: &DataplaneSettings) -> Result<Self> {
        let links = NetlinkBackend::connect().map_err(DataplaneError::BackendUnavailable)?;
        Ok(Self::new(links, OvsPortManager::new(settings), settings))
    }
}

impl<L, S> InterfaceInspector<L, S>
where
    L: LinkBackend,
    S: SwitchBackend,
{
    pub fn new(links: L, switch: S, settings: &DataplaneSettings) -> Self {
        Self {
            links,
            switch,
            bridge: settings.integration_bridge.clone(),
        }
    }

    /// Host interface of a container, `None` if no host link exists.
    #[instrument(skip(self))]
    pub async fn inspect(&self, container_id: &str) -> Result<Option<HostInterface>> {
        let host_name = derive_names(container_id)?.host_name;

        let Some(link) = self
            .links
            .link_by_name(&host_name)
            .await
            .map_err(|source| DataplaneError::LinkLookupFailed {
                stage: Stage::LookupHostLink,
                link: host_name.clone(),
                source,
            })?
        else {
            return Ok(None);
        };

        let binding = self
            .switch
            .port_owner(&self.bridge, &host_name)
            .await
            .map_err(|source| DataplaneError::LinkLookupFailed {
                stage: Stage::LookupPort,
                link: host_name.clone(),
                source,
            })?
            .map(|owner| SwitchPortBinding {
                bridge: self.bridge.clone(),
                iface: host_name.clone(),
                owner,
            });

        Ok(Some(HostInterface {
            name: link.name,
            mac: link.mac,
            state: link.state,
            binding,
        }))
    }
}
