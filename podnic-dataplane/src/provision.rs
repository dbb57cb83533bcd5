//! Pod interface provisioning.
//!
//! Creates the veth pair, binds the host end to the integration bridge,
//! configures it, then moves the peer into the pod namespace and configures
//! it there. Every side effect is recorded so a failure at any later step
//! leaves neither the pair nor the port behind.

use ipnet::IpNet;
use mac_address::MacAddress;
use tracing::{debug, info, instrument, warn};

use crate::config::DataplaneSettings;
use crate::error::{DataplaneError, Result, Stage};
use crate::naming::derive_names;
use crate::netlink::NetlinkBackend;
use crate::netns::ThreadNamespaceExecutor;
use crate::network::OvsPortManager;
use crate::rollback::{Compensation, Rollback};
use crate::traits::{LinkBackend, NamespaceExecutor, SwitchBackend};
use crate::types::{
    ContainerInterface, HostInterface, InterfacePair, LinkState, ProvisionRequest,
    ProvisionedInterface, SwitchPortBinding,
};

/// Orchestrates attachment of one pod to the integration bridge.
pub struct InterfaceProvisioner<L, S, E> {
    links: L,
    switch: S,
    executor: E,
    settings: DataplaneSettings,
}

/// Provisioner wired to rtnetlink, ovs-vsctl and thread-pinned setns.
pub type SystemProvisioner =
    InterfaceProvisioner<NetlinkBackend, OvsPortManager, ThreadNamespaceExecutor>;

impl SystemProvisioner {
    /// Build a provisioner against the live system. Must run inside a tokio runtime.
    pub fn system(settings: DataplaneSettings) -> Result<Self> {
        let links = NetlinkBackend::connect().map_err(DataplaneError::BackendUnavailable)?;
        let switch = OvsPortManager::new(&settings);
        Self::new(links, switch, ThreadNamespaceExecutor::new(), settings)
    }
}

impl<L, S, E> InterfaceProvisioner<L, S, E>
where
    L: LinkBackend,
    S: SwitchBackend,
    E: NamespaceExecutor,
{
    pub fn new(links: L, switch: S, executor: E, settings: DataplaneSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            links,
            switch,
            executor,
            settings,
        })
    }

    pub fn settings(&self) -> &DataplaneSettings {
        &self.settings
    }

    /// Attach a pod: on success both ends are up and carry the same MAC.
    ///
    /// On failure every completed step is undone in reverse order before the
    /// first error is returned.
    #[instrument(
        skip(self, request),
        fields(
            pod = %request.pod_name,
            namespace = %request.pod_namespace,
            container_id = %request.container_id,
        )
    )]
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionedInterface> {
        let pair = derive_names(&request.container_id)?;
        info!(host = %pair.host_name, peer = %pair.container_name, "Provisioning pod interface");

        let mut rollback = Rollback::new();
        match self.attach(request, &pair, &mut rollback).await {
            Ok(provisioned) => {
                info!(
                    host = %pair.host_name,
                    ifname = %provisioned.container.name,
                    mac = %provisioned.container.mac,
                    address = %provisioned.container.address,
                    "Pod interface provisioned"
                );
                Ok(provisioned)
            }
            Err(err) => {
                warn!(error = %err, stage = ?err.stage(), "Provisioning failed, rolling back");
                rollback.run(&self.links, &self.switch).await;
                Err(err)
            }
        }
    }

    async fn attach(
        &self,
        request: &ProvisionRequest,
        pair: &InterfacePair,
        rollback: &mut Rollback,
    ) -> Result<ProvisionedInterface> {
        let bridge = &self.settings.integration_bridge;

        self.links
            .create_veth_pair(&pair.host_name, &pair.container_name)
            .await
            .map_err(|source| DataplaneError::LinkCreateFailed {
                stage: Stage::CreatePair,
                source,
            })?;
        rollback.push(Compensation::DeletePair {
            host_name: pair.host_name.clone(),
        });
        debug!("Veth pair created");

        let owner = request.owner_tag();
        self.switch
            .add_port(bridge, &pair.host_name, &owner)
            .await
            .map_err(|source| DataplaneError::SwitchBindFailed {
                stage: Stage::BindPort,
                source,
            })?;
        rollback.push(Compensation::RemovePort {
            bridge: bridge.clone(),
            iface: pair.host_name.clone(),
        });
        debug!(bridge = %bridge, owner = %owner, "Host end bound to bridge");

        // OVN drops traffic when the two ends disagree on the MAC
        let mac = parse_mac(&request.mac)?;
        self.configure_host(&pair.host_name, mac).await?;

        let netns = self.executor.resolve(&request.netns).map_err(|source| {
            DataplaneError::NamespaceResolutionFailed {
                stage: Stage::ResolveNamespace,
                path: request.netns.display().to_string(),
                source,
            }
        })?;

        let address = parse_cidr(&request.ip_cidr)?;

        self.links
            .set_namespace(&pair.container_name, &netns)
            .await
            .map_err(|e| DataplaneError::configure(Stage::MoveToNamespace, &pair.container_name, e))?;
        debug!(netns = %request.netns.display(), "Peer moved into pod namespace");

        let peer = pair.container_name.clone();
        let ifname = self.settings.container_ifname.clone();
        self.executor
            .run_in_namespace(&netns, move |links| {
                Box::pin(configure_container(links, peer, ifname, address, mac))
            })
            .await?;

        Ok(ProvisionedInterface {
            pair: pair.clone(),
            host: HostInterface {
                name: pair.host_name.clone(),
                mac: Some(mac),
                state: LinkState::Up,
                binding: Some(SwitchPortBinding {
                    bridge: bridge.clone(),
                    iface: pair.host_name.clone(),
                    owner,
                }),
            },
            container: ContainerInterface {
                name: self.settings.container_ifname.clone(),
                mac,
                address,
                state: LinkState::Up,
                netns: request.netns.clone(),
            },
        })
    }

    async fn configure_host(&self, name: &str, mac: MacAddress) -> Result<()> {
        self.links
            .set_hardware_address(name, mac)
            .await
            .map_err(|e| DataplaneError::configure(Stage::SetHostHardwareAddress, name, e))?;
        self.links
            .set_up(name)
            .await
            .map_err(|e| DataplaneError::configure(Stage::SetHostUp, name, e))?;
        debug!(iface = %name, mac = %mac, "Host end configured");
        Ok(())
    }
}

/// Runs inside the pod namespace.
async fn configure_container<L: LinkBackend>(
    links: &L,
    peer: String,
    ifname: String,
    address: IpNet,
    mac: MacAddress,
) -> Result<()> {
    // Rename first: the remaining steps address the link by its final name
    links
        .rename(&peer, &ifname)
        .await
        .map_err(|e| DataplaneError::configure(Stage::RenameLink, &peer, e))?;
    links
        .add_address(&ifname, address)
        .await
        .map_err(|e| DataplaneError::configure(Stage::AssignAddress, &ifname, e))?;
    links
        .set_hardware_address(&ifname, mac)
        .await
        .map_err(|e| DataplaneError::configure(Stage::SetContainerHardwareAddress, &ifname, e))?;
    links
        .set_up(&ifname)
        .await
        .map_err(|e| DataplaneError::configure(Stage::SetContainerUp, &ifname, e))?;
    debug!(ifname = %ifname, address = %address, "Container end configured");
    Ok(())
}

fn parse_mac(raw: &str) -> Result<MacAddress> {
    raw.parse::<MacAddress>()
        .map_err(|e| DataplaneError::InvalidAddress {
            stage: Stage::ParseMac,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn parse_cidr(raw: &str) -> Result<IpNet> {
    raw.parse::<IpNet>()
        .map_err(|e| DataplaneError::InvalidAddress {
            stage: Stage::ParseAddress,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
