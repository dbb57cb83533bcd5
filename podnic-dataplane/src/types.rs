//! Data model for pod network attachments.

use std::fmt;
use std::path::PathBuf;

use ipnet::IpNet;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

// =============================================================================
// Interface identities
// =============================================================================

/// Host and container names of one veth pair, derived from a container ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfacePair {
    /// Host end, stays in the default namespace and is bound to the bridge.
    pub host_name: String,
    /// Container end before it is moved and renamed.
    pub container_name: String,
}

/// Administrative state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Down,
    Up,
}

/// Kernel view of a single link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Interface index
    pub index: u32,
    /// Interface name
    pub name: String,
    /// Hardware address, if the link carries one
    pub mac: Option<MacAddress>,
    /// Administrative state
    pub state: LinkState,
    /// Assigned addresses
    pub addresses: Vec<IpNet>,
}

/// Ownership tag written into the OVS interface's `external_ids:iface-id`.
///
/// Format is `<pod name>.<pod namespace>`; ovn-controller matches it against
/// the logical switch port name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerTag(String);

impl OwnerTag {
    pub fn new(pod_name: &str, pod_namespace: &str) -> Self {
        Self(format!("{}.{}", pod_name, pod_namespace))
    }

    /// Wrap a tag read back from the switch.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A host interface registered as a port on a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchPortBinding {
    /// Bridge name (e.g., "br-int")
    pub bridge: String,
    /// Host interface name
    pub iface: String,
    /// Pod ownership tag
    pub owner: OwnerTag,
}

/// Host end of a provisioned pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInterface {
    pub name: String,
    pub mac: Option<MacAddress>,
    pub state: LinkState,
    /// Present once the interface is a port on the integration bridge
    pub binding: Option<SwitchPortBinding>,
}

/// Container end of a provisioned pair, as configured inside the pod namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInterface {
    pub name: String,
    pub mac: MacAddress,
    pub address: IpNet,
    pub state: LinkState,
    /// Namespace the interface lives in
    pub netns: PathBuf,
}

// =============================================================================
// Requests and outcomes
// =============================================================================

/// Everything needed to attach one pod to the integration bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Pod name
    pub pod_name: String,
    /// Pod namespace (Kubernetes namespace, not the network namespace)
    pub pod_namespace: String,
    /// Path of the pod's network namespace
    pub netns: PathBuf,
    /// Container (sandbox) ID; at least 12 characters
    pub container_id: String,
    /// MAC address shared by both ends of the pair
    pub mac: String,
    /// Address with prefix for the container interface (e.g., "10.0.0.5/24")
    pub ip_cidr: String,
}

impl ProvisionRequest {
    pub fn owner_tag(&self) -> OwnerTag {
        OwnerTag::new(&self.pod_name, &self.pod_namespace)
    }
}

/// Result of a successful provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedInterface {
    pub pair: InterfacePair,
    pub host: HostInterface,
    pub container: ContainerInterface,
}

/// What a teardown call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// The host link existed and was deleted.
    Removed,
    /// No host link was present; nothing was deleted.
    AlreadyAbsent,
}
