//! Seams between the provisioning logic and the systems it drives.
//!
//! Each trait has a system implementation (rtnetlink, ovs-vsctl, setns on a
//! dedicated thread) and an in-memory one in [`crate::mock`].

use std::path::Path;

use async_trait::async_trait;
use futures::future::BoxFuture;
use ipnet::IpNet;
use mac_address::MacAddress;

use crate::error::{Result, SystemError};
use crate::netns::NetNs;
use crate::types::{LinkInfo, OwnerTag};

/// Result of a single call into an external system.
pub type SysResult<T> = std::result::Result<T, SystemError>;

/// Kernel link subsystem, scoped to one network namespace.
#[async_trait]
pub trait LinkBackend: Send + Sync {
    /// Create a veth pair as one kernel operation.
    async fn create_veth_pair(&self, name: &str, peer: &str) -> SysResult<()>;

    /// Look up a link by name. `Ok(None)` means the link does not exist.
    async fn link_by_name(&self, name: &str) -> SysResult<Option<LinkInfo>>;

    /// Whether a link exists, without reading its addresses.
    async fn link_exists(&self, name: &str) -> SysResult<bool>;

    /// Delete a link by name.
    async fn delete_link(&self, name: &str) -> SysResult<()>;

    async fn set_hardware_address(&self, name: &str, mac: MacAddress) -> SysResult<()>;

    /// Bring a link administratively up.
    async fn set_up(&self, name: &str) -> SysResult<()>;

    /// Move a link into another namespace, identified by its open handle.
    async fn set_namespace(&self, name: &str, netns: &NetNs) -> SysResult<()>;

    async fn rename(&self, name: &str, new_name: &str) -> SysResult<()>;

    async fn add_address(&self, name: &str, address: IpNet) -> SysResult<()>;
}

/// Virtual switch control plane.
#[async_trait]
pub trait SwitchBackend: Send + Sync {
    /// Add `iface` as a port on `bridge`, tagging it with `owner`.
    async fn add_port(&self, bridge: &str, iface: &str, owner: &OwnerTag) -> SysResult<()>;

    /// Remove `iface` from `bridge`. Succeeds when the port is already gone.
    async fn remove_port(&self, bridge: &str, iface: &str) -> SysResult<()>;

    /// Owner tag of the interface record, `None` when there is no record.
    async fn port_owner(&self, bridge: &str, iface: &str) -> SysResult<Option<OwnerTag>>;
}

/// Runs work with the network namespace switched to a target.
#[async_trait]
pub trait NamespaceExecutor: Send + Sync {
    /// Link backend bound to the target namespace, handed to the operation.
    type Links: LinkBackend + 'static;

    /// Open the namespace at `path` as a handle this executor can enter.
    fn resolve(&self, path: &Path) -> SysResult<NetNs>;

    /// Enter `netns`, run `op`, and restore the original namespace before
    /// returning, whether or not `op` succeeded.
    async fn run_in_namespace<T, F>(&self, netns: &NetNs, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a Self::Links) -> BoxFuture<'a, Result<T>> + Send + 'static;
}
