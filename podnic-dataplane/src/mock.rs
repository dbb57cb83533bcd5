//! In-memory network backend for testing and development.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::future::BoxFuture;
use ipnet::IpNet;
use mac_address::MacAddress;
use tracing::{debug, info};

use crate::error::{DataplaneError, Result, Stage, SystemError};
use crate::netns::NetNs;
use crate::traits::{LinkBackend, NamespaceExecutor, SwitchBackend, SysResult};
use crate::types::{LinkInfo, LinkState, OwnerTag};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFault {
    CreatePair,
    LookupLink,
    /// Address dump behind `link_by_name`; `link_exists` is unaffected.
    ListAddresses,
    DeleteLink,
    SetHardwareAddress,
    SetUp,
    SetNamespace,
    Rename,
    AddAddress,
    AddPort,
    RemovePort,
    PortOwner,
    EnterNamespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NsKey {
    Host,
    Path(PathBuf),
}

impl NsKey {
    fn of(path: Option<&Path>) -> Self {
        match path {
            Some(p) => NsKey::Path(p.to_path_buf()),
            None => NsKey::Host,
        }
    }
}

#[derive(Debug, Clone)]
struct MockLink {
    name: String,
    ns: NsKey,
    peer: Option<u32>,
    mac: Option<MacAddress>,
    state: LinkState,
    addresses: Vec<IpNet>,
}

#[derive(Debug, Default)]
struct MockState {
    next_index: u32,
    links: BTreeMap<u32, MockLink>,
    bridges: HashSet<String>,
    ports: HashMap<(String, String), OwnerTag>,
    faults: HashSet<MockFault>,
    calls: Vec<String>,
    namespace_entries: usize,
    namespace_exits: usize,
}

impl MockState {
    fn find(&self, ns: &NsKey, name: &str) -> Option<u32> {
        self.links
            .iter()
            .find(|(_, link)| &link.ns == ns && link.name == name)
            .map(|(index, _)| *index)
    }

    fn find_existing(&self, ns: &NsKey, name: &str) -> SysResult<u32> {
        self.find(ns, name)
            .ok_or_else(|| SystemError::NotFound(name.to_string()))
    }

    fn check(&self, fault: MockFault) -> SysResult<()> {
        if self.faults.contains(&fault) {
            return Err(SystemError::Netlink(format!("injected fault: {:?}", fault)));
        }
        Ok(())
    }

    fn check_command(&self, fault: MockFault, command: String) -> SysResult<()> {
        if self.faults.contains(&fault) {
            return Err(SystemError::Command {
                command,
                status: "exit status: 1".to_string(),
                output: format!("ovs-vsctl: injected fault: {:?}\n", fault),
            });
        }
        Ok(())
    }

    fn ensure_free(&self, ns: &NsKey, name: &str) -> SysResult<()> {
        if self.find(ns, name).is_some() {
            return Err(SystemError::Netlink(format!("{}: File exists (os error 17)", name)));
        }
        Ok(())
    }

    fn alloc_index(&mut self) -> u32 {
        self.next_index += 1;
        self.next_index
    }

    fn info(&self, index: u32) -> Option<LinkInfo> {
        self.links.get(&index).map(|link| LinkInfo {
            index,
            name: link.name.clone(),
            mac: link.mac,
            state: link.state,
            addresses: link.addresses.clone(),
        })
    }
}

/// In-memory stand-in for the kernel link tables, the OVS database and the
/// namespace switch.
///
/// Cloning shares state, so one instance can serve as link, switch and
/// namespace backend at once. Veth semantics follow the kernel: deleting
/// either end removes its peer wherever the peer lives.
#[derive(Debug, Clone)]
pub struct MockNetwork {
    inner: Arc<RwLock<MockState>>,
}

impl MockNetwork {
    /// Create an empty mock network with the default `br-int` bridge.
    pub fn new() -> Self {
        info!("Creating mock network backend");
        let net = Self {
            inner: Arc::new(RwLock::new(MockState::default())),
        };
        net.add_bridge("br-int");
        net
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Link backend scoped to the host namespace.
    pub fn host(&self) -> MockLinks {
        MockLinks {
            net: self.clone(),
            ns: NsKey::Host,
        }
    }

    pub fn add_bridge(&self, name: &str) {
        self.write().bridges.insert(name.to_string());
    }

    /// Make every subsequent call of the given kind fail.
    pub fn fail(&self, fault: MockFault) {
        self.write().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.write().faults.clear();
    }

    /// Link in the host namespace.
    pub fn host_link(&self, name: &str) -> Option<LinkInfo> {
        let state = self.read();
        state.find(&NsKey::Host, name).and_then(|i| state.info(i))
    }

    /// Link inside the namespace at `netns`.
    pub fn netns_link(&self, netns: &Path, name: &str) -> Option<LinkInfo> {
        let state = self.read();
        state
            .find(&NsKey::of(Some(netns)), name)
            .and_then(|i| state.info(i))
    }

    /// Total number of links across all namespaces.
    pub fn link_count(&self) -> usize {
        self.read().links.len()
    }

    /// Owner tag of a bridge port, if the port exists.
    pub fn port(&self, bridge: &str, iface: &str) -> Option<OwnerTag> {
        self.read()
            .ports
            .get(&(bridge.to_string(), iface.to_string()))
            .cloned()
    }

    pub fn port_count(&self) -> usize {
        self.read().ports.len()
    }

    pub fn namespace_entries(&self) -> usize {
        self.read().namespace_entries
    }

    pub fn namespace_exits(&self) -> usize {
        self.read().namespace_exits
    }

    /// Mutating calls in the order they were attempted.
    pub fn call_log(&self) -> Vec<String> {
        self.read().calls.clone()
    }
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// [`LinkBackend`] view of a [`MockNetwork`] bound to one namespace.
#[derive(Debug, Clone)]
pub struct MockLinks {
    net: MockNetwork,
    ns: NsKey,
}

#[async_trait]
impl LinkBackend for MockLinks {
    async fn create_veth_pair(&self, name: &str, peer: &str) -> SysResult<()> {
        let mut state = self.net.write();
        state.calls.push(format!("veth {} {}", name, peer));
        state.check(MockFault::CreatePair)?;
        state.ensure_free(&self.ns, name)?;
        state.ensure_free(&self.ns, peer)?;

        let a = state.alloc_index();
        let b = state.alloc_index();
        for (index, link_name, peer_index) in [(a, name, b), (b, peer, a)] {
            let mac = MacAddress::new([0x02, 0x00, 0x00, 0x00, (index >> 8) as u8, index as u8]);
            state.links.insert(
                index,
                MockLink {
                    name: link_name.to_string(),
                    ns: self.ns.clone(),
                    peer: Some(peer_index),
                    mac: Some(mac),
                    state: LinkState::Down,
                    addresses: Vec::new(),
                },
            );
        }
        debug!(name = %name, peer = %peer, "Mock veth pair created");
        Ok(())
    }

    async fn link_by_name(&self, name: &str) -> SysResult<Option<LinkInfo>> {
        let state = self.net.read();
        state.check(MockFault::LookupLink)?;
        state.check(MockFault::ListAddresses)?;
        Ok(state.find(&self.ns, name).and_then(|i| state.info(i)))
    }

    async fn link_exists(&self, name: &str) -> SysResult<bool> {
        let state = self.net.read();
        state.check(MockFault::LookupLink)?;
        Ok(state.find(&self.ns, name).is_some())
    }

    async fn delete_link(&self, name: &str) -> SysResult<()> {
        let mut state = self.net.write();
        state.calls.push(format!("del {}", name));
        state.check(MockFault::DeleteLink)?;
        let index = state.find_existing(&self.ns, name)?;
        if let Some(link) = state.links.remove(&index) {
            if let Some(peer) = link.peer {
                state.links.remove(&peer);
            }
        }
        Ok(())
    }

    async fn set_hardware_address(&self, name: &str, mac: MacAddress) -> SysResult<()> {
        let mut state = self.net.write();
        state.calls.push(format!("mac {} {}", name, mac));
        state.check(MockFault::SetHardwareAddress)?;
        let index = state.find_existing(&self.ns, name)?;
        if let Some(link) = state.links.get_mut(&index) {
            link.mac = Some(mac);
        }
        Ok(())
    }

    async fn set_up(&self, name: &str) -> SysResult<()> {
        let mut state = self.net.write();
        state.calls.push(format!("up {}", name));
        state.check(MockFault::SetUp)?;
        let index = state.find_existing(&self.ns, name)?;
        if let Some(link) = state.links.get_mut(&index) {
            link.state = LinkState::Up;
        }
        Ok(())
    }

    async fn set_namespace(&self, name: &str, netns: &NetNs) -> SysResult<()> {
        let mut state = self.net.write();
        state.calls.push(format!("setns {} {}", name, netns.path().display()));
        state.check(MockFault::SetNamespace)?;
        let index = state.find_existing(&self.ns, name)?;
        let target = NsKey::of(Some(netns.path()));
        state.ensure_free(&target, name)?;
        if let Some(link) = state.links.get_mut(&index) {
            link.ns = target;
            // Moving a link resets its administrative state
            link.state = LinkState::Down;
        }
        Ok(())
    }

    async fn rename(&self, name: &str, new_name: &str) -> SysResult<()> {
        let mut state = self.net.write();
        state.calls.push(format!("rename {} {}", name, new_name));
        state.check(MockFault::Rename)?;
        let index = state.find_existing(&self.ns, name)?;
        state.ensure_free(&self.ns, new_name)?;
        if let Some(link) = state.links.get_mut(&index) {
            link.name = new_name.to_string();
        }
        Ok(())
    }

    async fn add_address(&self, name: &str, address: IpNet) -> SysResult<()> {
        let mut state = self.net.write();
        state.calls.push(format!("addr {} {}", name, address));
        state.check(MockFault::AddAddress)?;
        let index = state.find_existing(&self.ns, name)?;
        if let Some(link) = state.links.get_mut(&index) {
            if link.addresses.contains(&address) {
                return Err(SystemError::Netlink(format!("{}: File exists (os error 17)", address)));
            }
            link.addresses.push(address);
        }
        Ok(())
    }
}

#[async_trait]
impl LinkBackend for MockNetwork {
    async fn create_veth_pair(&self, name: &str, peer: &str) -> SysResult<()> {
        self.host().create_veth_pair(name, peer).await
    }

    async fn link_by_name(&self, name: &str) -> SysResult<Option<LinkInfo>> {
        self.host().link_by_name(name).await
    }

    async fn link_exists(&self, name: &str) -> SysResult<bool> {
        self.host().link_exists(name).await
    }

    async fn delete_link(&self, name: &str) -> SysResult<()> {
        self.host().delete_link(name).await
    }

    async fn set_hardware_address(&self, name: &str, mac: MacAddress) -> SysResult<()> {
        self.host().set_hardware_address(name, mac).await
    }

    async fn set_up(&self, name: &str) -> SysResult<()> {
        self.host().set_up(name).await
    }

    async fn set_namespace(&self, name: &str, netns: &NetNs) -> SysResult<()> {
        self.host().set_namespace(name, netns).await
    }

    async fn rename(&self, name: &str, new_name: &str) -> SysResult<()> {
        self.host().rename(name, new_name).await
    }

    async fn add_address(&self, name: &str, address: IpNet) -> SysResult<()> {
        self.host().add_address(name, address).await
    }
}

#[async_trait]
impl SwitchBackend for MockNetwork {
    async fn add_port(&self, bridge: &str, iface: &str, owner: &OwnerTag) -> SysResult<()> {
        let mut state = self.write();
        let command = format!("add-port {} {} {}", bridge, iface, owner);
        state.calls.push(command.clone());
        state.check_command(MockFault::AddPort, command.clone())?;
        if !state.bridges.contains(bridge) {
            return Err(SystemError::Command {
                command,
                status: "exit status: 1".to_string(),
                output: format!("ovs-vsctl: no bridge named {}\n", bridge),
            });
        }
        state
            .ports
            .insert((bridge.to_string(), iface.to_string()), owner.clone());
        Ok(())
    }

    async fn remove_port(&self, bridge: &str, iface: &str) -> SysResult<()> {
        let mut state = self.write();
        let command = format!("del-port {} {}", bridge, iface);
        state.calls.push(command.clone());
        state.check_command(MockFault::RemovePort, command)?;
        state.ports.remove(&(bridge.to_string(), iface.to_string()));
        Ok(())
    }

    async fn port_owner(&self, bridge: &str, iface: &str) -> SysResult<Option<OwnerTag>> {
        let state = self.read();
        state.check_command(MockFault::PortOwner, format!("get Interface {}", iface))?;
        Ok(state
            .ports
            .get(&(bridge.to_string(), iface.to_string()))
            .cloned())
    }
}

#[async_trait]
impl NamespaceExecutor for MockNetwork {
    type Links = MockLinks;

    /// Any regular file stands in for a namespace.
    fn resolve(&self, path: &Path) -> SysResult<NetNs> {
        let netns = NetNs::open_unchecked(path)?;
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(SystemError::Io(format!(
                "{} is not a network namespace",
                path.display()
            )));
        }
        Ok(netns)
    }

    async fn run_in_namespace<T, F>(&self, netns: &NetNs, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a Self::Links) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        let ns_path = netns.path().display().to_string();
        {
            let mut state = self.write();
            state.calls.push(format!("enter {}", ns_path));
            if state.faults.contains(&MockFault::EnterNamespace) {
                return Err(DataplaneError::configure(
                    Stage::EnterNamespace,
                    ns_path,
                    SystemError::Io("injected fault: EnterNamespace".to_string()),
                ));
            }
            state.namespace_entries += 1;
        }

        let links = MockLinks {
            net: self.clone(),
            ns: NsKey::of(Some(netns.path())),
        };
        let result = op(&links).await;

        let mut state = self.write();
        state.namespace_exits += 1;
        state.calls.push(format!("exit {}", ns_path));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_veth_lifecycle() {
        let net = MockNetwork::new();
        net.create_veth_pair("a_h", "a_c").await.unwrap();
        assert_eq!(net.link_count(), 2);

        // Duplicate names are rejected
        assert!(net.create_veth_pair("a_h", "b_c").await.is_err());

        net.set_up("a_h").await.unwrap();
        assert_eq!(net.host_link("a_h").unwrap().state, LinkState::Up);

        // Deleting one end removes the peer
        net.delete_link("a_h").await.unwrap();
        assert_eq!(net.link_count(), 0);

        let err = net.delete_link("a_h").await.unwrap_err();
        assert!(matches!(err, SystemError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_peer_in_other_namespace() {
        let net = MockNetwork::new();
        let file = tempfile::NamedTempFile::new().unwrap();
        let ns = net.resolve(file.path()).unwrap();

        net.create_veth_pair("a_h", "a_c").await.unwrap();
        net.set_namespace("a_c", &ns).await.unwrap();
        assert!(net.host_link("a_c").is_none());
        assert!(net.netns_link(file.path(), "a_c").is_some());

        net.delete_link("a_h").await.unwrap();
        assert_eq!(net.link_count(), 0);
    }

    #[tokio::test]
    async fn test_port_requires_bridge() {
        let net = MockNetwork::new();
        let owner = OwnerTag::new("web-0", "default");
        let err = net.add_port("br-missing", "a_h", &owner).await.unwrap_err();
        assert!(matches!(err, SystemError::Command { ref output, .. } if output.contains("no bridge named br-missing")));

        net.add_port("br-int", "a_h", &owner).await.unwrap();
        assert_eq!(net.port_owner("br-int", "a_h").await.unwrap(), Some(owner));

        net.remove_port("br-int", "a_h").await.unwrap();
        // Removing an absent port is not an error
        net.remove_port("br-int", "a_h").await.unwrap();
        assert_eq!(net.port_count(), 0);
    }

    #[tokio::test]
    async fn test_executor_scopes_links_to_namespace() {
        let net = MockNetwork::new();
        let file = tempfile::NamedTempFile::new().unwrap();
        let ns = net.resolve(file.path()).unwrap();

        net.create_veth_pair("a_h", "a_c").await.unwrap();
        net.set_namespace("a_c", &ns).await.unwrap();

        let found = net
            .run_in_namespace(&ns, |links| {
                Box::pin(async move {
                    Ok(links.link_by_name("a_c").await.map_err(|e| {
                        DataplaneError::configure(Stage::RenameLink, "a_c", e)
                    })?)
                })
            })
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(net.namespace_entries(), 1);
        assert_eq!(net.namespace_exits(), 1);
    }
}
