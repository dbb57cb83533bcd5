//! rtnetlink implementation of [`LinkBackend`].
//!
//! A backend is bound to the namespace its socket was opened in, so the
//! namespace executor opens a fresh one after entering the pod namespace.

use std::os::fd::AsRawFd;

use async_trait::async_trait;
use futures::TryStreamExt;
use ipnet::IpNet;
use mac_address::MacAddress;
use nix::errno::Errno;
use rtnetlink::packet_route::address::AddressAttribute;
use rtnetlink::packet_route::link::{LinkAttribute, LinkFlags, LinkMessage};
use rtnetlink::{new_connection, Handle, LinkUnspec, LinkVeth};
use tracing::{debug, instrument};

use crate::error::SystemError;
use crate::netns::NetNs;
use crate::traits::{LinkBackend, SysResult};
use crate::types::{LinkInfo, LinkState};

/// Link operations over an rtnetlink socket.
#[derive(Clone)]
pub struct NetlinkBackend {
    handle: Handle,
}

impl NetlinkBackend {
    /// Open a netlink socket in the calling thread's namespace.
    ///
    /// Must be called from within a tokio runtime; the connection task is
    /// spawned onto it.
    pub fn connect() -> SysResult<Self> {
        let (connection, handle, _) = new_connection()
            .map_err(|e| SystemError::Netlink(format!("failed to open netlink socket: {}", e)))?;
        tokio::spawn(connection);
        Ok(Self { handle })
    }

    async fn find(&self, name: &str) -> SysResult<Option<LinkMessage>> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();

        match links.try_next().await {
            Ok(msg) => Ok(msg),
            Err(e) if is_no_such_device(&e) => Ok(None),
            Err(e) => Err(netlink_error(e)),
        }
    }

    async fn index_of(&self, name: &str) -> SysResult<u32> {
        self.find(name)
            .await?
            .map(|msg| msg.header.index)
            .ok_or_else(|| SystemError::NotFound(name.to_string()))
    }

    async fn addresses_of(&self, index: u32) -> SysResult<Vec<IpNet>> {
        let mut stream = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index)
            .execute();

        let mut addresses = Vec::new();
        while let Some(msg) = stream.try_next().await.map_err(netlink_error)? {
            let prefix = msg.header.prefix_len;
            for attr in &msg.attributes {
                if let AddressAttribute::Address(ip) = attr {
                    if let Ok(net) = IpNet::new(*ip, prefix) {
                        addresses.push(net);
                    }
                }
            }
        }
        Ok(addresses)
    }
}

#[async_trait]
impl LinkBackend for NetlinkBackend {
    #[instrument(skip(self))]
    async fn create_veth_pair(&self, name: &str, peer: &str) -> SysResult<()> {
        self.handle
            .link()
            .add(LinkVeth::new(name, peer).build())
            .execute()
            .await
            .map_err(netlink_error)?;
        debug!("Created veth pair");
        Ok(())
    }

    async fn link_by_name(&self, name: &str) -> SysResult<Option<LinkInfo>> {
        let Some(msg) = self.find(name).await? else {
            return Ok(None);
        };

        let mut info = link_info(&msg);
        if info.name.is_empty() {
            info.name = name.to_string();
        }
        info.addresses = self.addresses_of(info.index).await?;
        Ok(Some(info))
    }

    async fn link_exists(&self, name: &str) -> SysResult<bool> {
        Ok(self.find(name).await?.is_some())
    }

    #[instrument(skip(self))]
    async fn delete_link(&self, name: &str) -> SysResult<()> {
        let index = self.index_of(name).await?;
        self.handle
            .link()
            .del(index)
            .execute()
            .await
            .map_err(|e| {
                // Peer deleted between lookup and delete
                if is_no_such_device(&e) {
                    SystemError::NotFound(name.to_string())
                } else {
                    netlink_error(e)
                }
            })
    }

    #[instrument(skip(self), fields(mac = %mac))]
    async fn set_hardware_address(&self, name: &str, mac: MacAddress) -> SysResult<()> {
        let index = self.index_of(name).await?;
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(index)
                    .address(mac.bytes().to_vec())
                    .build(),
            )
            .execute()
            .await
            .map_err(netlink_error)
    }

    #[instrument(skip(self))]
    async fn set_up(&self, name: &str) -> SysResult<()> {
        let index = self.index_of(name).await?;
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(index).up().build())
            .execute()
            .await
            .map_err(netlink_error)
    }

    #[instrument(skip(self, netns), fields(netns = %netns.path().display()))]
    async fn set_namespace(&self, name: &str, netns: &NetNs) -> SysResult<()> {
        let index = self.index_of(name).await?;
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(index)
                    .setns_by_fd(netns.as_raw_fd())
                    .build(),
            )
            .execute()
            .await
            .map_err(netlink_error)
    }

    #[instrument(skip(self))]
    async fn rename(&self, name: &str, new_name: &str) -> SysResult<()> {
        let index = self.index_of(name).await?;
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(index)
                    .name(new_name.to_string())
                    .build(),
            )
            .execute()
            .await
            .map_err(netlink_error)
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn add_address(&self, name: &str, address: IpNet) -> SysResult<()> {
        let index = self.index_of(name).await?;
        self.handle
            .address()
            .add(index, address.addr(), address.prefix_len())
            .execute()
            .await
            .map_err(netlink_error)
    }
}

fn link_info(msg: &LinkMessage) -> LinkInfo {
    let mut name = String::new();
    let mut mac = None;
    for attr in &msg.attributes {
        match attr {
            LinkAttribute::IfName(n) => name = n.clone(),
            LinkAttribute::Address(bytes) => {
                mac = <[u8; 6]>::try_from(bytes.as_slice()).ok().map(MacAddress::new);
            }
            _ => {}
        }
    }

    let state = if msg.header.flags.contains(LinkFlags::Up) {
        LinkState::Up
    } else {
        LinkState::Down
    };

    LinkInfo {
        index: msg.header.index,
        name,
        mac,
        state,
        addresses: Vec::new(),
    }
}

/// Kernel answer for a name lookup of a link that does not exist.
fn is_no_such_device(err: &rtnetlink::Error) -> bool {
    match err {
        rtnetlink::Error::NetlinkError(msg) => {
            msg.code.map(|code| code.get()) == Some(-(Errno::ENODEV as i32))
        }
        _ => false,
    }
}

fn netlink_error(err: rtnetlink::Error) -> SystemError {
    SystemError::Netlink(err.to_string())
}
