//! # podnic Data Plane
//!
//! Attaches a single pod to an Open vSwitch integration bridge and detaches it
//! again.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │  InterfaceProvisioner    │   │  TeardownCoordinator     │
//! │  (pair, port, netns cfg) │   │  (port, host link)       │
//! └────────────┬─────────────┘   └────────────┬─────────────┘
//!              │                              │
//!      ┌───────┴──────┬───────────────┬───────┘
//!      ▼              ▼               ▼
//! ┌───────────┐ ┌─────────────┐ ┌──────────────────────┐
//! │LinkBackend│ │SwitchBackend│ │ NamespaceExecutor    │
//! │(rtnetlink)│ │ (ovs-vsctl) │ │ (setns, own thread)  │
//! └───────────┘ └─────────────┘ └──────────────────────┘
//! ```
//!
//! Interface names are derived from the container ID (`<id[..12]>_h` /
//! `<id[..12]>_c`), so teardown needs no stored state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use podnic_dataplane::{DataplaneSettings, ProvisionRequest, SystemProvisioner, SystemTeardown};
//!
//! #[tokio::main]
//! async fn main() -> podnic_dataplane::error::Result<()> {
//!     let settings = DataplaneSettings::default();
//!     let provisioner = SystemProvisioner::system(settings.clone())?;
//!
//!     let request = ProvisionRequest {
//!         pod_name: "web-0".into(),
//!         pod_namespace: "default".into(),
//!         netns: "/var/run/netns/cni-1234".into(),
//!         container_id: "abc123def456ghi789".into(),
//!         mac: "02:11:22:33:44:55".into(),
//!         ip_cidr: "10.0.0.5/24".into(),
//!     };
//!     provisioner.provision(&request).await?;
//!
//!     SystemTeardown::system(&settings)?.teardown(&request.container_id).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod inspect;
pub mod mock;
pub mod naming;
pub mod netlink;
pub mod netns;
pub mod network;
pub mod provision;
pub mod teardown;
pub mod traits;
pub mod types;
mod rollback;

pub use config::DataplaneSettings;
pub use error::{DataplaneError, Stage, SystemError};
pub use inspect::{InterfaceInspector, SystemInspector};
pub use mock::{MockFault, MockLinks, MockNetwork};
pub use naming::derive_names;
pub use netlink::NetlinkBackend;
pub use netns::{NamespaceGuard, NetNs, ThreadNamespaceExecutor};
pub use network::{OvsPortManager, OvsStatus};
pub use provision::{InterfaceProvisioner, SystemProvisioner};
pub use teardown::{SystemTeardown, TeardownCoordinator};
pub use traits::{LinkBackend, NamespaceExecutor, SwitchBackend};
pub use types::*;
