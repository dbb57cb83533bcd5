//! Network module for OVS/OVN integration.
//!
//! This module provides:
//! - OVS port management (adding/removing veth host ends on br-int)
//! - OVN integration (iface-id binding for ovn-controller)
//! - OVS availability checks

mod ovs;
mod types;

pub use ovs::{parse_external_ids, OvsPortManager};
pub use types::*;
