//! Settings shared by the provisioner, teardown and the OVS port manager.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DataplaneError, Result};

/// Longest interface name the kernel accepts (IFNAMSIZ minus the terminator).
pub const MAX_IFNAME_LEN: usize = 15;

/// Data plane settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataplaneSettings {
    /// Bridge every pod-facing host interface is attached to
    pub integration_bridge: String,
    /// Name the container runtime expects inside the pod (kubelet looks for eth0)
    pub container_ifname: String,
    /// Path or name of the ovs-vsctl binary
    pub ovs_vsctl: PathBuf,
    /// Passed as `--timeout` to every ovs-vsctl invocation
    pub ovs_timeout_secs: u64,
}

impl Default for DataplaneSettings {
    fn default() -> Self {
        Self {
            integration_bridge: "br-int".to_string(),
            container_ifname: "eth0".to_string(),
            ovs_vsctl: PathBuf::from("ovs-vsctl"),
            ovs_timeout_secs: 15,
        }
    }
}

impl DataplaneSettings {
    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        if self.integration_bridge.is_empty() {
            return Err(DataplaneError::InvalidConfig(
                "integration_bridge must not be empty".to_string(),
            ));
        }
        validate_ifname("container_ifname", &self.container_ifname)?;
        if self.ovs_vsctl.as_os_str().is_empty() {
            return Err(DataplaneError::InvalidConfig(
                "ovs_vsctl must not be empty".to_string(),
            ));
        }
        if self.ovs_timeout_secs == 0 {
            return Err(DataplaneError::InvalidConfig(
                "ovs_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_ifname(field: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_IFNAME_LEN {
        return Err(DataplaneError::InvalidConfig(format!(
            "{} must be 1-{} bytes, got {:?}",
            field, MAX_IFNAME_LEN, name
        )));
    }
    if name.contains(|c: char| c == '/' || c.is_whitespace()) || name == "." || name == ".." {
        return Err(DataplaneError::InvalidConfig(format!(
            "{} is not a valid interface name: {:?}",
            field, name
        )));
    }
    Ok(())
}
