//! OVS (Open vSwitch) port manager.
//!
//! This module handles:
//! - Checking OVS availability and status
//! - Adding pod veth host ends to the integration bridge (br-int)
//! - Setting the iface-id external_id ovn-controller binds on
//! - Tolerant port removal for teardown

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::types::{CommandOutput, OvsStatus};
use crate::config::DataplaneSettings;
use crate::error::SystemError;
use crate::traits::{SwitchBackend, SysResult};
use crate::types::OwnerTag;

/// External id ovn-controller matches against logical switch port names.
const IFACE_ID_KEY: &str = "iface-id";

/// OVS port manager for connecting pods to OVN.
#[derive(Debug, Clone)]
pub struct OvsPortManager {
    /// ovs-vsctl binary
    vsctl: PathBuf,
    /// Seconds before ovs-vsctl gives up waiting for ovsdb-server
    timeout_secs: u64,
    /// Integration bridge name (default: "br-int")
    integration_bridge: String,
}

impl OvsPortManager {
    /// Create a new OVS port manager.
    pub fn new(settings: &DataplaneSettings) -> Self {
        Self {
            vsctl: settings.ovs_vsctl.clone(),
            timeout_secs: settings.ovs_timeout_secs,
            integration_bridge: settings.integration_bridge.clone(),
        }
    }

    /// Run ovs-vsctl and capture its result. Only a failure to spawn is an error.
    async fn vsctl(&self, args: &[&str]) -> SysResult<CommandOutput> {
        let timeout = format!("--timeout={}", self.timeout_secs);
        let command = format!("{} {} {}", self.vsctl.display(), timeout, args.join(" "));
        debug!(command = %command, "Running ovs-vsctl");

        let output = Command::new(&self.vsctl)
            .arg(&timeout)
            .args(args)
            .output()
            .await
            .map_err(|e| SystemError::Io(format!("failed to run {}: {}", self.vsctl.display(), e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        Ok(CommandOutput {
            command,
            status: output.status,
            stdout: stdout.trim().to_string(),
            combined: format!("{}{}", stdout, stderr),
        })
    }

    /// Check if OVS is available and get its status.
    #[instrument(skip(self))]
    pub async fn get_status(&self) -> OvsStatus {
        let mut status = OvsStatus {
            integration_bridge: self.integration_bridge.clone(),
            ..Default::default()
        };

        match self.vsctl(&["--version"]).await {
            Ok(output) if output.success() => {
                status.available = true;
                // First line: "ovs-vsctl (Open vSwitch) 2.17.0"
                if let Some(ver) = output
                    .stdout
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().last())
                {
                    status.ovs_version = ver.to_string();
                }
            }
            _ => {
                warn!("OVS not available: ovs-vsctl not found or not executable");
                return status;
            }
        }

        match self.vsctl(&["get", "Open_vSwitch", ".", "external_ids"]).await {
            Ok(output) if output.success() => {
                let ids = parse_external_ids(&output.stdout);
                if let Some(encap_type) = ids.get("ovn-encap-type") {
                    status.encap_type = encap_type.clone();
                }
                if let Some(encap_ip) = ids.get("ovn-encap-ip") {
                    status.encap_ip = encap_ip.clone();
                }
                if let Some(system_id) = ids.get("system-id") {
                    status.chassis_id = system_id.clone();
                }
            }
            _ => warn!("Failed to read Open_vSwitch external_ids"),
        }

        status.bridge_exists = self
            .vsctl(&["br-exists", &self.integration_bridge])
            .await
            .map(|o| o.success())
            .unwrap_or(false);

        if status.bridge_exists {
            status.ovn_controller_connected = Command::new("systemctl")
                .args(["is-active", "--quiet", "ovn-controller"])
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false);
        }

        debug!(
            ovs_version = %status.ovs_version,
            bridge_exists = status.bridge_exists,
            ovn_connected = status.ovn_controller_connected,
            bridge = %status.integration_bridge,
            "OVS status retrieved"
        );

        status
    }
}

#[async_trait]
impl SwitchBackend for OvsPortManager {
    #[instrument(skip(self), fields(owner = %owner))]
    async fn add_port(&self, bridge: &str, iface: &str, owner: &OwnerTag) -> SysResult<()> {
        let iface_id = format!("external_ids:{}={}", IFACE_ID_KEY, owner);
        self.vsctl(&[
            "--may-exist",
            "add-port",
            bridge,
            iface,
            "--",
            "set",
            "Interface",
            iface,
            &iface_id,
        ])
        .await?
        .into_result()?;

        info!(bridge = %bridge, iface = %iface, "Port added to bridge");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_port(&self, bridge: &str, iface: &str) -> SysResult<()> {
        self.vsctl(&["--if-exists", "--with-iface", "del-port", bridge, iface])
            .await?
            .into_result()?;

        debug!(bridge = %bridge, iface = %iface, "Port removed from bridge");
        Ok(())
    }

    async fn port_owner(&self, bridge: &str, iface: &str) -> SysResult<Option<OwnerTag>> {
        let stdout = self
            .vsctl(&["--if-exists", "get", "Interface", iface, "external_ids"])
            .await?
            .into_result()?;

        // --if-exists prints nothing when the record is missing
        if stdout.is_empty() {
            return Ok(None);
        }

        let attached_to = self.vsctl(&["iface-to-br", iface]).await?.into_result()?;
        if attached_to != bridge {
            debug!(iface = %iface, bridge = %attached_to, expected = %bridge, "Interface is on another bridge");
            return Ok(None);
        }

        let ids = parse_external_ids(&stdout);
        let owner = ids.get(IFACE_ID_KEY).cloned().unwrap_or_default();
        Ok(Some(OwnerTag::from_raw(owner)))
    }
}

/// Parse an ovsdb map as printed by `ovs-vsctl get`: `{key1=val1, key2="val 2"}`.
pub fn parse_external_ids(raw: &str) -> HashMap<String, String> {
    let mut ids = HashMap::new();
    let trimmed = raw.trim().trim_start_matches('{').trim_end_matches('}');
    for pair in trimmed.split(", ") {
        if let Some((key, value)) = pair.split_once('=') {
            ids.insert(
                key.trim().trim_matches('"').to_string(),
                value.trim().trim_matches('"').to_string(),
            );
        }
    }
    ids
}
