//! Types for the Open vSwitch control plane.

use std::process::ExitStatus;

use serde::{Deserialize, Serialize};

use crate::error::SystemError;

/// Captured result of an `ovs-vsctl` invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Rendered command line, for diagnostics
    pub command: String,
    /// Exit status
    pub status: ExitStatus,
    /// Trimmed stdout
    pub stdout: String,
    /// stdout followed by stderr, untouched
    pub combined: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Turn a failed run into [`SystemError::Command`] carrying the combined output.
    pub fn into_result(self) -> Result<String, SystemError> {
        if self.status.success() {
            Ok(self.stdout)
        } else {
            Err(SystemError::Command {
                command: self.command,
                status: self.status.to_string(),
                output: self.combined,
            })
        }
    }
}

/// OVS status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OvsStatus {
    /// Is ovs-vsctl available?
    pub available: bool,
    /// OVS version string
    pub ovs_version: String,
    /// Does the integration bridge exist?
    pub bridge_exists: bool,
    /// Is ovn-controller active?
    pub ovn_controller_connected: bool,
    /// Integration bridge name
    pub integration_bridge: String,
    /// Encapsulation type (e.g., "geneve")
    pub encap_type: String,
    /// Encapsulation IP
    pub encap_ip: String,
    /// OVN chassis ID
    pub chassis_id: String,
}

impl Default for OvsStatus {
    fn default() -> Self {
        Self {
            available: false,
            ovs_version: String::new(),
            bridge_exists: false,
            ovn_controller_connected: false,
            integration_bridge: "br-int".to_string(),
            encap_type: String::new(),
            encap_ip: String::new(),
            chassis_id: String::new(),
        }
    }
}
