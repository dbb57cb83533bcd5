//! Command-line argument parsing.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use podnic_dataplane::ProvisionRequest;

/// podnic - attach pods to the OVS integration bridge
#[derive(Parser, Debug)]
#[command(name = "podnic-ctl")]
#[command(about = "podnic - attach pods to the OVS integration bridge")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "PODNIC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Integration bridge to bind host interfaces to
    #[arg(long)]
    pub bridge: Option<String>,

    /// Enable development mode (in-memory network, nothing touches the host)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and attach a pod interface
    Provision(ProvisionArgs),

    /// Detach and remove a pod interface
    Teardown {
        /// Container ID the interface was provisioned for
        #[arg(long)]
        container_id: String,
    },

    /// Show the host side of a pod interface
    Status {
        #[arg(long)]
        container_id: String,
    },

    /// Check that Open vSwitch and the integration bridge are usable
    Check,
}

#[derive(ClapArgs, Debug)]
pub struct ProvisionArgs {
    /// Read the whole request from a JSON file
    #[arg(
        long,
        conflicts_with_all = ["pod_name", "pod_namespace", "netns", "container_id", "mac", "ip"]
    )]
    pub request: Option<PathBuf>,

    #[arg(long)]
    pub pod_name: Option<String>,

    #[arg(long)]
    pub pod_namespace: Option<String>,

    /// Path of the pod's network namespace handle
    #[arg(long)]
    pub netns: Option<PathBuf>,

    #[arg(long)]
    pub container_id: Option<String>,

    /// MAC address shared by both ends, e.g. 02:11:22:33:44:55
    #[arg(long)]
    pub mac: Option<String>,

    /// Address with prefix length, e.g. 10.0.0.5/24
    #[arg(long)]
    pub ip: Option<String>,
}

impl ProvisionArgs {
    /// Build the request from the JSON file or from the individual flags.
    pub fn into_request(self) -> Result<ProvisionRequest> {
        if let Some(path) = self.request {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read request file: {}", path.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse request file: {}", path.display()));
        }

        Ok(ProvisionRequest {
            pod_name: required(self.pod_name, "--pod-name")?,
            pod_namespace: required(self.pod_namespace, "--pod-namespace")?,
            netns: required(self.netns, "--netns")?,
            container_id: required(self.container_id, "--container-id")?,
            mac: required(self.mac, "--mac")?,
            ip_cidr: required(self.ip, "--ip")?,
        })
    }
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("{} is required unless --request is given", flag))
}
