//! # podnic-ctl
//!
//! Operator CLI for the podnic data plane: attaches a pod to the OVS
//! integration bridge, detaches it, and reports on the attachment.
//!
//! ## Usage
//! ```bash
//! podnic-ctl provision --pod-name web-0 --pod-namespace default \
//!     --netns /var/run/netns/cni-1234 --container-id abc123def456ghi789 \
//!     --mac 02:11:22:33:44:55 --ip 10.0.0.5/24
//! podnic-ctl teardown --container-id abc123def456ghi789
//! podnic-ctl --config /etc/podnic/podnic.yaml check
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cli;
mod commands;
mod config;

use cli::{Args, Command};
use commands::Backend;
use config::{Config, ConfigSource};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Logging depends on the config file, so load it first
    let (config, source) = Config::resolve(&args)?;
    podnic_common::init_logging(&config.log_level, config.log_format)?;

    match &source {
        ConfigSource::File(path) => info!(config_path = %path.display(), "Configuration loaded"),
        ConfigSource::Defaults => info!("No config file found, using CLI arguments and defaults"),
    }

    let backend = if args.dev {
        info!("Development mode: using in-memory network");
        Backend::Mock
    } else {
        Backend::System
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bridge = %config.dataplane.integration_bridge,
        "podnic-ctl starting"
    );

    let result = match args.command {
        Command::Provision(provision) => {
            let request = provision.into_request()?;
            commands::provision(&config, backend, request).await
        }
        Command::Teardown { container_id } => {
            commands::teardown(&config, backend, &container_id).await
        }
        Command::Status { container_id } => commands::status(&config, backend, &container_id).await,
        Command::Check => commands::check(&config).await,
    };

    match result {
        Ok(document) => {
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            Err(e)
        }
    }
}
