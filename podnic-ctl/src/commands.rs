//! Subcommand handlers. Each returns the JSON document printed on stdout.

use anyhow::{bail, Result};
use podnic_dataplane::{
    InterfaceInspector, InterfaceProvisioner, MockNetwork, OvsPortManager, ProvisionRequest,
    SystemInspector, SystemProvisioner, SystemTeardown, TeardownCoordinator,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;

/// Selects the live system or the in-memory network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    System,
    Mock,
}

pub async fn provision(config: &Config, backend: Backend, request: ProvisionRequest) -> Result<Value> {
    let settings = config.dataplane.clone();
    let provisioned = match backend {
        Backend::System => SystemProvisioner::system(settings)?.provision(&request).await?,
        Backend::Mock => {
            let net = MockNetwork::new();
            InterfaceProvisioner::new(net.clone(), net.clone(), net, settings)?
                .provision(&request)
                .await?
        }
    };
    Ok(serde_json::to_value(provisioned)?)
}

pub async fn teardown(config: &Config, backend: Backend, container_id: &str) -> Result<Value> {
    let outcome = match backend {
        Backend::System => SystemTeardown::system(&config.dataplane)?
            .teardown(container_id)
            .await?,
        Backend::Mock => {
            let net = MockNetwork::new();
            TeardownCoordinator::new(net.clone(), net, &config.dataplane)?
                .teardown(container_id)
                .await?
        }
    };
    Ok(json!({ "container_id": container_id, "outcome": outcome }))
}

pub async fn status(config: &Config, backend: Backend, container_id: &str) -> Result<Value> {
    let host = match backend {
        Backend::System => SystemInspector::system(&config.dataplane)?
            .inspect(container_id)
            .await?,
        Backend::Mock => {
            let net = MockNetwork::new();
            InterfaceInspector::new(net.clone(), net, &config.dataplane)
                .inspect(container_id)
                .await?
        }
    };
    Ok(json!({ "container_id": container_id, "host": host }))
}

/// Prints the status even when the check fails.
pub async fn check(config: &Config) -> Result<Value> {
    let status = OvsPortManager::new(&config.dataplane).get_status().await;
    let document = serde_json::to_value(&status)?;

    if !status.available {
        warn!("ovs-vsctl is not available");
        println!("{}", serde_json::to_string_pretty(&document)?);
        bail!("ovs-vsctl not available at {}", config.dataplane.ovs_vsctl.display());
    }
    if !status.bridge_exists {
        warn!(bridge = %status.integration_bridge, "Integration bridge missing");
        println!("{}", serde_json::to_string_pretty(&document)?);
        bail!("integration bridge {} does not exist", status.integration_bridge);
    }

    info!(version = %status.ovs_version, bridge = %status.integration_bridge, "Open vSwitch ready");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use podnic_dataplane::DataplaneSettings;

    fn request(netns: &std::path::Path) -> ProvisionRequest {
        ProvisionRequest {
            pod_name: "web-0".to_string(),
            pod_namespace: "default".to_string(),
            netns: netns.to_path_buf(),
            container_id: "abc123def456ghi789".to_string(),
            mac: "02:11:22:33:44:55".to_string(),
            ip_cidr: "10.0.0.5/24".to_string(),
        }
    }

    #[tokio::test]
    async fn test_provision_mock_document() {
        let netns = tempfile::NamedTempFile::new().unwrap();
        let value = provision(&Config::default(), Backend::Mock, request(netns.path()))
            .await
            .unwrap();

        assert_eq!(value["pair"]["host_name"], "abc123def456_h");
        assert_eq!(value["container"]["name"], "eth0");
        assert_eq!(value["container"]["address"], "10.0.0.5/24");
        assert_eq!(value["host"]["binding"]["owner"], "web-0.default");
    }

    #[tokio::test]
    async fn test_provision_mock_bad_mac() {
        let netns = tempfile::NamedTempFile::new().unwrap();
        let mut req = request(netns.path());
        req.mac = "bogus".to_string();

        let err = provision(&Config::default(), Backend::Mock, req).await.unwrap_err();
        assert!(format!("{:#}", err).contains("bogus"));
    }

    #[tokio::test]
    async fn test_teardown_mock_absent() {
        let value = teardown(&Config::default(), Backend::Mock, "abc123def456ghi789")
            .await
            .unwrap();
        assert_eq!(value["outcome"], "already_absent");
    }

    #[tokio::test]
    async fn test_status_mock_absent() {
        let value = status(&Config::default(), Backend::Mock, "abc123def456ghi789")
            .await
            .unwrap();
        assert!(value["host"].is_null());
    }

    #[tokio::test]
    async fn test_check_without_vsctl_fails() {
        let config = Config {
            dataplane: DataplaneSettings {
                ovs_vsctl: "/nonexistent/ovs-vsctl".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = check(&config).await.unwrap_err();
        assert!(err.to_string().contains("not available"));
    }
}
