//! End-to-end run against the real kernel and Open vSwitch.
//!
//! Needs root, iproute2 and a running ovs-vswitchd with `br-int`:
//!
//! ```bash
//! sudo -E cargo test -p podnic-dataplane --test kernel -- --ignored
//! ```

use std::process::Command;

use podnic_dataplane::{
    DataplaneSettings, LinkState, ProvisionRequest, SystemInspector, SystemProvisioner,
    SystemTeardown, TeardownOutcome,
};

const NETNS: &str = "podnic-kernel-test";
const CONTAINER_ID: &str = "feedc0ffee00kerneltest";

struct NamedNetns;

impl NamedNetns {
    fn create() -> Self {
        let status = Command::new("ip").args(["netns", "add", NETNS]).status().unwrap();
        assert!(status.success(), "ip netns add failed");
        NamedNetns
    }
}

impl Drop for NamedNetns {
    fn drop(&mut self) {
        let _ = Command::new("ip").args(["netns", "delete", NETNS]).status();
    }
}

fn ip_in_netns(args: &[&str]) -> String {
    let output = Command::new("ip")
        .args(["netns", "exec", NETNS, "ip"])
        .args(args)
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[tokio::test]
#[ignore = "requires root and Open vSwitch"]
async fn test_provision_and_teardown_on_host() {
    let _netns = NamedNetns::create();
    let settings = DataplaneSettings::default();

    let request = ProvisionRequest {
        pod_name: "kernel-test".to_string(),
        pod_namespace: "podnic".to_string(),
        netns: format!("/var/run/netns/{}", NETNS).into(),
        container_id: CONTAINER_ID.to_string(),
        mac: "02:11:22:33:44:55".to_string(),
        ip_cidr: "10.250.0.5/24".to_string(),
    };

    let provisioner = SystemProvisioner::system(settings.clone()).unwrap();
    provisioner.provision(&request).await.unwrap();

    let host = SystemInspector::system(&settings)
        .unwrap()
        .inspect(CONTAINER_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(host.state, LinkState::Up);
    assert_eq!(host.binding.unwrap().owner.as_str(), "kernel-test.podnic");

    let link = ip_in_netns(&["-o", "link", "show", "eth0"]);
    assert!(link.contains("02:11:22:33:44:55"), "{}", link);
    let addr = ip_in_netns(&["-o", "addr", "show", "eth0"]);
    assert!(addr.contains("10.250.0.5/24"), "{}", addr);

    let teardown = SystemTeardown::system(&settings).unwrap();
    assert_eq!(teardown.teardown(CONTAINER_ID).await.unwrap(), TeardownOutcome::Removed);
    assert_eq!(
        teardown.teardown(CONTAINER_ID).await.unwrap(),
        TeardownOutcome::AlreadyAbsent
    );
    assert!(ip_in_netns(&["-o", "link", "show", "eth0"]).is_empty());
}
