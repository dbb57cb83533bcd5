//! `OvsPortManager` against a scripted stand-in for ovs-vsctl.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use podnic_dataplane::{DataplaneSettings, OvsPortManager, OwnerTag, SwitchBackend, SystemError};
use tempfile::TempDir;

const FAKE_VSCTL: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
case "$*" in
  *--version*)
    echo "ovs-vsctl (Open vSwitch) 3.1.0"
    echo "DB Schema 8.3.1"
    ;;
  *"get Open_vSwitch . external_ids"*)
    echo '{hostname=node1, ovn-encap-ip="10.0.0.1", ovn-encap-type=geneve, system-id="chassis-1"}'
    ;;
  *"br-exists br-int"*)
    ;;
  *br-exists*)
    exit 2
    ;;
  *"add-port br-missing"*)
    echo "ovs-vsctl: no bridge named br-missing" >&2
    exit 1
    ;;
  *"iface-to-br abc123def456_h"*)
    echo br-int
    ;;
  *"get Interface abc123def456_h"*)
    echo '{attached-mac="02:11:22:33:44:55", iface-id="web-0.default"}'
    ;;
  *"get Interface"*)
    ;;
esac
"#;

struct FakeVsctl {
    dir: TempDir,
    path: PathBuf,
}

impl FakeVsctl {
    fn install() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ovs-vsctl");
        fs::write(&path, FAKE_VSCTL).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    fn manager(&self, bridge: &str) -> OvsPortManager {
        OvsPortManager::new(&DataplaneSettings {
            integration_bridge: bridge.to_string(),
            ovs_vsctl: self.path.clone(),
            ovs_timeout_secs: 5,
            ..Default::default()
        })
    }

    fn calls(&self) -> Vec<String> {
        read_lines(&self.dir.path().join("calls.log"))
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_add_port_sets_iface_id() {
    let vsctl = FakeVsctl::install();
    vsctl
        .manager("br-int")
        .add_port("br-int", "abc123def456_h", &OwnerTag::new("web-0", "default"))
        .await
        .unwrap();

    assert_eq!(
        vsctl.calls(),
        vec![
            "--timeout=5 --may-exist add-port br-int abc123def456_h -- set Interface abc123def456_h external_ids:iface-id=web-0.default"
        ]
    );
}

#[tokio::test]
async fn test_add_port_failure_keeps_tool_output() {
    let vsctl = FakeVsctl::install();
    let err = vsctl
        .manager("br-missing")
        .add_port("br-missing", "abc123def456_h", &OwnerTag::new("web-0", "default"))
        .await
        .unwrap_err();

    match err {
        SystemError::Command { command, output, .. } => {
            assert!(command.contains("add-port br-missing"));
            assert_eq!(output, "ovs-vsctl: no bridge named br-missing\n");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_remove_port_is_tolerant() {
    let vsctl = FakeVsctl::install();
    vsctl
        .manager("br-int")
        .remove_port("br-int", "abc123def456_h")
        .await
        .unwrap();

    assert_eq!(
        vsctl.calls(),
        vec!["--timeout=5 --if-exists --with-iface del-port br-int abc123def456_h"]
    );
}

#[tokio::test]
async fn test_port_owner() {
    let vsctl = FakeVsctl::install();
    let manager = vsctl.manager("br-int");

    let owner = manager.port_owner("br-int", "abc123def456_h").await.unwrap();
    assert_eq!(owner.map(|o| o.to_string()), Some("web-0.default".to_string()));

    // Bound, but to a different bridge
    let owner = manager.port_owner("br-pods", "abc123def456_h").await.unwrap();
    assert!(owner.is_none());

    // --if-exists prints nothing for an unknown interface
    let owner = manager.port_owner("br-int", "000000000000_h").await.unwrap();
    assert!(owner.is_none());
}

#[tokio::test]
async fn test_status_reads_chassis_details() {
    let vsctl = FakeVsctl::install();
    let status = vsctl.manager("br-int").get_status().await;

    assert!(status.available);
    assert_eq!(status.ovs_version, "3.1.0");
    assert!(status.bridge_exists);
    assert_eq!(status.encap_type, "geneve");
    assert_eq!(status.encap_ip, "10.0.0.1");
    assert_eq!(status.chassis_id, "chassis-1");
}

#[tokio::test]
async fn test_status_missing_bridge() {
    let vsctl = FakeVsctl::install();
    let status = vsctl.manager("br-pods").get_status().await;

    assert!(status.available);
    assert!(!status.bridge_exists);
    assert!(!status.ovn_controller_connected);
    assert_eq!(status.integration_bridge, "br-pods");
}
