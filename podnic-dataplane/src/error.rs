//! Error types for the pod data plane.

use std::fmt;

use thiserror::Error;

/// Step of a provisioning or teardown sequence at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DeriveNames,
    CreatePair,
    BindPort,
    ParseMac,
    ParseAddress,
    SetHostHardwareAddress,
    SetHostUp,
    ResolveNamespace,
    MoveToNamespace,
    EnterNamespace,
    RestoreNamespace,
    RenameLink,
    AssignAddress,
    SetContainerHardwareAddress,
    SetContainerUp,
    RemovePort,
    LookupHostLink,
    LookupPort,
    DeleteHostLink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DeriveNames => "derive-names",
            Stage::CreatePair => "create-pair",
            Stage::BindPort => "bind-port",
            Stage::ParseMac => "parse-mac",
            Stage::ParseAddress => "parse-address",
            Stage::SetHostHardwareAddress => "set-host-mac",
            Stage::SetHostUp => "set-host-up",
            Stage::ResolveNamespace => "resolve-netns",
            Stage::MoveToNamespace => "move-to-netns",
            Stage::EnterNamespace => "enter-netns",
            Stage::RestoreNamespace => "restore-netns",
            Stage::RenameLink => "rename-link",
            Stage::AssignAddress => "assign-address",
            Stage::SetContainerHardwareAddress => "set-container-mac",
            Stage::SetContainerUp => "set-container-up",
            Stage::RemovePort => "remove-port",
            Stage::LookupHostLink => "lookup-host-link",
            Stage::LookupPort => "lookup-port",
            Stage::DeleteHostLink => "delete-host-link",
        };
        f.write_str(name)
    }
}

/// Failure reported by one of the external systems (kernel, OVS, filesystem).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    /// The named link does not exist.
    #[error("link {0} not found")]
    NotFound(String),

    /// A netlink request was rejected or the socket failed.
    #[error("netlink: {0}")]
    Netlink(String),

    /// A system call or file operation failed.
    #[error("io: {0}")]
    Io(String),

    /// An external command exited unsuccessfully. `output` is the combined
    /// stdout/stderr, kept verbatim.
    #[error("`{command}` exited with {status}: {output}")]
    Command {
        command: String,
        status: String,
        output: String,
    },
}

impl From<std::io::Error> for SystemError {
    fn from(err: std::io::Error) -> Self {
        SystemError::Io(err.to_string())
    }
}

impl From<nix::errno::Errno> for SystemError {
    fn from(err: nix::errno::Errno) -> Self {
        SystemError::Io(err.desc().to_string())
    }
}

/// Errors surfaced by provisioning, teardown and inspection.
#[derive(Error, Debug)]
pub enum DataplaneError {
    /// Container ID cannot be used to derive interface names.
    #[error("Invalid container ID {0:?}: need at least 12 characters")]
    InvalidContainerId(String),

    /// Malformed MAC address or CIDR.
    #[error("Invalid address {value:?} ({stage}): {reason}")]
    InvalidAddress {
        stage: Stage,
        value: String,
        reason: String,
    },

    /// Creating the veth pair failed.
    #[error("Failed to create link pair ({stage}): {source}")]
    LinkCreateFailed {
        stage: Stage,
        #[source]
        source: SystemError,
    },

    /// Adding the host end to the integration bridge failed.
    #[error("Failed to bind port to switch ({stage}): {source}")]
    SwitchBindFailed {
        stage: Stage,
        #[source]
        source: SystemError,
    },

    /// Removing the switch port failed for a reason other than absence.
    #[error("Failed to remove switch port ({stage}): {source}")]
    SwitchPortRemoveFailed {
        stage: Stage,
        #[source]
        source: SystemError,
    },

    /// The namespace reference could not be opened.
    #[error("Failed to resolve network namespace {path} ({stage}): {source}")]
    NamespaceResolutionFailed {
        stage: Stage,
        path: String,
        #[source]
        source: SystemError,
    },

    /// Configuring either end of the pair, or entering its namespace, failed.
    /// `target` is the link name or the namespace path.
    #[error("Failed to configure {target} ({stage}): {source}")]
    LinkConfigureFailed {
        stage: Stage,
        target: String,
        #[source]
        source: SystemError,
    },

    /// Looking up a link failed for a reason other than absence.
    #[error("Failed to look up link {link} ({stage}): {source}")]
    LinkLookupFailed {
        stage: Stage,
        link: String,
        #[source]
        source: SystemError,
    },

    /// Deleting the host end failed.
    #[error("Failed to delete link {link} ({stage}): {source}")]
    LinkDeleteFailed {
        stage: Stage,
        link: String,
        #[source]
        source: SystemError,
    },

    /// The kernel or switch backend could not be opened.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[source] SystemError),

    /// Settings rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DataplaneError {
    /// Stage at which the failure occurred, if the error belongs to a sequence.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DataplaneError::InvalidContainerId(_) => Some(Stage::DeriveNames),
            DataplaneError::InvalidAddress { stage, .. }
            | DataplaneError::LinkCreateFailed { stage, .. }
            | DataplaneError::SwitchBindFailed { stage, .. }
            | DataplaneError::SwitchPortRemoveFailed { stage, .. }
            | DataplaneError::NamespaceResolutionFailed { stage, .. }
            | DataplaneError::LinkConfigureFailed { stage, .. }
            | DataplaneError::LinkLookupFailed { stage, .. }
            | DataplaneError::LinkDeleteFailed { stage, .. } => Some(*stage),
            DataplaneError::BackendUnavailable(_) | DataplaneError::InvalidConfig(_) => None,
        }
    }

    pub(crate) fn configure(stage: Stage, target: impl Into<String>, source: SystemError) -> Self {
        DataplaneError::LinkConfigureFailed {
            stage,
            target: target.into(),
            source,
        }
    }
}

/// Result type alias for data plane operations.
pub type Result<T> = std::result::Result<T, DataplaneError>;
