//! Network namespace handles and the thread-pinned namespace executor.
//!
//! Namespace membership belongs to an OS thread. [`ThreadNamespaceExecutor`]
//! therefore never switches a tokio worker: each call gets a fresh thread that
//! enters the namespace, drives the operation on its own current-thread
//! runtime, restores the original namespace and exits.

use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};
use std::thread;

use async_trait::async_trait;
use futures::future::BoxFuture;
use nix::sched::{setns, CloneFlags};
use nix::sys::statfs::{fstatfs, NSFS_MAGIC};
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use crate::error::{DataplaneError, Result, Stage, SystemError};
use crate::netlink::NetlinkBackend;
use crate::traits::NamespaceExecutor;

/// Namespace file of the calling thread.
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// An open network namespace reference.
///
/// Holding the descriptor keeps the namespace alive and lets links be moved
/// by fd rather than by path.
#[derive(Debug)]
pub struct NetNs {
    path: PathBuf,
    file: File,
}

impl NetNs {
    /// Open a namespace by path (e.g., `/var/run/netns/cni-...` or `/proc/<pid>/ns/net`).
    ///
    /// The path must live on nsfs; directories and ordinary files are rejected.
    pub fn open(path: impl AsRef<Path>) -> std::result::Result<Self, SystemError> {
        let netns = Self::open_unchecked(path)?;
        let fs = fstatfs(&netns.file)
            .map_err(|e| SystemError::Io(format!("statfs {}: {}", netns.path.display(), e)))?;
        if fs.filesystem_type() != NSFS_MAGIC {
            return Err(SystemError::Io(format!(
                "{} is not a network namespace",
                netns.path.display()
            )));
        }
        Ok(netns)
    }

    /// Open any file as a namespace handle. Used by the in-memory backend,
    /// where plain files stand in for namespaces.
    pub(crate) fn open_unchecked(path: impl AsRef<Path>) -> std::result::Result<Self, SystemError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| SystemError::Io(format!("open {}: {}", path.display(), e)))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Duplicate the handle so it can be moved to another thread.
    pub fn try_clone(&self) -> std::result::Result<Self, SystemError> {
        Ok(Self {
            path: self.path.clone(),
            file: self.file.try_clone()?,
        })
    }
}

impl AsFd for NetNs {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for NetNs {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Holds the calling thread inside a target namespace until released.
///
/// [`NamespaceGuard::restore`] is the normal exit and reports failure; `Drop`
/// restores on unwinding paths and can only log.
pub struct NamespaceGuard {
    original: Option<File>,
}

impl NamespaceGuard {
    /// Switch the calling thread into `target`.
    pub fn enter(target: &NetNs) -> std::result::Result<Self, SystemError> {
        let original = File::open(THREAD_NETNS)
            .map_err(|e| SystemError::Io(format!("open {}: {}", THREAD_NETNS, e)))?;
        setns(target, CloneFlags::CLONE_NEWNET)?;
        trace!(netns = %target.path().display(), "Entered network namespace");
        Ok(Self {
            original: Some(original),
        })
    }

    /// Switch back to the namespace the thread was in before `enter`.
    pub fn restore(mut self) -> std::result::Result<(), SystemError> {
        match self.original.take() {
            Some(original) => {
                setns(&original, CloneFlags::CLONE_NEWNET)?;
                trace!("Restored original network namespace");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            if let Err(e) = setns(&original, CloneFlags::CLONE_NEWNET) {
                error!(error = %e, "Failed to restore network namespace");
            }
        }
    }
}

/// Executes namespace-scoped work on a dedicated, non-reused OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadNamespaceExecutor;

impl ThreadNamespaceExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NamespaceExecutor for ThreadNamespaceExecutor {
    type Links = NetlinkBackend;

    fn resolve(&self, path: &Path) -> std::result::Result<NetNs, SystemError> {
        NetNs::open(path)
    }

    async fn run_in_namespace<T, F>(&self, netns: &NetNs, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a Self::Links) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        let ns_path = netns.path().display().to_string();
        let target = netns
            .try_clone()
            .map_err(|e| DataplaneError::configure(Stage::EnterNamespace, ns_path.clone(), e))?;

        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name("podnic-netns".to_string())
            .spawn(move || {
                let _ = tx.send(run_pinned(&target, op));
            })
            .map_err(|e| DataplaneError::configure(Stage::EnterNamespace, ns_path.clone(), e.into()))?;

        debug!(netns = %ns_path, "Dispatched operation to namespace thread");

        rx.await.map_err(|_| {
            DataplaneError::configure(
                Stage::EnterNamespace,
                ns_path,
                SystemError::Io("namespace thread exited without a result".to_string()),
            )
        })?
    }
}

/// Body of the namespace thread: enter, run, restore.
fn run_pinned<T, F>(target: &NetNs, op: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a NetlinkBackend) -> BoxFuture<'a, Result<T>>,
{
    let ns_path = target.path().display().to_string();
    let guard = NamespaceGuard::enter(target)
        .map_err(|e| DataplaneError::configure(Stage::EnterNamespace, ns_path.clone(), e))?;

    let result = block_on_in_namespace(op);

    match guard.restore() {
        Ok(()) => result,
        Err(e) => {
            error!(netns = %ns_path, error = %e, "Failed to restore network namespace");
            // The operation's own error is the more useful one to report
            match result {
                Ok(_) => Err(DataplaneError::configure(Stage::RestoreNamespace, ns_path, e)),
                Err(op_err) => Err(op_err),
            }
        }
    }
}

/// Drive `op` on a runtime local to this thread with a netlink socket opened
/// inside the current namespace.
fn block_on_in_namespace<T, F>(op: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a NetlinkBackend) -> BoxFuture<'a, Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DataplaneError::BackendUnavailable(e.into()))?;

    runtime.block_on(async move {
        let links = NetlinkBackend::connect().map_err(DataplaneError::BackendUnavailable)?;
        op(&links).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_namespace_fails() {
        let err = NetNs::open("/nonexistent/podnic/netns").unwrap_err();
        assert!(matches!(err, SystemError::Io(ref msg) if msg.contains("/nonexistent/podnic/netns")));
    }

    #[test]
    fn test_open_rejects_non_namespace_paths() {
        let dir = tempfile::tempdir().unwrap();
        let err = NetNs::open(dir.path()).unwrap_err();
        assert!(matches!(err, SystemError::Io(ref msg) if msg.contains("not a network namespace")));

        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(NetNs::open(file.path()).is_err());
    }

    #[test]
    fn test_thread_executor_resolve_checks_nsfs() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ThreadNamespaceExecutor::new();
        assert!(executor.resolve(dir.path()).is_err());
        assert!(executor.resolve(Path::new(THREAD_NETNS)).is_ok());
    }

    #[test]
    fn test_open_accepts_own_namespace() {
        let ns = NetNs::open(THREAD_NETNS).unwrap();
        assert_eq!(ns.path(), Path::new(THREAD_NETNS));
    }

    #[test]
    fn test_open_and_clone_keep_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let ns = NetNs::open_unchecked(file.path()).unwrap();
        let dup = ns.try_clone().unwrap();
        assert_eq!(ns.path(), dup.path());
        assert_ne!(ns.as_raw_fd(), dup.as_raw_fd());
    }
}
