//! Host mount model: the object hooks attach to and the operations the
//! framework wraps.
//!
//! The framework never locks the mount itself. Callers are responsible for
//! keeping a mount alive across every framework call that touches it; the
//! record cell is the only field the framework owns, and it is managed
//! exclusively through the late-init gate.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;

use crate::dispatch;
use crate::hooks::{Errno, OpStatus};
use crate::record::{self, FsRecord};

/// Transfer accounting for one read or write call.
///
/// `resid` is the number of bytes left to transfer; the wrapped operation
/// decrements it by the amount it moved. Hooks may shrink or extend it on
/// either side of the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uio {
    pub resid: u64,
    pub offset: u64,
}

impl Uio {
    pub fn new(resid: u64, offset: u64) -> Self {
        Self { resid, offset }
    }
}

/// Caller flags passed through to the wrapped read/write operation.
pub type IoFlags = u32;

/// Arguments of the wrapped native mount operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountArgs {
    pub flags: u32,
}

/// The underlying filesystem operations of one mount. The framework wraps
/// these with the hook chain; their semantics are entirely the host's.
pub trait MountOps: Send + Sync {
    fn read(&self, mnt: &Mount, uio: &mut Uio, flags: IoFlags) -> OpStatus;
    fn write(&self, mnt: &Mount, uio: &mut Uio, flags: IoFlags) -> OpStatus;
    fn mount(&self, mnt: &Mount, args: &mut MountArgs) -> OpStatus {
        let _ = (mnt, args);
        Ok(())
    }
    fn unmount(&self, mnt: &Mount, flags: u32) -> OpStatus {
        let _ = (mnt, flags);
        Ok(())
    }
}

/// Stable identity of a mount, independent of its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MountId(u64);

static NEXT_MOUNT_ID: AtomicU64 = AtomicU64::new(1);

/// One mounted filesystem, the granularity at which hooks are installed.
pub struct Mount {
    id: MountId,
    mountpoint: String,
    ops: Box<dyn MountOps>,
    /// Late-init gate cell; see the record module.
    record: AtomicPtr<FsRecord>,
}

impl Mount {
    /// Create a mount without running the native mount path. Hosts that
    /// build mount objects out of band use this; the per-mount record is
    /// attached lazily on first framework touch either way.
    pub fn new(mountpoint: impl Into<String>, ops: Box<dyn MountOps>) -> Arc<Self> {
        Arc::new(Self {
            id: MountId(NEXT_MOUNT_ID.fetch_add(1, Ordering::Relaxed)),
            mountpoint: mountpoint.into(),
            ops,
            record: AtomicPtr::new(ptr::null_mut()),
        })
    }

    /// Full mount path: create the mount, run the wrapped native mount
    /// operation, and on success announce the new mount on the callback
    /// bus. Mount callbacks run after the native path returned, so a
    /// callback installing hooks observes a fully mounted filesystem.
    pub fn mount(
        mountpoint: impl Into<String>,
        ops: Box<dyn MountOps>,
        args: &mut MountArgs,
    ) -> Result<Arc<Self>, Errno> {
        let mnt = Mount::new(mountpoint, ops);
        dispatch::mount_on(&mnt, args)?;
        crate::callbacks::exec_mount(&mnt);
        Ok(mnt)
    }

    pub fn id(&self) -> MountId {
        self.id
    }

    pub fn mountpoint(&self) -> &str {
        &self.mountpoint
    }

    /// Re-run the wrapped native mount operation on an existing mount.
    pub fn remount(&self, args: &mut MountArgs) -> OpStatus {
        dispatch::mount_on(self, args)
    }

    /// Read through the hook chain.
    pub fn read(&self, uio: &mut Uio, flags: IoFlags) -> OpStatus {
        dispatch::read(self, uio, flags)
    }

    /// Write through the hook chain.
    pub fn write(&self, uio: &mut Uio, flags: IoFlags) -> OpStatus {
        dispatch::write(self, uio, flags)
    }

    /// Unmount through the hook chain. Does not destroy the mount; the
    /// host frees it separately once its own references drain.
    pub fn unmount(&self, flags: u32) -> OpStatus {
        dispatch::unmount(self, flags)
    }

    pub(crate) fn ops(&self) -> &dyn MountOps {
        &*self.ops
    }

    /// Per-mount record, attached on first use.
    pub(crate) fn record(&self) -> &FsRecord {
        let p = record::prepare(&self.record);
        // Safety: the published record stays alive until this mount is
        // dropped, and the returned borrow cannot outlive `self`.
        unsafe { &*p }
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        record::destroy(&self.record);
    }
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("id", &self.id)
            .field("mountpoint", &self.mountpoint)
            .finish_non_exhaustive()
    }
}
