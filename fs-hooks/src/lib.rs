//! Mount-level filesystem hook framework.
//!
//! Design
//! -------
//! Clients inject behavior into filesystem operations by installing hooks
//! on individual mounts. A hook is a set of optional pre/post functions for
//! each interception point (read, write, mount, unmount), a shared opaque
//! argument, and an optional removal callback; see [`HookSet`]. Installing
//! returns a [`Handle`] used for removal. Hooks on one mount execute in
//! LIFO installation order: for hooks A then B, a read runs
//! `preB, preA, read, postA, postB`, nesting like layered proxies.
//!
//! A pre function is always paired with its post function within the same
//! call, on the same thread, with the same instance slot. Install and
//! remove are legal from inside hooks and from inside mount callbacks. The
//! one forbidden reentrancy is installing or removing a mount/free
//! *callback* from inside a callback, which deadlocks by design.
//!
//! Removal never waits for running hooks. [`remove`] unhooks the entry
//! from the registry and marks it doomed, so no new call can pick it up;
//! threads already executing it finish normally. The removal callback
//! fires exactly once, after the last such thread has released the entry,
//! possibly inside [`remove`] itself when nothing was executing.
//!
//! Mount teardown: the host announces a dying mount with [`free_mount`],
//! which fires the free callbacks while the mount is still valid. Handles
//! of hooks installed on that mount are invalid afterwards. Hooks still on
//! the chain when the mount object finally drops are reclaimed there, with
//! their removal callbacks fired.
//!
//! Locking
//! -------
//! Three lock levels, always taken top down:
//!
//! 1. the global registry lock (install, remove, teardown),
//! 2. one mount record's reader/writer lock (dispatch snapshots read, chain
//!    mutation writes),
//! 3. one entry's lifecycle lock (reference count and doomed flag).
//!
//! Reclamation takes the record write lock alone, never under the registry
//! lock, which is what allows a dispatch running under no lock at all to
//! drop the last reference safely. No framework lock is held while client
//! code (hooks, removal callbacks, mount/free callbacks) runs, except for
//! the callback bus gate documented in the callbacks module.
//!
//! The global state lives in one module-scoped record behind a lazy cell.
//! [`init`] forces it; call it once from host bring-up before any
//! concurrent use.
//!
//! Usage
//! -----
//! ```
//! use std::sync::Arc;
//! use fs_hooks::{HookSet, IoFlags, Mount, MountOps, OpStatus, Uio};
//!
//! struct NullOps;
//! impl MountOps for NullOps {
//!     fn read(&self, _m: &Mount, uio: &mut Uio, _f: IoFlags) -> OpStatus {
//!         uio.resid = 0;
//!         Ok(())
//!     }
//!     fn write(&self, _m: &Mount, _uio: &mut Uio, _f: IoFlags) -> OpStatus {
//!         Ok(())
//!     }
//! }
//!
//! fs_hooks::init();
//! let mnt = Mount::new("/demo", Box::new(NullOps));
//!
//! let mut set = HookSet::new(Arc::new(()));
//! set.pre_read = Some(Arc::new(|_arg, _slot, _mnt, uio, _flags| {
//!     // Shave one byte off every request before the filesystem sees it.
//!     uio.resid -= 1;
//! }));
//! let handle = fs_hooks::install(&mnt, set).unwrap();
//!
//! assert_eq!(mnt.read(&mut Uio::new(8, 0), 0), Ok(()));
//! fs_hooks::remove(handle).unwrap();
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use shared::errors::HookError;

mod callbacks;
mod dispatch;
mod entry;
mod hooks;
mod id_space;
mod mount;
mod record;

pub use callbacks::{callback_install, callback_remove, MountCallback, MountCbFn};
pub use hooks::{
    CallbackHandle, Errno, Handle, HookArg, HookSet, InstanceSlot, OpStatus, PostIoFn,
    PostMountFn, PostUnmountFn, PreIoFn, PreMountFn, PreUnmountFn, RemoveCb,
};
pub use mount::{IoFlags, Mount, MountArgs, MountId, MountOps, Uio};

use entry::HookEntry;
use id_space::IdSpace;

/// Process-wide framework state.
pub(crate) struct Framework {
    /// Every live hook entry, keyed by raw handle. An entry leaves the
    /// registry the moment it is doomed.
    pub(crate) registry: Mutex<HashMap<i64, Arc<HookEntry>>>,
    /// Shared handle source for hooks and callbacks.
    pub(crate) ids: IdSpace,
    pub(crate) bus: callbacks::CallbackBus,
}

static FRAMEWORK: Lazy<Framework> = Lazy::new(|| Framework {
    registry: Mutex::new(HashMap::new()),
    ids: IdSpace::new(i64::MAX),
    bus: callbacks::CallbackBus::new(),
});

pub(crate) fn framework() -> &'static Framework {
    &FRAMEWORK
}

/// Prepare the global state. Call once during host bring-up, before any
/// other framework call.
pub fn init() {
    Lazy::force(&FRAMEWORK);
}

/// Install a hook set on a mount.
///
/// The set is copied; the returned handle stays valid until [`remove`] or
/// until the mount's free callbacks have run. Hooks execute in LIFO
/// installation order, so the new hook becomes the outermost layer.
pub fn install(mnt: &Arc<Mount>, hooks: HookSet) -> Result<Handle, HookError> {
    let fw = framework();
    let rec = mnt.record();

    let handle = Handle(fw.ids.alloc().ok_or(HookError::LimitExceeded)?);
    let entry = HookEntry::new(handle, hooks, mnt);

    let mut map = fw.registry.lock().unwrap();
    {
        let mut st = rec.state.write().unwrap();
        st.chain.insert(0, Arc::clone(&entry));
    }
    map.insert(handle.raw(), entry);

    Ok(handle)
}

/// Remove a hook and invalidate its handle.
///
/// After this returns, no new operation on the owning mount goes through
/// the hook. Threads already past their snapshot may still be executing
/// it; the hook's removal callback fires once the last of them finishes,
/// which can happen inside this very call when none are in flight. Clients
/// must tolerate that reentrancy.
pub fn remove(handle: Handle) -> Result<(), HookError> {
    let fw = framework();
    let entry = {
        let mut map = fw.registry.lock().unwrap();
        let entry = map.remove(&handle.raw()).ok_or(HookError::NotFound)?;
        entry.doom();
        entry
    };
    // Drop the install-time reference. In-flight snapshots keep the entry
    // alive past this point; otherwise reclamation runs right here.
    HookEntry::release(&entry);
    Ok(())
}

/// Turn hook dispatch on for a mount. New mounts start enabled.
pub fn fs_enable(mnt: &Mount) {
    mnt.record().state.write().unwrap().enabled = true;
}

/// Bypass every hook on a mount until [`fs_enable`]. The chain itself is
/// untouched.
pub fn fs_disable(mnt: &Mount) {
    mnt.record().state.write().unwrap().enabled = false;
}

/// Announce that the host is about to reclaim a mount, firing every free
/// callback, and give up the caller's reference.
///
/// Clients must not pass handles owned by this mount to the API once their
/// free callback has returned. Any hook still installed when the mount
/// object drops is reclaimed there.
pub fn free_mount(mnt: Arc<Mount>) {
    callbacks::exec_free(&mnt);
    drop(mnt);
}
