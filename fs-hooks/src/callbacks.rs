//! Mount/free callback bus.
//!
//! Clients register callbacks globally, not per mount. Mount callbacks fire
//! after the host's native mount path returned successfully; free callbacks
//! fire right before the host reclaims a mount. Both fire in insertion
//! order.
//!
//! The execution gate is held across the whole callback pass, and the
//! owning thread is recorded so a callback reaching back into the bus on
//! the same thread does not try to re-acquire it. That makes hook install
//! and remove legal from inside a callback. Installing or removing a
//! *callback* from inside a callback deadlocks on the gate by design; the
//! contract forbids it.

use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use shared::errors::HookError;

use crate::framework;
use crate::hooks::{CallbackHandle, HookArg};
use crate::mount::Mount;

/// Callback function: receives the mount being announced and the client's
/// registered argument.
pub type MountCbFn = Arc<dyn Fn(&Arc<Mount>, &HookArg) + Send + Sync>;

/// One mount/free callback registration, as filled out by the client.
pub struct MountCallback {
    /// Opaque argument handed to both functions.
    pub arg: HookArg,
    /// Fired for every new mount, after the native mount path returned.
    pub on_mount: Option<MountCbFn>,
    /// Fired for every mount right before the host reclaims it. Handles of
    /// hooks installed on that mount are invalid once this returns.
    pub on_free: Option<MountCbFn>,
}

impl MountCallback {
    pub fn new(arg: HookArg) -> Self {
        Self { arg, on_mount: None, on_free: None }
    }
}

struct CallbackEntry {
    handle: CallbackHandle,
    cb: MountCallback,
}

pub(crate) struct CallbackBus {
    /// Held across every callback pass and by install/remove.
    gate: Mutex<()>,
    /// Thread currently holding the gate, if any.
    owner: Mutex<Option<ThreadId>>,
    /// Registered callbacks, oldest first.
    list: RwLock<Vec<Arc<CallbackEntry>>>,
}

impl CallbackBus {
    pub(crate) fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            owner: Mutex::new(None),
            list: RwLock::new(Vec::new()),
        }
    }
}

/// Register a mount/free callback. Must not be called from inside a
/// callback; doing so deadlocks.
pub fn callback_install(cb: MountCallback) -> Result<CallbackHandle, HookError> {
    let fw = framework();
    let handle = CallbackHandle(fw.ids.alloc().ok_or(HookError::LimitExceeded)?);
    let _gate = fw.bus.gate.lock().unwrap();
    fw.bus
        .list
        .write()
        .unwrap()
        .push(Arc::new(CallbackEntry { handle, cb }));
    Ok(handle)
}

/// Unregister a mount/free callback. Must not be called from inside a
/// callback; doing so deadlocks.
pub fn callback_remove(handle: CallbackHandle) -> Result<(), HookError> {
    let fw = framework();
    {
        let _gate = fw.bus.gate.lock().unwrap();
        let mut list = fw.bus.list.write().unwrap();
        let pos = list
            .iter()
            .position(|e| e.handle == handle)
            .ok_or(HookError::NotFound)?;
        list.remove(pos);
    }
    fw.ids.free(handle.raw());
    Ok(())
}

enum Pass {
    Mount,
    Free,
}

fn exec(mnt: &Arc<Mount>, pass: Pass) {
    let fw = framework();
    let me = thread::current().id();
    let reentrant = *fw.bus.owner.lock().unwrap() == Some(me);

    let gate = if reentrant {
        None
    } else {
        let g = fw.bus.gate.lock().unwrap();
        *fw.bus.owner.lock().unwrap() = Some(me);
        Some(g)
    };

    let snapshot: Vec<Arc<CallbackEntry>> = fw.bus.list.read().unwrap().to_vec();
    for entry in snapshot {
        let f = match pass {
            Pass::Mount => entry.cb.on_mount.as_ref(),
            Pass::Free => entry.cb.on_free.as_ref(),
        };
        if let Some(f) = f {
            f(mnt, &entry.cb.arg);
        }
    }

    if gate.is_some() {
        *fw.bus.owner.lock().unwrap() = None;
    }
}

/// Announce a freshly mounted filesystem to every registered callback.
pub(crate) fn exec_mount(mnt: &Arc<Mount>) {
    exec(mnt, Pass::Mount);
}

/// Announce that a mount is about to be reclaimed.
pub(crate) fn exec_free(mnt: &Arc<Mount>) {
    exec(mnt, Pass::Free);
}
