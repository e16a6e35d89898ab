//! Reference-counted record of one installed hook.
//!
//! The doomed flag is the single commit point of removal: once set, no new
//! reference can be taken, while holders that acquired the entry earlier
//! finish undisturbed. The reference count can reach zero only after the
//! entry was doomed, and the zero transition performs reclamation exactly
//! once: unlink from the owning mount's chain, fire the client's removal
//! callback, return the handle to the ID space. Reclamation runs with no
//! framework lock held, because it takes the mount's write lock itself and
//! may be triggered from a path that still sees other locks above it.

use std::sync::{Arc, Mutex, Weak};

use crate::framework;
use crate::hooks::{Handle, HookArg, HookSet};
use crate::mount::Mount;

pub(crate) struct HookEntry {
    handle: Handle,
    hooks: HookSet,
    /// Non-owning link back to the mount, used only to find the chain
    /// during reclamation. The chain owns the entry, not the other way
    /// around.
    mount: Weak<Mount>,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    refs: u64,
    doomed: bool,
}

impl HookEntry {
    /// Fresh entry carrying the install-time reference.
    pub(crate) fn new(handle: Handle, hooks: HookSet, mount: &Arc<Mount>) -> Arc<Self> {
        Arc::new(Self {
            handle,
            hooks,
            mount: Arc::downgrade(mount),
            lifecycle: Mutex::new(Lifecycle { refs: 1, doomed: false }),
        })
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    pub(crate) fn arg(&self) -> &HookArg {
        &self.hooks.arg
    }

    /// Take a reference for the duration of one dispatch. Fails once the
    /// entry is doomed.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut lc = self.lifecycle.lock().unwrap();
        if lc.doomed {
            return false;
        }
        lc.refs += 1;
        true
    }

    /// Commit removal. Must run under the global registry lock, after the
    /// entry left the registry, so the transition happens exactly once.
    pub(crate) fn doom(&self) {
        let mut lc = self.lifecycle.lock().unwrap();
        debug_assert!(!lc.doomed);
        lc.doomed = true;
    }

    pub(crate) fn is_doomed(&self) -> bool {
        self.lifecycle.lock().unwrap().doomed
    }

    /// Drop one reference; the zero transition reclaims the entry.
    pub(crate) fn release(this: &Arc<HookEntry>) {
        let reclaim = {
            let mut lc = this.lifecycle.lock().unwrap();
            debug_assert!(lc.refs > 0);
            lc.refs -= 1;
            if lc.refs == 0 {
                debug_assert!(lc.doomed);
                true
            } else {
                false
            }
        };
        if reclaim {
            HookEntry::reclaim(this);
        }
    }

    /// One-time teardown at refcount zero. Runs lock-free with respect to
    /// the registry; only the owning mount's write lock is taken, and it is
    /// dropped again before the removal callback fires.
    fn reclaim(this: &Arc<HookEntry>) {
        match this.mount.upgrade() {
            Some(mnt) => {
                let rec = mnt.record();
                let mut st = rec.state.write().unwrap();
                if let Some(pos) = st.chain.iter().position(|e| Arc::ptr_eq(e, this)) {
                    st.chain.remove(pos);
                }
            }
            None => {
                // The chain died with the mount; nothing left to unlink.
                log::error!(
                    "hook {} reclaimed after its mount was freed; host broke the keep-alive contract",
                    this.handle.raw()
                );
            }
        }

        if let Some(cb) = &this.hooks.remove_cb {
            cb(&this.hooks.arg, this.handle);
        }
        framework().ids.free(this.handle.raw());
    }
}
