//! Filesystem disturber: the demonstration client of the hook framework.
//!
//! The disturber injects pathological but protocol-legal behavior into
//! filesystem reads. It is NOT a fuzzer: a read returning fewer bytes than
//! requested is documented behavior every caller has to handle, and the
//! disturber merely makes it happen often enough to shake bugs out.
//!
//! Shape of the client:
//!
//! - at most one hook per mount, carrying a [`DisturbParams`] record shared
//!   by its pre and post functions; updating parameters touches only that
//!   record, never the framework;
//! - an optional *omnipresent* policy, installed on every mount announced
//!   by the framework's mount callback;
//! - a free callback used purely to drop bookkeeping for a dying mount
//!   before its handles go invalid;
//! - a roster of installed hooks, drained on detach: every hook is removed
//!   and a condition variable signaled by the removal callback is awaited
//!   until the last reclamation has fired.
//!
//! Locking: the roster mutex guards the enabled flag, the omnipresent
//! policy, the entry list, and the installed count. It is never held across
//! a framework call that can fire the removal callback, which lets the
//! callback take the mutex itself regardless of which thread runs it. An
//! entry's doomed flag is flipped under the roster mutex before its hook is
//! removed, so each hook is removed exactly once even when the control
//! plane, the free callback, and detach race.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, RwLock};

use fs_hooks::{CallbackHandle, Handle, HookSet, Mount, MountCallback, MountId};
use shared::errors::ControlError;
use shared::params::DisturbParams;

mod control;
mod hooks;
mod rand;

pub use control::{Request, Response};

use hooks::HookCtx;
use rand::DisturbRng;

/// One disturbed mount. The mount itself is referenced only by its stable
/// identity; by the time the entry is destroyed the mount may already be
/// gone.
pub(crate) struct DisturbEntry {
    pub(crate) mount_id: MountId,
    pub(crate) mountpoint: String,
    /// Parameters shared with the hook functions.
    pub(crate) params: RwLock<DisturbParams>,
    /// Set once right after the hook is installed.
    pub(crate) handle: OnceLock<Handle>,
    /// True once removal of the hook has been committed. Written only
    /// under the roster mutex.
    pub(crate) doomed: AtomicBool,
}

struct Roster {
    enabled: bool,
    /// Set for good when detach starts; the removal callback then leaves
    /// the entry list alone because detach already drained it.
    detaching: bool,
    omni: Option<DisturbParams>,
    entries: Vec<Arc<DisturbEntry>>,
    /// Hooks installed and not yet reclaimed. Trails `entries` while
    /// removals are in flight.
    installed: usize,
}

pub(crate) struct DisturberState {
    roster: Mutex<Roster>,
    empty_cv: Condvar,
    pub(crate) rng: DisturbRng,
}

impl DisturberState {
    /// Mount callback: apply the omnipresent policy to a new mount.
    fn on_mount(state: &Arc<Self>, mnt: &Arc<Mount>) {
        let mut roster = state.roster.lock().unwrap();
        if let Some(params) = roster.omni {
            if let Err(e) = install_locked(state, &mut roster, mnt, params) {
                log::warn!("installing disturbance for {} failed: {e}", mnt.mountpoint());
            }
        }
    }

    /// Free callback: the mount is going away, drop our bookkeeping. The
    /// hook itself is removed here while the handle is still valid.
    fn on_free(state: &Arc<Self>, mnt: &Arc<Mount>) {
        let target = {
            let roster = state.roster.lock().unwrap();
            match find_live(&roster, mnt.id()) {
                Some(entry) => {
                    entry.doomed.store(true, Ordering::Release);
                    Some(entry)
                }
                None => None,
            }
        };
        // Another thread may have removed the disturbance concurrently;
        // nothing to do then.
        if let Some(entry) = target {
            remove_hook(&entry);
        }
    }

    /// Roster cleanup at hook reclamation; signals detach when the last
    /// installed hook is gone.
    pub(crate) fn forget_entry(&self, entry: &Arc<DisturbEntry>) {
        let mut roster = self.roster.lock().unwrap();
        if !roster.detaching {
            if let Some(pos) = roster.entries.iter().position(|e| Arc::ptr_eq(e, entry)) {
                roster.entries.remove(pos);
            }
        }
        debug_assert!(roster.installed > 0);
        roster.installed -= 1;
        if roster.installed == 0 {
            self.empty_cv.notify_all();
        }
    }
}

fn find_live(roster: &Roster, id: MountId) -> Option<Arc<DisturbEntry>> {
    roster
        .entries
        .iter()
        .find(|e| e.mount_id == id && !e.doomed.load(Ordering::Acquire))
        .cloned()
}

/// Install a hook with the given parameters, or update the parameters of an
/// already disturbed mount in place. Caller holds the roster mutex.
fn install_locked(
    state: &Arc<DisturberState>,
    roster: &mut Roster,
    mnt: &Arc<Mount>,
    params: DisturbParams,
) -> Result<(), ControlError> {
    if let Some(existing) = find_live(roster, mnt.id()) {
        *existing.params.write().unwrap() = params;
        return Ok(());
    }

    let entry = Arc::new(DisturbEntry {
        mount_id: mnt.id(),
        mountpoint: mnt.mountpoint().to_string(),
        params: RwLock::new(params),
        handle: OnceLock::new(),
        doomed: AtomicBool::new(false),
    });

    let ctx = Arc::new(HookCtx { state: Arc::clone(state), entry: Arc::clone(&entry) });
    let mut set = HookSet::new(ctx);
    set.pre_read = Some(Arc::new(hooks::pre_read));
    set.post_read = Some(Arc::new(hooks::post_read));
    set.remove_cb = Some(Arc::new(hooks::remove_cb));

    // Holding the roster mutex across install is fine: installation fires
    // no client callbacks.
    let handle = fs_hooks::install(mnt, set).map_err(|_| ControlError::TooManyHooks)?;
    entry
        .handle
        .set(handle)
        .expect("handle published once per entry");

    roster.entries.push(entry);
    roster.installed += 1;
    Ok(())
}

/// Remove the framework hook behind an entry. The entry must already be
/// marked doomed; the roster mutex must NOT be held, because the removal
/// callback may fire inside this call and takes it.
fn remove_hook(entry: &Arc<DisturbEntry>) {
    let Some(handle) = entry.handle.get() else {
        // Unreachable for entries that made it into the roster.
        log::error!("disturbed mount {} has no hook handle", entry.mountpoint);
        return;
    };
    if let Err(e) = fs_hooks::remove(*handle) {
        // The doomed flag guarantees a single remover, so the handle must
        // still be live here.
        log::error!("removing hook for {} failed: {e}", entry.mountpoint);
    }
}

/// The disturber instance: a registered mount/free callback plus the
/// roster of disturbed mounts. Created by [`Disturber::attach`], torn down
/// by [`Disturber::detach`].
pub struct Disturber {
    state: Arc<DisturberState>,
    cb_handle: CallbackHandle,
}

impl Disturber {
    /// Register with the framework. The disturber starts disabled; every
    /// command except `ENABLE` is refused until enabled.
    pub fn attach() -> Result<Disturber, ControlError> {
        fs_hooks::init();

        let state = Arc::new(DisturberState {
            roster: Mutex::new(Roster {
                enabled: false,
                detaching: false,
                omni: None,
                entries: Vec::new(),
                installed: 0,
            }),
            empty_cv: Condvar::new(),
            rng: DisturbRng::new(),
        });

        let mut cb = MountCallback::new(Arc::new(Arc::clone(&state)));
        cb.on_mount = Some(Arc::new(|mnt, arg| {
            if let Some(state) = arg.downcast_ref::<Arc<DisturberState>>() {
                DisturberState::on_mount(state, mnt);
            }
        }));
        cb.on_free = Some(Arc::new(|mnt, arg| {
            if let Some(state) = arg.downcast_ref::<Arc<DisturberState>>() {
                DisturberState::on_free(state, mnt);
            }
        }));

        let cb_handle =
            fs_hooks::callback_install(cb).map_err(|_| ControlError::TooManyHooks)?;
        Ok(Disturber { state, cb_handle })
    }

    /// Tear the disturber down: refuse while enabled, otherwise remove
    /// every hook, wait until the last reclamation has fired, and drop the
    /// mount/free callback. Hooks are removed before the callback so a
    /// concurrent mount teardown still finds the free callback in place.
    pub fn detach(self) -> Result<(), (Disturber, ControlError)> {
        let state = Arc::clone(&self.state);

        let targets: Vec<Arc<DisturbEntry>> = {
            let mut roster = state.roster.lock().unwrap();
            if roster.enabled {
                drop(roster);
                return Err((self, ControlError::Active));
            }
            roster.detaching = true;
            let targets = roster
                .entries
                .drain(..)
                .filter(|e| !e.doomed.load(Ordering::Acquire))
                .collect::<Vec<_>>();
            for entry in &targets {
                entry.doomed.store(true, Ordering::Release);
            }
            targets
        };

        for entry in &targets {
            remove_hook(entry);
        }

        let mut roster = state.roster.lock().unwrap();
        while roster.installed > 0 {
            roster = state.empty_cv.wait(roster).unwrap();
        }
        roster.omni = None;
        drop(roster);

        if let Err(e) = fs_hooks::callback_remove(self.cb_handle) {
            log::error!("removing disturber callback failed: {e}");
        }
        Ok(())
    }

    pub(crate) fn state(&self) -> &Arc<DisturberState> {
        &self.state
    }
}
