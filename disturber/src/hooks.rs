//! The read hooks the disturber installs.
//!
//! One hook set per disturbed mount. The shared argument is a [`HookCtx`]
//! tying the framework-side hook to the roster entry that carries the
//! parameters and to the disturber state that owns the bookkeeping. The
//! roster entry outlives the hook: it is only destroyed after the removal
//! callback has run.

use std::sync::Arc;

use fs_hooks::{Handle, HookArg, InstanceSlot, IoFlags, Mount, OpStatus, Uio};

use crate::{DisturbEntry, DisturberState};

/// Shared argument of one installed hook set.
pub(crate) struct HookCtx {
    pub(crate) state: Arc<DisturberState>,
    pub(crate) entry: Arc<DisturbEntry>,
}

/// Decide whether to shorten this read and by how much.
///
/// The first draw is a throwaway that keeps the number of generator calls
/// per invocation odd; without it a narrow range degenerates to a constant
/// because the generator's parity alternates call by call.
pub(crate) fn pre_read(
    arg: &HookArg,
    slot: &mut InstanceSlot,
    mnt: &Mount,
    uio: &mut Uio,
    _flags: &mut IoFlags,
) {
    let Some(ctx) = arg.downcast_ref::<HookCtx>() else {
        return;
    };
    let _ = ctx.state.rng.next();

    debug_assert_eq!(mnt.id(), ctx.entry.mount_id);
    let params = *ctx.entry.params.read().unwrap();

    *slot = None;
    if (ctx.state.rng.next() as u64) % 100 < params.chance_percent {
        let [lo, hi] = params.range;
        let width = hi.wrapping_sub(lo).wrapping_add(1);
        let draw = ctx.state.rng.next() as u64;
        let less = if width == 0 { draw } else { draw % width + lo };

        // Requests smaller than the cut pass through untouched.
        if uio.resid > less {
            uio.resid -= less;
            *slot = Some(Box::new(less));
        }
    }
}

/// Undo the accounting: the bytes withheld from the wrapped operation show
/// up as an ordinary short read to the caller.
pub(crate) fn post_read(
    ret: OpStatus,
    _arg: &HookArg,
    slot: InstanceSlot,
    _mnt: &Mount,
    uio: &mut Uio,
    _flags: IoFlags,
) -> OpStatus {
    if let Some(boxed) = slot {
        if let Ok(less) = boxed.downcast::<u64>() {
            uio.resid += *less;
        }
    }
    ret
}

/// Reclamation of one disturbed mount's hook. Runs with no framework lock
/// held, possibly still inside the `remove` call that doomed the hook.
pub(crate) fn remove_cb(arg: &HookArg, _handle: Handle) {
    let Some(ctx) = arg.downcast_ref::<HookCtx>() else {
        return;
    };
    ctx.state.forget_entry(&ctx.entry);
}
