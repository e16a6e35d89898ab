//! Dispatch engine: runs the hook chain around one wrapped operation.
//!
//! For every intercepted operation the engine prepares the mount's record,
//! bails out to the wrapped operation directly when hooks are disabled, and
//! otherwise snapshots the chain under the read lock, acquiring a reference
//! to every entry that carries a pre or post function for this operation.
//! The read lock is dropped before any hook runs; no framework lock is ever
//! held across client code.
//!
//! Pre functions run head to tail, so the most recently installed hook runs
//! first. Post functions run tail to head, threading the result through, so
//! the most recently installed hook sees the result last and its return
//! value is what the caller observes. A hook that ran in pre always runs in
//! post within the same call, on the same thread, with the same instance
//! slot. Hooks installed or removed during a call never join or leave that
//! call's snapshot; a removed entry finishes the call and is reclaimed when
//! the snapshot drops its reference.

use std::sync::Arc;

use crate::entry::HookEntry;
use crate::hooks::{HookSet, InstanceSlot, OpStatus, PostIoFn, PreIoFn};
use crate::mount::{IoFlags, Mount, MountArgs, Uio};

/// One snapshot slot: an acquired entry and the instance cell its pre/post
/// pair shares.
struct Snapshot {
    entry: Arc<HookEntry>,
    slot: InstanceSlot,
}

/// Build the execution snapshot for one operation, or `None` when hooks are
/// disabled on this mount. `wants` decides whether an entry participates.
fn snapshot_chain(mnt: &Mount, wants: impl Fn(&HookSet) -> bool) -> Option<Vec<Snapshot>> {
    let rec = mnt.record();
    let st = rec.state.read().unwrap();
    if !st.enabled {
        return None;
    }
    let mut snap = Vec::new();
    for entry in &st.chain {
        if wants(entry.hooks()) && entry.try_acquire() {
            snap.push(Snapshot { entry: Arc::clone(entry), slot: None });
        }
    }
    Some(snap)
}

fn pre_read_of(h: &HookSet) -> Option<&PreIoFn> {
    h.pre_read.as_ref()
}

fn post_read_of(h: &HookSet) -> Option<&PostIoFn> {
    h.post_read.as_ref()
}

fn pre_write_of(h: &HookSet) -> Option<&PreIoFn> {
    h.pre_write.as_ref()
}

fn post_write_of(h: &HookSet) -> Option<&PostIoFn> {
    h.post_write.as_ref()
}

/// Shared engine for the two transfer operations; read and write differ
/// only in which slots of the hook set apply and which native operation
/// runs underneath.
fn dispatch_io(
    mnt: &Mount,
    uio: &mut Uio,
    mut flags: IoFlags,
    pre_of: fn(&HookSet) -> Option<&PreIoFn>,
    post_of: fn(&HookSet) -> Option<&PostIoFn>,
    under: impl Fn(&Mount, &mut Uio, IoFlags) -> OpStatus,
) -> OpStatus {
    let Some(mut snap) = snapshot_chain(mnt, |h| pre_of(h).is_some() || post_of(h).is_some())
    else {
        return under(mnt, uio, flags);
    };

    for s in snap.iter_mut() {
        if let Some(pre) = pre_of(s.entry.hooks()) {
            pre(s.entry.arg(), &mut s.slot, mnt, uio, &mut flags);
        }
    }

    let mut ret = under(mnt, uio, flags);

    while let Some(s) = snap.pop() {
        if let Some(post) = post_of(s.entry.hooks()) {
            ret = post(ret, s.entry.arg(), s.slot, mnt, uio, flags);
        }
        HookEntry::release(&s.entry);
    }

    ret
}

pub(crate) fn read(mnt: &Mount, uio: &mut Uio, flags: IoFlags) -> OpStatus {
    dispatch_io(mnt, uio, flags, pre_read_of, post_read_of, |m, u, f| {
        m.ops().read(m, u, f)
    })
}

pub(crate) fn write(mnt: &Mount, uio: &mut Uio, flags: IoFlags) -> OpStatus {
    dispatch_io(mnt, uio, flags, pre_write_of, post_write_of, |m, u, f| {
        m.ops().write(m, u, f)
    })
}

pub(crate) fn mount_on(mnt: &Mount, args: &mut MountArgs) -> OpStatus {
    let Some(mut snap) =
        snapshot_chain(mnt, |h| h.pre_mount.is_some() || h.post_mount.is_some())
    else {
        return mnt.ops().mount(mnt, args);
    };

    for s in snap.iter_mut() {
        if let Some(pre) = &s.entry.hooks().pre_mount {
            pre(s.entry.arg(), &mut s.slot, mnt, args);
        }
    }

    let mut ret = mnt.ops().mount(mnt, args);

    while let Some(s) = snap.pop() {
        if let Some(post) = &s.entry.hooks().post_mount {
            ret = post(ret, s.entry.arg(), s.slot, mnt, args);
        }
        HookEntry::release(&s.entry);
    }

    ret
}

pub(crate) fn unmount(mnt: &Mount, mut flags: u32) -> OpStatus {
    let Some(mut snap) =
        snapshot_chain(mnt, |h| h.pre_unmount.is_some() || h.post_unmount.is_some())
    else {
        return mnt.ops().unmount(mnt, flags);
    };

    for s in snap.iter_mut() {
        if let Some(pre) = &s.entry.hooks().pre_unmount {
            pre(s.entry.arg(), &mut s.slot, mnt, &mut flags);
        }
    }

    let mut ret = mnt.ops().unmount(mnt, flags);

    while let Some(s) = snap.pop() {
        if let Some(post) = &s.entry.hooks().post_unmount {
            ret = post(ret, s.entry.arg(), s.slot, mnt, flags);
        }
        HookEntry::release(&s.entry);
    }

    ret
}
