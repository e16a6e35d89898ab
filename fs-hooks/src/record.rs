//! Per-mount framework state and the late-init gate that attaches it.
//!
//! Design
//! -------
//! Some hosts create mount objects without ever going through a framework
//! initializer, so the per-mount record cannot be built eagerly. Instead
//! every framework entry point prepares the record on first touch through a
//! three-state pointer protocol on the mount's record cell:
//!
//! - null: not initialized yet
//! - the busy sentinel: initialization in progress on some thread
//! - anything else: the published record
//!
//! A caller CASes null to the sentinel. Exactly one thread wins that
//! exchange and constructs the record; everyone else spins (yielding) while
//! the sentinel is visible. Once published the pointer never changes again
//! until mount teardown, so callers may cache it for the duration of their
//! borrow of the mount.
//!
//! Memory ordering
//! ---------------
//! The record is published with a release store and read with acquire
//! loads, which makes the freshly constructed record fields visible to
//! every reader that observes the non-sentinel pointer.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use crate::entry::HookEntry;
use crate::framework;

/// Per-mount record: the hook chain and the enabled flag, both guarded by
/// one reader/writer lock.
pub(crate) struct FsRecord {
    pub(crate) state: RwLock<RecordState>,
}

pub(crate) struct RecordState {
    /// When false the dispatch engine bypasses every hook on this mount.
    pub(crate) enabled: bool,
    /// Installed hooks, most recent first.
    pub(crate) chain: Vec<Arc<HookEntry>>,
}

impl FsRecord {
    fn new() -> Self {
        Self {
            state: RwLock::new(RecordState { enabled: true, chain: Vec::new() }),
        }
    }
}

/// Distinguished non-null value marking an initialization in progress.
/// The all-ones address is never handed out by the allocator and is never
/// dereferenced here.
fn busy_sentinel() -> *mut FsRecord {
    usize::MAX as *mut FsRecord
}

/// Ensure the record behind `cell` exists and return it.
///
/// Exactly one thread ever observes the null-to-sentinel transition, so
/// exactly one record is constructed no matter how many threads race the
/// first touch.
pub(crate) fn prepare(cell: &AtomicPtr<FsRecord>) -> *const FsRecord {
    let cur = cell.load(Ordering::Acquire);
    if !cur.is_null() && cur != busy_sentinel() {
        return cur;
    }

    loop {
        match cell.compare_exchange(
            ptr::null_mut(),
            busy_sentinel(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let rec = Box::into_raw(Box::new(FsRecord::new()));
                cell.store(rec, Ordering::Release);
                return rec;
            }
            Err(observed) => {
                if observed == busy_sentinel() {
                    thread::yield_now();
                    continue;
                }
                return observed;
            }
        }
    }
}

/// Tear the record down, reclaiming every hook still on the chain.
///
/// Called when the mount itself is destroyed. Entries found here were
/// neither removed through the API nor doomed; their removal callbacks fire
/// now and their handles are returned to the ID space. A doomed entry on
/// the chain at this point means some thread is still executing it, which
/// the host contract forbids; its in-flight release owns reclamation, so it
/// is only unlinked and reported.
pub(crate) fn destroy(cell: &AtomicPtr<FsRecord>) {
    let p = cell.swap(ptr::null_mut(), Ordering::AcqRel);
    if p.is_null() {
        return;
    }
    debug_assert!(p != busy_sentinel());

    // Safety: `p` came out of `prepare`'s publication and nothing else can
    // reach the cell once the mount is being destroyed.
    let rec = unsafe { Box::from_raw(p) };
    let fw = framework();

    loop {
        // Registry lock first, then the record lock, matching the
        // administrative paths so the registry and the chain stay
        // consistent.
        let entry = {
            let mut map = fw.registry.lock().unwrap();
            let mut st = rec.state.write().unwrap();
            match st.chain.pop() {
                Some(e) => {
                    if !e.is_doomed() {
                        map.remove(&e.handle().raw());
                    }
                    Some(e)
                }
                None => None,
            }
        };
        let Some(entry) = entry else { break };

        if entry.is_doomed() {
            log::error!(
                "hook {} still executing at mount teardown; host broke the keep-alive contract",
                entry.handle().raw()
            );
            continue;
        }

        if let Some(cb) = &entry.hooks().remove_cb {
            cb(entry.arg(), entry.handle());
        }
        fw.ids.free(entry.handle().raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_enabled_and_empty() {
        let cell = AtomicPtr::new(ptr::null_mut());
        let rec = prepare(&cell);
        let st = unsafe { &*rec }.state.read().unwrap();
        assert!(st.enabled);
        assert!(st.chain.is_empty());
        drop(st);
        destroy(&cell);
    }

    #[test]
    fn prepare_is_idempotent() {
        let cell = AtomicPtr::new(ptr::null_mut());
        let a = prepare(&cell);
        let b = prepare(&cell);
        assert_eq!(a, b);
        destroy(&cell);
    }

    #[test]
    fn destroy_of_untouched_cell_is_a_noop() {
        let cell = AtomicPtr::new(ptr::null_mut());
        destroy(&cell);
        assert!(cell.load(Ordering::Acquire).is_null());
    }

    #[test]
    fn concurrent_first_touch_publishes_one_record() {
        let cell = AtomicPtr::new(ptr::null_mut());
        // Addresses cross the thread boundary as plain integers.
        let seen: Vec<usize> = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = (0..10).map(|_| s.spawn(|_| prepare(&cell) as usize)).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
        .unwrap();

        let first = seen[0];
        assert_ne!(first, 0);
        assert_ne!(first, busy_sentinel() as usize);
        for p in seen {
            assert_eq!(p, first);
        }
        destroy(&cell);
    }
}
