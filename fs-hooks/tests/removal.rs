//! Removal lifecycle: dooming, deferred reclamation, and the exactly-once
//! removal callback.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use common::{logging_hooks, push, taken, trace, TraceOps};
use fs_hooks::{Handle, HookSet, Mount, Uio};

#[test]
fn self_removing_hook_still_pairs_and_reclaims_once() {
    fs_hooks::init();
    let t = trace();
    let mnt = Mount::new("/t/selfrm", Box::new(TraceOps { trace: Arc::clone(&t) }));

    let own_handle: Arc<OnceLock<Handle>> = Arc::new(OnceLock::new());

    let mut set = HookSet::new(Arc::new(()));
    let (pt, ph) = (Arc::clone(&t), Arc::clone(&own_handle));
    set.pre_read = Some(Arc::new(move |_arg, _slot, _mnt, _uio, _flags| {
        push(&pt, "pre:C");
        let h = *ph.get().expect("handle published before first read");
        assert_eq!(fs_hooks::remove(h), Ok(()));
    }));
    let qt = Arc::clone(&t);
    set.post_read = Some(Arc::new(move |ret, _arg, _slot, _mnt, _uio, _flags| {
        push(&qt, "post:C");
        ret
    }));
    let rt = Arc::clone(&t);
    set.remove_cb = Some(Arc::new(move |_arg, _handle| {
        push(&rt, "remove_cb:C");
    }));

    let h = fs_hooks::install(&mnt, set).unwrap();
    own_handle.set(h).unwrap();

    assert_eq!(mnt.read(&mut Uio::new(12, 0), 0), Ok(()));
    // The hook removed itself in pre, yet its post still ran, and the
    // removal callback fired only after the call finished.
    assert_eq!(taken(&t), vec!["pre:C", "read:12", "post:C", "remove_cb:C"]);

    t.lock().unwrap().clear();
    assert_eq!(mnt.read(&mut Uio::new(12, 0), 0), Ok(()));
    assert_eq!(taken(&t), vec!["read:12"]);
}

#[test]
fn removal_during_dispatch_defers_reclamation() {
    fs_hooks::init();
    let t = trace();
    let mnt = Mount::new("/t/racerm", Box::new(TraceOps { trace: Arc::clone(&t) }));

    let removed = Arc::new(AtomicUsize::new(0));

    // Hook under test, installed first so it sits deeper in the chain.
    let mut target = logging_hooks("D", &t);
    let counter = Arc::clone(&removed);
    target.remove_cb = Some(Arc::new(move |_arg, _handle| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let d = fs_hooks::install(&mnt, target).unwrap();

    // Gate hook, installed second so it runs before D's pre and can hold
    // the dispatch between its snapshot and D's execution.
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (resume_tx, resume_rx) = mpsc::channel::<()>();
    let resume_rx = Mutex::new(resume_rx);
    let mut gate = HookSet::new(Arc::new(()));
    gate.pre_read = Some(Arc::new(move |_arg, _slot, _mnt, _uio, _flags| {
        entered_tx.send(()).unwrap();
        resume_rx.lock().unwrap().recv().unwrap();
    }));
    let g = fs_hooks::install(&mnt, gate).unwrap();

    let reader = {
        let mnt = Arc::clone(&mnt);
        thread::spawn(move || mnt.read(&mut Uio::new(20, 0), 0))
    };

    // The dispatch is past its snapshot and parked in the gate's pre.
    entered_rx.recv().unwrap();
    assert_eq!(fs_hooks::remove(d), Ok(()));
    assert_eq!(removed.load(Ordering::SeqCst), 0, "reclamation must wait for the dispatch");

    resume_tx.send(()).unwrap();
    assert_eq!(reader.join().unwrap(), Ok(()));

    // The doomed hook ran to completion and was reclaimed exactly once.
    let lines = taken(&t);
    assert!(lines.contains(&"pre_read:D".to_string()));
    assert!(lines.contains(&"post_read:D".to_string()));
    assert_eq!(removed.load(Ordering::SeqCst), 1);

    t.lock().unwrap().clear();
    fs_hooks::remove(g).unwrap();
    assert_eq!(mnt.read(&mut Uio::new(20, 0), 0), Ok(()));
    assert_eq!(taken(&t), vec!["read:20"]);
}

#[test]
fn removed_hook_is_invisible_to_later_snapshots() {
    fs_hooks::init();
    let t = trace();
    let mnt = Mount::new("/t/gone", Box::new(TraceOps { trace: Arc::clone(&t) }));

    let h = fs_hooks::install(&mnt, logging_hooks("E", &t)).unwrap();
    fs_hooks::remove(h).unwrap();
    // Nothing was executing, so reclamation fired inside remove.
    assert_eq!(taken(&t), vec!["remove_cb:E"]);

    t.lock().unwrap().clear();
    assert_eq!(mnt.read(&mut Uio::new(6, 0), 0), Ok(()));
    assert_eq!(taken(&t), vec!["read:6"]);
}

#[test]
fn unknown_handles_are_rejected_without_side_effects() {
    fs_hooks::init();
    let t = trace();
    let mnt = Mount::new("/t/unknown", Box::new(TraceOps { trace: Arc::clone(&t) }));

    assert!(fs_hooks::remove(Handle::INVALID).is_err());

    let h = fs_hooks::install(&mnt, logging_hooks("F", &t)).unwrap();
    assert_eq!(fs_hooks::remove(h), Ok(()));
    assert!(fs_hooks::remove(h).is_err(), "a handle dies with its hook");

    t.lock().unwrap().clear();
    assert_eq!(mnt.read(&mut Uio::new(1, 0), 0), Ok(()));
    assert_eq!(taken(&t), vec!["read:1"]);
}

#[test]
fn install_remove_roundtrip_restores_the_mount() {
    fs_hooks::init();
    let t = trace();
    let mnt = Mount::new("/t/roundtrip", Box::new(TraceOps { trace: Arc::clone(&t) }));

    assert_eq!(mnt.read(&mut Uio::new(2, 0), 0), Ok(()));
    let before = taken(&t);
    t.lock().unwrap().clear();

    let h = fs_hooks::install(&mnt, logging_hooks("G", &t)).unwrap();
    fs_hooks::remove(h).unwrap();
    t.lock().unwrap().clear();

    assert_eq!(mnt.read(&mut Uio::new(2, 0), 0), Ok(()));
    assert_eq!(taken(&t), before);
}

#[test]
fn mount_teardown_reclaims_leftover_hooks() {
    fs_hooks::init();
    let t = trace();
    let mnt = Mount::new("/t/teardown", Box::new(TraceOps { trace: Arc::clone(&t) }));

    let removed = Arc::new(AtomicUsize::new(0));
    let mut set = HookSet::new(Arc::new(()));
    let counter = Arc::clone(&removed);
    set.remove_cb = Some(Arc::new(move |_arg, _handle| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    set.pre_read = Some(Arc::new(|_arg, _slot, _mnt, _uio, _flags| {}));
    let h = fs_hooks::install(&mnt, set).unwrap();

    // Never removed through the API; the mount takes it down.
    fs_hooks::free_mount(mnt);
    assert_eq!(removed.load(Ordering::SeqCst), 1);

    // The handle died with the mount.
    assert!(fs_hooks::remove(h).is_err());
}
