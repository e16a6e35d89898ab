//! Mount/free callback bus: ordering, reentrant installs, teardown.
//!
//! The bus is process-global, so these tests serialize on one lock and tag
//! their mounts with a distinctive mountpoint prefix that the callbacks
//! filter on. Mounts created by other test binaries never collide because
//! every integration test file is its own process.

mod common;

use std::sync::{Arc, Mutex, MutexGuard};

use common::{push, taken, trace, TraceOps};
use fs_hooks::{Handle, Mount, MountArgs, MountCallback, Uio};

static BUS_LOCK: Mutex<()> = Mutex::new(());

fn serialize() -> MutexGuard<'static, ()> {
    BUS_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[test]
fn mount_callback_may_install_hooks_reentrantly() {
    let _serial = serialize();
    fs_hooks::init();

    let t = trace();
    let fired = Arc::new(Mutex::new(Vec::<Handle>::new()));

    let mut cb = MountCallback::new(Arc::new(()));
    let (ct, cf) = (Arc::clone(&t), Arc::clone(&fired));
    cb.on_mount = Some(Arc::new(move |mnt, _arg| {
        if !mnt.mountpoint().starts_with("/cbtest/reentry") {
            return;
        }
        push(&ct, format!("on_mount:{}", mnt.mountpoint()));
        let h = fs_hooks::install(mnt, common::logging_hooks("R", &ct))
            .expect("install inside a mount callback is supported");
        cf.lock().unwrap().push(h);
    }));
    let cb_handle = fs_hooks::callback_install(cb).unwrap();

    let mnt = Mount::mount(
        "/cbtest/reentry0",
        Box::new(TraceOps { trace: Arc::clone(&t) }),
        &mut MountArgs::default(),
    )
    .unwrap();

    // The callback fired once and its hook is live on the new mount.
    assert_eq!(
        taken(&t),
        vec!["mount".to_string(), "on_mount:/cbtest/reentry0".to_string()]
    );
    t.lock().unwrap().clear();
    assert_eq!(mnt.read(&mut Uio::new(3, 0), 0), Ok(()));
    assert_eq!(taken(&t), vec!["pre_read:R", "read:3", "post_read:R"]);

    for h in fired.lock().unwrap().drain(..) {
        fs_hooks::remove(h).unwrap();
    }
    fs_hooks::callback_remove(cb_handle).unwrap();
    fs_hooks::free_mount(mnt);
}

#[test]
fn callbacks_fire_in_insertion_order_on_mount_and_free() {
    let _serial = serialize();
    fs_hooks::init();

    let t = trace();

    let mut first = MountCallback::new(Arc::new(()));
    let ft = Arc::clone(&t);
    first.on_mount = Some(Arc::new(move |mnt, _arg| {
        if mnt.mountpoint().starts_with("/cbtest/order") {
            push(&ft, "mount:first");
        }
    }));
    let ft = Arc::clone(&t);
    first.on_free = Some(Arc::new(move |mnt, _arg| {
        if mnt.mountpoint().starts_with("/cbtest/order") {
            push(&ft, "free:first");
        }
    }));

    let mut second = MountCallback::new(Arc::new(()));
    let st = Arc::clone(&t);
    second.on_mount = Some(Arc::new(move |mnt, _arg| {
        if mnt.mountpoint().starts_with("/cbtest/order") {
            push(&st, "mount:second");
        }
    }));
    let st = Arc::clone(&t);
    second.on_free = Some(Arc::new(move |mnt, _arg| {
        if mnt.mountpoint().starts_with("/cbtest/order") {
            push(&st, "free:second");
        }
    }));

    let h1 = fs_hooks::callback_install(first).unwrap();
    let h2 = fs_hooks::callback_install(second).unwrap();

    let mnt = Mount::mount(
        "/cbtest/order0",
        Box::new(TraceOps { trace: trace() }),
        &mut MountArgs::default(),
    )
    .unwrap();
    fs_hooks::free_mount(mnt);

    assert_eq!(
        taken(&t),
        vec!["mount:first", "mount:second", "free:first", "free:second"]
    );

    fs_hooks::callback_remove(h1).unwrap();
    fs_hooks::callback_remove(h2).unwrap();
}

#[test]
fn removing_an_unknown_callback_fails_cleanly() {
    let _serial = serialize();
    fs_hooks::init();

    let cb_handle = fs_hooks::callback_install(MountCallback::new(Arc::new(()))).unwrap();
    fs_hooks::callback_remove(cb_handle).unwrap();
    assert!(fs_hooks::callback_remove(cb_handle).is_err());
}
