//! Helpers shared by the integration tests: an op implementation that
//! records every wrapped call, and a hook set that records every pre/post
//! invocation, both into one trace vector.

// Each test binary compiles its own copy and uses a different subset.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use fs_hooks::{HookSet, IoFlags, Mount, MountArgs, MountOps, OpStatus, Uio};

pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn push(trace: &Trace, line: impl Into<String>) {
    trace.lock().unwrap().push(line.into());
}

pub fn taken(trace: &Trace) -> Vec<String> {
    trace.lock().unwrap().clone()
}

/// Underlying operations that log themselves and consume the transfer.
pub struct TraceOps {
    pub trace: Trace,
}

impl MountOps for TraceOps {
    fn read(&self, _mnt: &Mount, uio: &mut Uio, _flags: IoFlags) -> OpStatus {
        push(&self.trace, format!("read:{}", uio.resid));
        uio.offset += uio.resid;
        uio.resid = 0;
        Ok(())
    }

    fn write(&self, _mnt: &Mount, uio: &mut Uio, _flags: IoFlags) -> OpStatus {
        push(&self.trace, format!("write:{}", uio.resid));
        uio.offset += uio.resid;
        uio.resid = 0;
        Ok(())
    }

    fn mount(&self, _mnt: &Mount, _args: &mut MountArgs) -> OpStatus {
        push(&self.trace, "mount".to_string());
        Ok(())
    }

    fn unmount(&self, _mnt: &Mount, flags: u32) -> OpStatus {
        push(&self.trace, format!("unmount:{flags}"));
        Ok(())
    }
}

/// Hook set logging every function it carries as `<point>:<name>`.
pub fn logging_hooks(name: &str, trace: &Trace) -> HookSet {
    let mut set = HookSet::new(Arc::new(()));

    let (n, t) = (name.to_string(), Arc::clone(trace));
    set.pre_read = Some(Arc::new(move |_arg, _slot, _mnt, _uio, _flags| {
        push(&t, format!("pre_read:{n}"));
    }));
    let (n, t) = (name.to_string(), Arc::clone(trace));
    set.post_read = Some(Arc::new(move |ret, _arg, _slot, _mnt, _uio, _flags| {
        push(&t, format!("post_read:{n}"));
        ret
    }));
    let (n, t) = (name.to_string(), Arc::clone(trace));
    set.pre_write = Some(Arc::new(move |_arg, _slot, _mnt, _uio, _flags| {
        push(&t, format!("pre_write:{n}"));
    }));
    let (n, t) = (name.to_string(), Arc::clone(trace));
    set.post_write = Some(Arc::new(move |ret, _arg, _slot, _mnt, _uio, _flags| {
        push(&t, format!("post_write:{n}"));
        ret
    }));
    let (n, t) = (name.to_string(), Arc::clone(trace));
    set.pre_mount = Some(Arc::new(move |_arg, _slot, _mnt, _args| {
        push(&t, format!("pre_mount:{n}"));
    }));
    let (n, t) = (name.to_string(), Arc::clone(trace));
    set.post_mount = Some(Arc::new(move |ret, _arg, _slot, _mnt, _args| {
        push(&t, format!("post_mount:{n}"));
        ret
    }));
    let (n, t) = (name.to_string(), Arc::clone(trace));
    set.pre_unmount = Some(Arc::new(move |_arg, _slot, _mnt, _flags| {
        push(&t, format!("pre_unmount:{n}"));
    }));
    let (n, t) = (name.to_string(), Arc::clone(trace));
    set.post_unmount = Some(Arc::new(move |ret, _arg, _slot, _mnt, _flags| {
        push(&t, format!("post_unmount:{n}"));
        ret
    }));
    let (n, t) = (name.to_string(), Arc::clone(trace));
    set.remove_cb = Some(Arc::new(move |_arg, _handle| {
        push(&t, format!("remove_cb:{n}"));
    }));

    set
}
