//! Throwaway in-memory filesystem backing the demo mounts.
//!
//! Only the transfer accounting matters to the rig: reads consume `resid`
//! up to the file size, writes extend it. Content is not modeled.

use std::sync::Mutex;

use fs_hooks::{IoFlags, Mount, MountArgs, MountOps, OpStatus, Uio};

pub struct DemoFs {
    len: Mutex<u64>,
}

impl DemoFs {
    pub fn new(len: u64) -> Self {
        Self { len: Mutex::new(len) }
    }
}

impl MountOps for DemoFs {
    fn read(&self, _mnt: &Mount, uio: &mut Uio, _flags: IoFlags) -> OpStatus {
        let len = *self.len.lock().unwrap();
        let avail = len.saturating_sub(uio.offset);
        let n = uio.resid.min(avail);
        uio.resid -= n;
        uio.offset += n;
        Ok(())
    }

    fn write(&self, _mnt: &Mount, uio: &mut Uio, _flags: IoFlags) -> OpStatus {
        let mut len = self.len.lock().unwrap();
        uio.offset += uio.resid;
        uio.resid = 0;
        if uio.offset > *len {
            *len = uio.offset;
        }
        Ok(())
    }

    fn mount(&self, _mnt: &Mount, _args: &mut MountArgs) -> OpStatus {
        Ok(())
    }

    fn unmount(&self, _mnt: &Mount, _flags: u32) -> OpStatus {
        Ok(())
    }
}
