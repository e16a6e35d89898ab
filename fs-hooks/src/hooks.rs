//! Client-facing hook types.
//!
//! A hook is a set of optional pre/post functions for the intercepted
//! operations, an optional removal callback, and one opaque argument shared
//! by every function of the set. The framework copies the set at install
//! time; the returned [`Handle`] is the only way to refer to the hook
//! afterwards.
//!
//! Pre functions receive the operation arguments by mutable reference and
//! may change them. They also receive the *instance slot*, a per-call cell
//! used to pass data to the matching post function of the same call. Post
//! functions receive the result of the next layer (the next hook's post, or
//! the wrapped operation itself), may replace it, and take ownership of the
//! instance slot. Anything the pre function parks in the slot is dropped by
//! the end of the call at the latest.

use std::any::Any;
use std::sync::Arc;

use crate::mount::{IoFlags, Mount, MountArgs, Uio};

/// errno-style code carried through the hook chain.
pub type Errno = i32;

/// Result of a wrapped filesystem operation. The framework is transparent
/// to its meaning; post hooks may replace it wholesale.
pub type OpStatus = Result<(), Errno>;

/// Opaque client state shared by every function of one hook set.
pub type HookArg = Arc<dyn Any + Send + Sync>;

/// Per-call channel between a pre function and its paired post function.
pub type InstanceSlot = Option<Box<dyn Any + Send>>;

/// Identifier of an installed hook.
///
/// Unique while the hook is live; never reused while any reference to the
/// hook remains. The raw value is a dense non-negative integer, with `-1`
/// reserved as the allocation-failure sentinel of the numeric surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub(crate) i64);

impl Handle {
    /// Reserved sentinel. Never returned for a live hook.
    pub const INVALID: Handle = Handle(-1);

    pub fn raw(self) -> i64 {
        self.0
    }
}

/// Identifier of an installed mount/free callback. Drawn from the same
/// handle space as [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(pub(crate) i64);

impl CallbackHandle {
    pub fn raw(self) -> i64 {
        self.0
    }
}

/// Fired once per removed hook, after the last thread executing it has
/// finished. It is safe to destroy all client state tied to the hook here.
pub type RemoveCb = Arc<dyn Fn(&HookArg, Handle) + Send + Sync>;

/// Pre function for the read/write interception points.
pub type PreIoFn =
    Arc<dyn Fn(&HookArg, &mut InstanceSlot, &Mount, &mut Uio, &mut IoFlags) + Send + Sync>;

/// Post function for the read/write interception points.
pub type PostIoFn =
    Arc<dyn Fn(OpStatus, &HookArg, InstanceSlot, &Mount, &mut Uio, IoFlags) -> OpStatus + Send + Sync>;

/// Pre function for the mount interception point.
pub type PreMountFn =
    Arc<dyn Fn(&HookArg, &mut InstanceSlot, &Mount, &mut MountArgs) + Send + Sync>;

/// Post function for the mount interception point.
pub type PostMountFn =
    Arc<dyn Fn(OpStatus, &HookArg, InstanceSlot, &Mount, &mut MountArgs) -> OpStatus + Send + Sync>;

/// Pre function for the unmount interception point.
pub type PreUnmountFn =
    Arc<dyn Fn(&HookArg, &mut InstanceSlot, &Mount, &mut u32) + Send + Sync>;

/// Post function for the unmount interception point.
pub type PostUnmountFn =
    Arc<dyn Fn(OpStatus, &HookArg, InstanceSlot, &Mount, u32) -> OpStatus + Send + Sync>;

/// One hook set, as filled out by the client.
///
/// Leave a slot `None` to skip that interception point. A set whose pre and
/// post functions are all absent installs fine and has no observable effect;
/// the dispatch engine elides it from snapshots.
#[derive(Clone)]
pub struct HookSet {
    /// Shared argument handed to every function of the set.
    pub arg: HookArg,
    /// Fired after removal, once no thread is executing the hook.
    pub remove_cb: Option<RemoveCb>,

    pub pre_read: Option<PreIoFn>,
    pub post_read: Option<PostIoFn>,
    pub pre_write: Option<PreIoFn>,
    pub post_write: Option<PostIoFn>,
    pub pre_mount: Option<PreMountFn>,
    pub post_mount: Option<PostMountFn>,
    pub pre_unmount: Option<PreUnmountFn>,
    pub post_unmount: Option<PostUnmountFn>,
}

impl HookSet {
    /// Empty set around a shared argument. Fill the slots you need.
    pub fn new(arg: HookArg) -> Self {
        Self {
            arg,
            remove_cb: None,
            pre_read: None,
            post_read: None,
            pre_write: None,
            post_write: None,
            pre_mount: None,
            post_mount: None,
            pre_unmount: None,
            post_unmount: None,
        }
    }
}
