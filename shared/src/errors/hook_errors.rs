use thiserror::Error;

/// Failures the hook framework reports to its callers.
///
/// The framework never recovers internally; every failure is surfaced to the
/// client, which owns the translation into its own code space.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    /// The handle space hit its configured ceiling.
    #[error("hook handle space exhausted")]
    LimitExceeded,
    /// No live hook or callback matches the given handle.
    #[error("no entry matches the given handle")]
    NotFound,
    /// An internal invariant was broken. Surfaced, not recovered.
    #[error("hook framework invariant violated: {0}")]
    Internal(&'static str),
}
