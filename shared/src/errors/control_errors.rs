use thiserror::Error;

/// Failures of the disturber control surface.
///
/// Each variant carries a stable numeric code so tooling that speaks the
/// command surface can match on codes instead of display strings. This is
/// the only layer that forms user-visible error text.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// Parameters failed validation.
    #[error("disturbance parameters out of range")]
    InvalidArgument,
    /// The mount descriptor does not resolve to a live mount.
    #[error("mount descriptor does not resolve to a live mount")]
    BadReference,
    /// No disturbance is installed on the given mount.
    #[error("no disturbance installed on this mount")]
    NotFound,
    /// A command other than `ENABLE` was issued while inactive.
    #[error("disturber is not enabled")]
    NotEnabled,
    /// The framework refused the installation.
    #[error("hook limit exceeded")]
    TooManyHooks,
    /// An invariant of the disturber's own bookkeeping was broken.
    #[error("internal disturber error")]
    Internal,
    /// Teardown was requested while the disturber is active.
    #[error("disturber is active; disable it first")]
    Active,
}

impl ControlError {
    /// Stable numeric code for the command surface.
    pub fn code(&self) -> u32 {
        match self {
            ControlError::InvalidArgument => 1,
            ControlError::BadReference => 3,
            ControlError::NotFound => 4,
            ControlError::NotEnabled => 6,
            ControlError::TooManyHooks => 7,
            ControlError::Internal => 8,
            ControlError::Active => 10,
        }
    }
}
