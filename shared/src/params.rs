//! Payload types carried across the disturber control surface.

use serde::{Deserialize, Serialize};

use crate::errors::ControlError;

/// Disturbance parameters shared by all hooks the disturber installs on one
/// mount.
///
/// "Read less" shortens a read request by a random amount from `range`, with
/// probability `chance_percent` per call. Every consumer of the filesystem
/// API has to tolerate short reads anyway, so the injected behavior is
/// pathological but protocol-legal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisturbParams {
    /// Probability, in whole percent, that one read call is shortened.
    pub chance_percent: u64,
    /// Inclusive `[lo, hi]` range the shortening amount is drawn from.
    pub range: [u64; 2],
}

impl DisturbParams {
    /// Reject parameters the hooks cannot honor.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.chance_percent > 100 || self.range[0] > self.range[1] {
            return Err(ControlError::InvalidArgument);
        }
        Ok(())
    }
}

/// One entry of a `GET_LIST` reply: a disturbed mount and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountDisturb {
    pub mountpoint: String,
    pub params: DisturbParams,
}

/// `GET_INFO` reply: overall disturber status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisturbInfo {
    /// Whether the disturber is active.
    pub enabled: bool,
    /// Number of mounts currently carrying a disturbance, including ones
    /// whose removal has not finished reclaiming yet.
    pub installed_count: u64,
    /// Omnipresent policy, when one is configured.
    pub omni: Option<DisturbParams>,
}
