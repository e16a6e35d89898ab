//! Command surface of the disturber.
//!
//! The surface mirrors a character-device command set: a fixed numeric
//! command space (see `shared::constants`), one request per command, and
//! numeric error codes stable enough for tooling. Everything except
//! `ENABLE` is refused while the disturber is inactive.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use fs_hooks::Mount;
use shared::constants::{
    CMD_DISABLE, CMD_DISTURB, CMD_DISTURB_OFF, CMD_DISTURB_OMNI, CMD_DISTURB_OMNI_OFF,
    CMD_ENABLE, CMD_GET_INFO, CMD_GET_LIST, CMD_GET_PARAM,
};
use shared::errors::ControlError;
use shared::params::{DisturbInfo, DisturbParams, MountDisturb};

use crate::{find_live, install_locked, remove_hook, Disturber};

/// One control-plane request. Mount descriptors arrive already resolved;
/// the admin layer owning the descriptor-to-mount table reports
/// `bad_reference` for descriptors that do not resolve.
pub enum Request<'m> {
    /// Mark the disturber active. While active, teardown is refused.
    Enable,
    /// Mark the disturber inactive. No new hooks.
    Disable,
    /// Report the parameters installed on one mount.
    GetParam { mount: &'m Arc<Mount> },
    /// Install a disturbance, or update the one already installed.
    Disturb { mount: &'m Arc<Mount>, params: DisturbParams },
    /// Remove the disturbance from one mount.
    DisturbOff { mount: &'m Arc<Mount> },
    /// Set the omnipresent policy; every future mount gets this hook.
    /// Already disturbed mounts keep their parameters.
    DisturbOmni { params: DisturbParams },
    /// Clear the omnipresent policy. Mounts disturbed because of it stay
    /// disturbed.
    DisturbOmniOff,
    /// Report up to `capacity` disturbed mounts.
    GetList { capacity: usize },
    /// Report overall status.
    GetInfo,
}

impl Request<'_> {
    /// Numeric command word this request travels as.
    pub fn code(&self) -> u32 {
        match self {
            Request::Enable => CMD_ENABLE,
            Request::Disable => CMD_DISABLE,
            Request::GetParam { .. } => CMD_GET_PARAM,
            Request::Disturb { .. } => CMD_DISTURB,
            Request::DisturbOff { .. } => CMD_DISTURB_OFF,
            Request::DisturbOmni { .. } => CMD_DISTURB_OMNI,
            Request::DisturbOmniOff => CMD_DISTURB_OMNI_OFF,
            Request::GetList { .. } => CMD_GET_LIST,
            Request::GetInfo => CMD_GET_INFO,
        }
    }
}

/// Reply of a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Done,
    Param(DisturbParams),
    List(Vec<MountDisturb>),
    Info(DisturbInfo),
}

impl Disturber {
    /// Execute one control-plane request.
    pub fn command(&self, req: Request<'_>) -> Result<Response, ControlError> {
        let state = self.state();

        {
            let roster = state.roster.lock().unwrap();
            if !roster.enabled && !matches!(req, Request::Enable) {
                return Err(ControlError::NotEnabled);
            }
        }

        match req {
            Request::Enable => {
                state.roster.lock().unwrap().enabled = true;
                Ok(Response::Done)
            }
            Request::Disable => {
                state.roster.lock().unwrap().enabled = false;
                Ok(Response::Done)
            }
            Request::GetParam { mount } => {
                let roster = state.roster.lock().unwrap();
                let entry = find_live(&roster, mount.id()).ok_or(ControlError::NotFound)?;
                let params = *entry.params.read().unwrap();
                Ok(Response::Param(params))
            }
            Request::Disturb { mount, params } => {
                params.validate()?;
                let mut roster = state.roster.lock().unwrap();
                install_locked(state, &mut roster, mount, params)?;
                Ok(Response::Done)
            }
            Request::DisturbOff { mount } => {
                let entry = {
                    let roster = state.roster.lock().unwrap();
                    let entry =
                        find_live(&roster, mount.id()).ok_or(ControlError::NotFound)?;
                    entry.doomed.store(true, Ordering::Release);
                    entry
                };
                // Reclamation may run inside this call; the roster mutex is
                // not held for exactly that reason.
                remove_hook(&entry);
                Ok(Response::Done)
            }
            Request::DisturbOmni { params } => {
                params.validate()?;
                state.roster.lock().unwrap().omni = Some(params);
                Ok(Response::Done)
            }
            Request::DisturbOmniOff => {
                state.roster.lock().unwrap().omni = None;
                Ok(Response::Done)
            }
            Request::GetList { capacity } => {
                let roster = state.roster.lock().unwrap();
                let list = roster
                    .entries
                    .iter()
                    .filter(|e| !e.doomed.load(Ordering::Acquire))
                    .take(capacity)
                    .map(|e| MountDisturb {
                        mountpoint: e.mountpoint.clone(),
                        params: *e.params.read().unwrap(),
                    })
                    .collect();
                Ok(Response::List(list))
            }
            Request::GetInfo => {
                let roster = state.roster.lock().unwrap();
                Ok(Response::Info(DisturbInfo {
                    enabled: roster.enabled,
                    installed_count: roster.installed as u64,
                    omni: roster.omni,
                }))
            }
        }
    }
}
