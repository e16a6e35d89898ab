//! Admin/demo binary for the filesystem disturber.
//!
//! There is no kernel on the other side of this command surface; the rig
//! is built in process. The binary creates a handful of demo mounts,
//! attaches the disturber, applies the requested policy through the same
//! request enum any admin tooling would use, issues reads so the short-read
//! injection is visible, and reports `GET_INFO`/`GET_LIST` as JSON on
//! stdout before tearing everything down.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use disturber::{Disturber, Request, Response};
use fs_hooks::{Mount, MountArgs, Uio};
use shared::errors::ControlError;
use shared::params::DisturbParams;

mod logger;
mod memfs;

use memfs::DemoFs;

#[derive(Parser)]
#[command(
    name = "disturbctl",
    about = "Drive the filesystem disturber against an in-process host rig"
)]
struct Cli {
    /// Number of demo mounts to create.
    #[arg(long, default_value_t = 2)]
    mounts: usize,

    /// Probability, in percent, that one read is shortened.
    #[arg(long, default_value_t = 100)]
    chance: u64,

    /// Lower bound of the shortening range, in bytes.
    #[arg(long, default_value_t = 10)]
    range_lo: u64,

    /// Upper bound of the shortening range, in bytes.
    #[arg(long, default_value_t = 10)]
    range_hi: u64,

    /// Install the policy as omnipresent (before any mount appears)
    /// instead of disturbing each mount explicitly.
    #[arg(long)]
    omni: bool,

    /// Disturb only the mount with this mountpoint.
    #[arg(long, conflicts_with = "omni")]
    target: Option<String>,

    /// Reads issued per mount.
    #[arg(long, default_value_t = 4)]
    reads: usize,

    /// Bytes requested per read.
    #[arg(long, default_value_t = 100)]
    want: u64,
}

/// The demo's descriptor table: mountpoints name mounts. Unknown names are
/// the `bad_reference` case of the command surface.
fn resolve<'a>(mounts: &'a [Arc<Mount>], name: &str) -> Result<&'a Arc<Mount>> {
    mounts
        .iter()
        .find(|m| m.mountpoint() == name)
        .ok_or_else(|| anyhow!(ControlError::BadReference))
        .with_context(|| format!("no demo mount at {name}"))
}

fn main() -> Result<()> {
    let _logger = logger::init_logger()?;
    let cli = Cli::parse();

    let params = DisturbParams {
        chance_percent: cli.chance,
        range: [cli.range_lo, cli.range_hi],
    };

    let disturber = Disturber::attach()?;
    disturber.command(Request::Enable)?;
    info!("disturber attached and enabled");

    // The omnipresent policy has to be in place before the mounts appear;
    // that is the whole point of it.
    if cli.omni {
        disturber.command(Request::DisturbOmni { params })?;
        info!("omnipresent policy set: {params:?}");
    }

    let mut mounts: Vec<Arc<Mount>> = Vec::new();
    for i in 0..cli.mounts {
        let name = format!("/mnt/demo{i}");
        let mnt = Mount::mount(&name, Box::new(DemoFs::new(1 << 20)), &mut MountArgs::default())
            .map_err(|errno| anyhow!("mounting {name} failed with errno {errno}"))?;
        info!("mounted {}", mnt.mountpoint());
        mounts.push(mnt);
    }

    if !cli.omni {
        match &cli.target {
            Some(name) => {
                let mnt = resolve(&mounts, name)?;
                disturber.command(Request::Disturb { mount: mnt, params })?;
            }
            None => {
                for mnt in &mounts {
                    disturber.command(Request::Disturb { mount: mnt, params })?;
                }
            }
        }
    }

    for mnt in &mounts {
        for _ in 0..cli.reads {
            let mut uio = Uio::new(cli.want, 0);
            match mnt.read(&mut uio, 0) {
                Ok(()) => println!(
                    "read {} want={} short_by={}",
                    mnt.mountpoint(),
                    cli.want,
                    uio.resid
                ),
                Err(errno) => warn!("read on {} failed with errno {errno}", mnt.mountpoint()),
            }
        }
    }

    if let Response::Info(info) = disturber.command(Request::GetInfo)? {
        println!("{}", serde_json::to_string_pretty(&info)?);
    }
    if let Response::List(list) = disturber.command(Request::GetList { capacity: mounts.len() })? {
        println!("{}", serde_json::to_string_pretty(&list)?);
    }

    for mnt in &mounts {
        match disturber.command(Request::DisturbOff { mount: mnt }) {
            Ok(_) | Err(ControlError::NotFound) => {}
            Err(e) => warn!("removing disturbance from {} failed: {e}", mnt.mountpoint()),
        }
    }
    disturber.command(Request::Disable)?;
    if let Err((_, e)) = disturber.detach() {
        bail!("detach failed: {e}");
    }
    for mnt in mounts {
        fs_hooks::free_mount(mnt);
    }
    info!("rig torn down");
    Ok(())
}
