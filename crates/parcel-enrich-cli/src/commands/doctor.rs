//! Environment readiness check.

use std::path::{Path, PathBuf};

use anyhow::Result;

use parcel_enrich::batch::FileCheckpoint;
use parcel_enrich::config::{self, PROFILE_ENV};
use parcel_enrich::driver::chromium::{find_chromium, CHROMIUM_PATH_ENV};

/// Check Chromium availability, the site profile, and checkpoint state.
pub fn run(profile: Option<&Path>, output: Option<&Path>, checkpoint: Option<&Path>) -> Result<()> {
    println!("parcel-enrich doctor");
    println!("====================");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set {CHROMIUM_PATH_ENV}."
        ),
    }

    let profile_ok = match config::load_profile(profile) {
        Ok(p) => match p.validate() {
            Ok(()) => {
                println!("[OK] Site profile valid (home: {})", p.home_url);
                true
            }
            Err(e) => {
                println!("[!!] Site profile invalid: {e}");
                false
            }
        },
        Err(e) => {
            println!("[!!] Site profile unusable: {e}");
            if profile.is_none() && std::env::var_os(PROFILE_ENV).is_some() {
                println!("     (path taken from {PROFILE_ENV})");
            }
            false
        }
    };

    let mut checkpoint_ok = true;
    if let Some(path) = checkpoint_to_inspect(output, checkpoint) {
        match FileCheckpoint::peek(&path) {
            Ok(Some(n)) => println!("[OK] Checkpoint {}: next row {n}", path.display()),
            Ok(None) => println!("[OK] No checkpoint at {}; a run starts at row 0", path.display()),
            Err(e) => {
                println!("[!!] Checkpoint unreadable: {e}");
                checkpoint_ok = false;
            }
        }
    }

    println!();
    if chromium.is_some() && profile_ok && checkpoint_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

/// An explicit checkpoint wins over the one derived from the output path.
fn checkpoint_to_inspect(output: Option<&Path>, checkpoint: Option<&Path>) -> Option<PathBuf> {
    match (output, checkpoint) {
        (_, Some(explicit)) => Some(explicit.to_path_buf()),
        (Some(output), None) => Some(config::checkpoint_path(output, None)),
        (None, None) => None,
    }
}
