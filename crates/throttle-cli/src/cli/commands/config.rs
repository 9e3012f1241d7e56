//! `throttle config` – show the effective configuration.

use anyhow::Result;
use std::path::Path;
use throttle_core::config::{self, ThrottleConfig};

pub fn run_config(cfg: &ThrottleConfig, explicit: Option<&Path>, path_only: bool) -> Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config::config_path()?,
    };
    if path_only {
        println!("{}", path.display());
        return Ok(());
    }
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
