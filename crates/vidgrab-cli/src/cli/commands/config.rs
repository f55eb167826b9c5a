//! `vidgrab config` – show where the config and log live and what is in effect.

use anyhow::Result;
use vidgrab_core::config::{self, GrabConfig};
use vidgrab_core::logging;

pub fn run_config(cfg: &GrabConfig) -> Result<()> {
    println!("# config: {}", config::config_path()?.display());
    println!("# log:    {}", logging::log_path()?.display());
    print!("{}", cfg.to_toml()?);
    Ok(())
}
