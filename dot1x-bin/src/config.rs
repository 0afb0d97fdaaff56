use anyhow::{bail, Context, Result};
use clap::Parser;
use dot1x_core::Config;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(short, long, value_parser, default_value = "/etc/dot1x/dot1x.toml")]
    pub config_file: PathBuf,
}

pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let config_contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&config_contents).with_context(|| format!("parsing {}", path.display()))?;

    if config.interface.is_empty() {
        bail!("{}: interface must not be empty", path.display());
    }
    if config.tunables.max_start == 0 || config.tunables.max_auth_attempts == 0 {
        bail!("{}: retry ceilings must be at least 1", path.display());
    }
    if config.tunables.transmit_loss_percent > 100 || config.tunables.receive_loss_percent > 100 {
        bail!("{}: loss percentages must be within 0..=100", path.display());
    }

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}
