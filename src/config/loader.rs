// Configuration loader
// Loads training settings from a TOML file, ./expert.toml, or defaults

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::TrainConfig;
use crate::errors::config_parse_error;

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "expert.toml";

/// Environment override for the compute device
pub const DEVICE_ENV_VAR: &str = "EXPERT_DEVICE";

/// Load configuration from an explicit file, ./expert.toml, or defaults
pub fn load_config(path: Option<&Path>) -> Result<TrainConfig> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            read_config_file(path)?
        }
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                read_config_file(&fallback)?
            } else {
                tracing::debug!("No config file found, using defaults");
                TrainConfig::default()
            }
        }
    };

    apply_device_override(&mut config, std::env::var(DEVICE_ENV_VAR).ok().as_deref())?;
    Ok(config)
}

/// Replace the configured device with an `EXPERT_DEVICE` value; empty means unset
pub fn apply_device_override(config: &mut TrainConfig, value: Option<&str>) -> Result<()> {
    if let Some(device) = value.filter(|v| !v.is_empty()) {
        config.device = device
            .parse()
            .with_context(|| format!("Invalid {} value", DEVICE_ENV_VAR))?;
        tracing::debug!(device = config.device.name(), "Device overridden from environment");
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<TrainConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = parse_config(&contents, path)?;
    tracing::info!(path = %path.display(), "Loaded training config");
    Ok(config)
}

/// Parse TOML contents; `origin` is only used in error messages
pub fn parse_config(contents: &str, origin: &Path) -> Result<TrainConfig> {
    toml::from_str(contents).map_err(|e| anyhow::anyhow!(config_parse_error(origin, &e.to_string())))
}
