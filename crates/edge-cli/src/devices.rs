//! Device identifier arguments

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

/// Devices given on the command line and/or in a file
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device identifiers (IMEI or thing key)
    #[arg(value_name = "DEVICE")]
    pub devices: Vec<String>,

    /// Read device identifiers from a file, one per line
    #[arg(long, value_name = "PATH")]
    pub devices_file: Option<PathBuf>,
}

impl DeviceArgs {
    /// All identifiers, positional ones first, in order
    pub fn resolve(&self) -> Result<Vec<String>> {
        let mut devices: Vec<String> = self
            .devices
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        if let Some(path) = &self.devices_file {
            devices.extend(read_devices_file(path)?);
        }

        if devices.is_empty() {
            bail!("No devices given: pass identifiers or --devices-file");
        }
        Ok(devices)
    }
}

/// Read one identifier per line, ignoring blank lines
pub fn read_devices_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read devices file: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
