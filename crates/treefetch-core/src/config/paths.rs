//! Config and data path resolution helpers.

use std::path::{Path, PathBuf};

use anyhow::Context;

const APP_DIR: &str = "treefetch";
const CONFIG_FILE: &str = "treefetch.toml";

pub fn config_path_in(config_dir: &Path) -> PathBuf {
    config_dir.join(APP_DIR).join(CONFIG_FILE)
}

/// `<config_dir>/treefetch/treefetch.toml`
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_path_in(&dir))
}

pub fn default_store_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::data_local_dir().context("Could not determine data directory")?;
    Ok(dir.join(APP_DIR).join("store"))
}

pub fn default_cache_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::cache_dir().context("Could not determine cache directory")?;
    Ok(dir.join(APP_DIR))
}
