//! Process settings: `treefetch.toml` plus `TREEFETCH_*` environment overrides.

pub mod parser;
pub mod paths;
pub mod schema;

use std::path::Path;

use anyhow::Context;

pub use parser::{parse_settings_toml, parse_settings_toml_str, to_toml};
pub use paths::{default_cache_dir, default_config_path, default_store_dir};
pub use schema::{DEFAULT_TARBALL_TTL, Settings};

impl Settings {
    /// Load settings from `path`, or the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let settings = match path {
            Some(path) => parse_settings_toml(path)?,
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    parse_settings_toml(&path)?
                } else {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    Settings::default()
                }
            }
        };
        settings
            .with_env_overrides()
            .context("Failed to apply environment overrides")
    }
}
