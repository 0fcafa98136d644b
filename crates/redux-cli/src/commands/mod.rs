pub mod config;
pub mod graph;
pub mod ledger;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use redux_core::pipeline::ReduxConfig;

/// Load a TOML config, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<ReduxConfig> {
    let Some(path) = path else {
        return Ok(ReduxConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).context("Invalid redux config")
}
