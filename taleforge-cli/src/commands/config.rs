//! Configuration inspection commands

use super::{load_config, SERVICE_NAME};
use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use taleforge::config::TaleforgeConfig;

/// Configuration subcommands
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print where the user configuration file belongs
    Path,
}

impl ConfigCommand {
    /// Execute the command
    pub fn execute(&self, config: Option<&Path>) -> Result<()> {
        match self {
            Self::Show => {
                let rendered = render(&load_config(config)?)?;
                println!("{rendered}");
            }
            Self::Path => {
                let path = TaleforgeConfig::recommended_path(SERVICE_NAME);
                let status = if path.exists() {
                    style("(exists)").green()
                } else {
                    style("(not created)").dim()
                };
                println!("{} {status}", path.display());
            }
        }
        Ok(())
    }
}

/// Render a configuration as TOML with secrets masked
fn render(config: &TaleforgeConfig) -> Result<String> {
    toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")
}
