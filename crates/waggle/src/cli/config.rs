//! Config inspection and initialization.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective config as JSON
    Show,
    /// Write the built-in default config to the config path
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = waggle_config::load_config(config_path)
                .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            let config = waggle_config::AcquisitionConfig::default();
            waggle_config::save_config(&config, config_path)?;
            println!("Wrote default config to {}", config_path.display());
            Ok(())
        }
    }
}
