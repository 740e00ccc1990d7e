//! Configuration view and validation commands (`relay config`).

use std::path::Path;

use anyhow::{Context, Result, bail};

use relay::config::RelayConfig;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| RelayConfig::default_path(project_dir));

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = super::super::load_config(cli, project_dir)?;
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No relay.toml at {}; using defaults", config_path.display());
            }
            println!("# Effective values (with env/CLI overrides)");
            println!();
            print!("{}", config.to_toml()?);
        }
        Some(ConfigCommands::Validate) => {
            super::super::load_config(cli, project_dir)?;
            println!("Configuration is valid.");
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                bail!("{} already exists", config_path.display());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let content = RelayConfig::default().to_toml()?;
            std::fs::write(&config_path, content)
                .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
            println!("Created {}", config_path.display());
        }
    }
    Ok(())
}
