//! The `starshot config` command for configuration management.

use clap::{Args, Subcommand};
use starshot_core::Config;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display current configuration (literal tokens are masked)
    Show,

    /// Show config file path
    Path,

    /// Write a config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let mut config = Config::load()?;
            config.api.api_token = mask_token(&config.api.api_token);
            println!("{}", config.to_toml()?);
        }

        ConfigCommand::Path => {
            println!("{}", Config::default_path().display());
        }

        ConfigCommand::Init { force } => {
            let path = Config::default_path();

            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at: {}\nUse --force to overwrite.",
                    path.display()
                );
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, Config::default().to_toml()?)?;

            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

/// Hide a literal token, keeping `${ENV_VAR}` references readable.
fn mask_token(token: &str) -> String {
    if token.is_empty() || (token.starts_with("${") && token.ends_with('}')) {
        return token.to_string();
    }
    let visible: String = token.chars().take(4).collect();
    format!("{visible}****")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("${REPLICATE_API_TOKEN}"), "${REPLICATE_API_TOKEN}");
        assert_eq!(mask_token("r8_abcdefgh"), "r8_a****");
        assert_eq!(mask_token(""), "");
    }
}
