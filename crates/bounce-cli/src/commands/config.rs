//! Render settings file management.

use bounce_config::{RenderConfig, ensure_user_config_dir, paths, user_config_path};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the path of the user settings file
    Path,

    /// Print the effective settings as TOML
    Show {
        /// Settings file to show instead of the user settings
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write a settings file with default values
    Init {
        /// Destination (defaults to the user settings file)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", user_config_path().display());
        }

        ConfigCommand::Show { file } => {
            let config = match file {
                Some(path) => RenderConfig::load(path)?,
                None => RenderConfig::load_user()?,
            };
            config.validate()?;
            print!("{}", config.to_toml()?);
        }

        ConfigCommand::Init { file, force } => {
            let path = match file {
                Some(path) => path,
                None => ensure_user_config_dir()?.join(paths::RENDER_CONFIG_FILE),
            };
            if path.exists() && !force {
                anyhow::bail!(
                    "Settings file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            RenderConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}
