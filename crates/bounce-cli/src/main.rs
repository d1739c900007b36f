//! Bounce CLI - render test signals through the bounce pipeline.

mod commands;
mod generators;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bounce")]
#[command(author, version, about = "Bounce streaming render CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a generated signal to a file or an output device
    Render(commands::render::RenderArgs),

    /// Show the header of a WAV or AIFF file
    Info(commands::info::InfoArgs),

    /// List audio output devices
    Devices(commands::devices::DevicesArgs),

    /// Inspect or create the render settings file
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
