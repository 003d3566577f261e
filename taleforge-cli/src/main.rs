//! taleforge operator CLI

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{AdmitCommand, CheckCommand, ConfigCommand};
use std::path::PathBuf;
use std::process::ExitCode;
use taleforge::observability::{self, ObservabilityConfig};

#[derive(Parser)]
#[command(name = "taleforge")]
#[command(version)]
#[command(about = "Validate, moderate and admit profile images", long_about = None)]
struct Cli {
    /// Configuration file to load instead of the standard locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show pipeline logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run local validation only
    Check {
        /// Image file to check
        file: PathBuf,
        /// Declared MIME type (detected from the file when omitted)
        #[arg(long)]
        mime: Option<String>,
    },
    /// Run the full admission pipeline for one owner
    Admit {
        /// Image file to admit
        file: PathBuf,
        /// Profile that receives the image
        #[arg(long)]
        owner: String,
        /// Declared MIME type (detected from the file when omitted)
        #[arg(long)]
        mime: Option<String>,
        /// Create the owner's profile if it does not exist yet
        #[arg(long)]
        create_owner: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration with secrets masked
    Show,
    /// Print the recommended configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "info,taleforge=debug" } else { "warn" };
    observability::init_with(
        &ObservabilityConfig::new(commands::SERVICE_NAME).with_default_filter(filter),
    )?;

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Check { file, mime } => CheckCommand::new(file, mime).execute(config),
        Commands::Admit {
            file,
            owner,
            mime,
            create_owner,
        } => {
            AdmitCommand::new(file, owner, mime, create_owner)
                .execute(config)
                .await
        }
        Commands::Config { command } => {
            let cmd = match command {
                ConfigCommands::Show => ConfigCommand::Show,
                ConfigCommands::Path => ConfigCommand::Path,
            };
            cmd.execute(config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
