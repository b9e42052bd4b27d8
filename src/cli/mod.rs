pub mod commands;
pub mod utils;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::store::DataDir;

#[derive(Parser)]
#[command(name = "flatfile")]
#[command(about = "flatfile CLI - Inspect and edit JSON file collections directly")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Data directory (defaults to DATA_DIR or ./data)")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Record operations on a collection")]
    Data {
        #[command(subcommand)]
        cmd: commands::data::DataCommands,
    },

    #[command(about = "List collections in the data directory")]
    Collections,
}

/// Error already printed in the requested format; the binary only sets the exit code
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Reported(pub String);

#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    // The CLI only needs the storage section, so secrets are not validated here
    let root = match cli.data_dir {
        Some(dir) => dir,
        None => AppConfig::from_env().storage.data_dir,
    };
    let data_dir = DataDir::open(&root)
        .await
        .with_context(|| format!("failed to open data directory {}", root.display()))?;

    match cli.command {
        Commands::Data { cmd } => commands::data::handle(cmd, &data_dir, output_format).await,
        Commands::Collections => commands::collections::handle(&data_dir, output_format).await,
    }
}
