//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "revu",
    version,
    about = "Conversational review companion for your own documents",
    long_about = "Revu turns uploaded slide decks and notes into an interactive quiz session: \
                  documents are chunked and semantically indexed, questions are generated from \
                  retrieved context, and your answers are evaluated, all driven by chatting \
                  with the assistant."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/revu/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive review chat session
    Chat {
        /// Documents to ingest before the first turn
        #[arg(short, long, value_name = "FILE")]
        ingest: Vec<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
