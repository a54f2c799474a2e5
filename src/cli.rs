use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gemini-key-pool",
    version,
    about = "Manage a pool of Gemini API keys with automatic rotation",
    long_about = "Stores Gemini API keys with per-key health statistics, and sends requests through the pool, rotating to a healthy key on quota or authentication failures."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "KEY_POOL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "KEY_POOL_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Key management commands
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },

    /// Send a prompt to Gemini through the pool
    Generate {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Validate configuration file
    Config {
        /// Configuration file to validate
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Print the effective configuration
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// List all keys and their health
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a key to the end of the pool
    Add {
        /// The API key
        #[arg(env = "GEMINI_NEW_API_KEY", hide_env_values = true)]
        key: String,
    },

    /// Remove the key at a position (1-based, as shown by `list`)
    Remove { position: usize },

    /// Reset the health statistics of the key at a position (1-based)
    Reset { position: usize },

    /// Add keys from GEMINI_API_KEY_n, GEMINI_API_KEY or GEMINI_API_KEYS
    ImportEnv,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Converts a 1-based position from the command line to an index.
pub fn position_to_index(position: usize) -> Option<usize> {
    position.checked_sub(1)
}
