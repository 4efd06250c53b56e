//! CLI module
//!
//! This module defines the command-line interface using clap and implements
//! the command execution logic.

use crate::{Config, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;
pub mod output;

/// IOU ledger client with automatic debt-cycle netting
#[derive(Parser, Debug)]
#[command(name = "iou-netting")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger backend (defaults to [default] source in the config)
    #[arg(short, long, global = true, value_enum)]
    pub source: Option<SourceType>,

    /// Account IOUs are written from (overrides config)
    #[arg(short, long, global = true, env = "IOU_ACCOUNT")]
    pub account: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Cache fetched blocks on disk
    #[arg(long, global = true)]
    pub cache: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List everyone who ever sent or received an IOU
    Users,

    /// Show the total a participant owes
    Owed {
        /// Participant address
        user: String,
    },

    /// Show when a participant last sent or received an IOU
    LastActive {
        /// Participant address
        user: String,
    },

    /// Record an IOU from the account to a creditor, then net debt loops
    Add {
        /// Creditor address
        creditor: String,

        /// Amount owed
        amount: u32,
    },

    /// Find and cancel debt loops
    Sweep,

    /// Print the current debt graph
    Graph,
}

/// Ledger backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceType {
    /// In-memory chain with sample history
    Mock,
    /// Ethereum JSON-RPC node
    Rpc,
}

impl SourceType {
    /// Parse the `[default] source` config value
    pub fn from_config(value: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(value, true)
            .map_err(|_| crate::Error::Config(format!("Unknown source '{}'", value)))
    }
}

/// Output format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text table
    Table,
    /// JSON output
    Json,
    /// DOT format (Graphviz), graph command only
    Dot,
}

/// Execute the CLI command
pub async fn execute(args: Cli, config: Config) -> Result<()> {
    let client = commands::connect(&args, &config)?;
    let mut out = std::io::stdout();

    match args.command {
        Commands::Users => commands::users(&client, args.output, &mut out).await,
        Commands::Owed { user } => commands::owed(&client, &user, args.output, &mut out).await,
        Commands::LastActive { user } => {
            commands::last_active(&client, &user, args.output, &mut out).await
        }
        Commands::Add { creditor, amount } => {
            commands::add(&client, &creditor, amount, args.output, &mut out).await
        }
        Commands::Sweep => commands::sweep(&client, args.output, &mut out).await,
        Commands::Graph => commands::graph(&client, args.output, &mut out).await,
    }
}
