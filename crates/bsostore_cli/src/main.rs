//! BSOStore CLI
//!
//! Operator tools for BSOStore account stores.
//!
//! # Commands
//!
//! - `inspect` - Display per-collection figures for each account
//! - `sweep` - Remove expired records from every collection
//! - `compact` - Rewrite journals to hold only live records
//! - `dump` - Print the records of one collection
//! - `verify` - Check journal frames and checksums
//!
//! Stores are opened with an exclusive lock, so these commands fail while
//! a server holds the same data directory.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// BSOStore command-line store tools.
#[derive(Parser)]
#[command(name = "bsostore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory holding the account stores
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display per-collection figures for each account
    Inspect {
        /// Only this account
        #[arg(short, long)]
        account: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove expired records from every collection
    Sweep {
        /// Only this account
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Rewrite journals to hold only live records
    Compact {
        /// Only this account
        #[arg(short, long)]
        account: Option<String>,

        /// Dry run - show journal sizes only
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Print the records of one collection
    Dump {
        /// Account owning the collection
        account: String,

        /// Collection name
        collection: String,

        /// Output format (json, newlines)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check journal frames and checksums
    Verify {
        /// Only this account
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { account, format } => {
            let root = cli.data_dir.ok_or("Data directory required for inspect")?;
            commands::inspect::run(&root, account.as_deref(), &format)?;
        }
        Commands::Sweep { account } => {
            let root = cli.data_dir.ok_or("Data directory required for sweep")?;
            commands::sweep::run(&root, account.as_deref())?;
        }
        Commands::Compact { account, dry_run } => {
            let root = cli.data_dir.ok_or("Data directory required for compact")?;
            commands::compact::run(&root, account.as_deref(), dry_run)?;
        }
        Commands::Dump {
            account,
            collection,
            format,
            limit,
        } => {
            let root = cli.data_dir.ok_or("Data directory required for dump")?;
            commands::dump::run(&root, &account, &collection, &format, limit)?;
        }
        Commands::Verify { account } => {
            let root = cli.data_dir.ok_or("Data directory required for verify")?;
            commands::verify::run(&root, account.as_deref())?;
        }
        Commands::Version => {
            println!("BSOStore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("BSOStore Core v{}", bsostore_core::VERSION);
        }
    }

    Ok(())
}
