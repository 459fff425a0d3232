//! ContentCache CLI - Command-line interface
//!
//! This binary opens a content cache directory and runs one operation
//! against it, mostly for inspection and scripting.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};

use commands::common::GlobalOptions;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "contentcache")]
#[command(version, about = "Inspect and manage a two-tier content cache")]
struct Cli {
    /// Load settings from an INI file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory (overrides the config file)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the value stored for an id
    Get {
        /// Context (namespace) of the entry
        context: String,
        /// Id of the entry
        id: String,
    },

    /// Store a value
    Put {
        /// Context (namespace) of the entry
        context: String,
        /// Id of the entry
        id: String,
        /// Value to store
        value: String,
        /// Expire the entry after this many seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Remove an entry from both tiers
    Remove {
        /// Context (namespace) of the entry
        context: String,
        /// Id of the entry
        id: String,
    },

    /// Remove the memory-resident entries of a context
    RemoveContext {
        /// Context to remove
        context: String,
    },

    /// Show disk cache statistics
    Stats,

    /// Clear the cache, removing all entries
    Clear,
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let options = GlobalOptions {
        config: cli.config,
        dir: cli.dir,
    };

    match cli.command {
        Commands::Get { context, id } => commands::entry::run_get(&options, &context, &id),
        Commands::Put {
            context,
            id,
            value,
            ttl_secs,
        } => commands::entry::run_put(&options, &context, &id, &value, ttl_secs),
        Commands::Remove { context, id } => commands::entry::run_remove(&options, &context, &id),
        Commands::RemoveContext { context } => {
            commands::entry::run_remove_context(&options, &context)
        }
        Commands::Stats => commands::cache::run_stats(&options),
        Commands::Clear => commands::cache::run_clear(&options),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = contentcache::logging::init_logging(log_level(cli.verbose), None) {
        eprintln!("Warning: {}", e);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
