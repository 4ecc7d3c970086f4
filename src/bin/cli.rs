//! AtlasDB CLI
//!
//! Command-line administration of an AtlasDB database file.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use atlasdb::{AtlasError, Config, Engine, SetOptions, SyncPolicy};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasDB CLI
#[derive(Parser, Debug)]
#[command(name = "atlasdb-cli")]
#[command(about = "Inspect and modify an AtlasDB database file")]
#[command(version)]
struct Args {
    /// Database file
    #[arg(short, long, default_value = "./atlasdb.db")]
    path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Expire the key after this many seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List keys matching a glob pattern
    Keys {
        /// Glob pattern (`*`, `?`, `\` escapes)
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Compact the log file
    Shrink,

    /// Write every live item to stdout in log format
    Dump,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .path(&args.path)
        .sync_policy(SyncPolicy::Always)
        .auto_shrink_disabled(true)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = execute(&engine, args.command);
    let closed = engine.close();

    match result.and(closed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AtlasError::NotFound) => {
            eprintln!("(not found)");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(engine: &Engine, command: Commands) -> atlasdb::Result<()> {
    let mut out = io::stdout().lock();

    match command {
        Commands::Get { key } => {
            let value = engine.view(|tx| tx.get(&key))?;
            writeln!(out, "{value}")?;
        }
        Commands::Set { key, value, ttl } => {
            let opts = SetOptions {
                ttl: ttl.map(Duration::from_secs),
            };
            engine.update(|tx| tx.set_with(&key, &value, opts))?;
            writeln!(out, "OK")?;
        }
        Commands::Del { key } => {
            engine.update(|tx| tx.delete(&key))?;
            writeln!(out, "OK")?;
        }
        Commands::Keys { pattern } => {
            engine.view(|tx| {
                for (key, _) in tx.ascend_keys(&pattern)? {
                    writeln!(out, "{key}")?;
                }
                Ok::<_, AtlasError>(())
            })?;
        }
        Commands::Shrink => {
            let before = engine.log_size();
            engine.shrink()?;
            writeln!(out, "shrunk {} -> {} bytes", before, engine.log_size())?;
        }
        Commands::Dump => {
            let count = engine.save(&mut out)?;
            tracing::info!(items = count, "dump complete");
        }
    }
    Ok(())
}
