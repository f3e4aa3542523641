//! canvas-sync: inspect and exercise the remote file cache from a terminal.
//!
//! ## Example Usage
//!
//! ```bash
//! # Metadata for two files, refetching anything older than the recent window
//! canvas-sync get 1AbC 1XyZ --strategy recent
//!
//! # Download content, served from cache when the checksum still matches
//! canvas-sync download 1AbC --out image.png
//!
//! # Children of a folder
//! canvas-sync list --query "'folder-id' in parents"
//!
//! # Cache usage
//! canvas-sync cache-info --json
//! ```

use std::path::PathBuf;

use anyhow::Result;
use canvas_sync::logging::init_logging;
use canvas_sync::{SyncConfig, SyncSession};
use clap::{Parser, Subcommand};

mod sync_cli;

use sync_cli::{cache_info::CacheInfoCmd, download::DownloadCmd, get::GetCmd, list::ListCmd};

#[derive(Parser)]
#[command(
    name = "canvas-sync",
    author,
    version,
    about = "Remote file cache and synchronization layer",
    long_about = "Reads remote file metadata and content through the canvas cache.\n\n\
                  Every read names a retrieval strategy deciding between memory, the durable \
                  cache and the network."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Durable cache directory (default: $CANVAS_CACHE_DIR or ~/.canvas-sync/cache)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Run memory-only, without the durable cache
    #[arg(long, global = true)]
    no_durable: bool,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug logging for the cache layers)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch file metadata
    Get(GetCmd),

    /// Download file content
    Download(DownloadCmd),

    /// Query files on the remote
    List(ListCmd),

    /// Show cache usage and counters
    CacheInfo(CacheInfoCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        command,
        cache_dir,
        no_durable,
        json,
        verbose,
    } = Cli::parse();
    init_logging(verbose);

    let mut config = SyncConfig::from_env();
    if let Some(dir) = cache_dir {
        config = config.with_cache_dir(dir);
    }
    if no_durable {
        config = config.without_durable();
    }

    let session = SyncSession::connect(config).await;
    let result = match command {
        Commands::Get(cmd) => cmd.execute(&session, json, verbose).await,
        Commands::Download(cmd) => cmd.execute(&session, json).await,
        Commands::List(cmd) => cmd.execute(&session, json, verbose).await,
        Commands::CacheInfo(cmd) => cmd.execute(&session, json).await,
    };
    session.shutdown();
    result
}
