use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP concat service
    Serve {
        /// Address to listen on (overrides config and PORT)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Concatenate the given URLs once and print the artifact path
    Concat {
        /// Source video URLs in playback order
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Show the stream profile of a local media file
    Probe {
        /// Media file to inspect
        input: PathBuf,
    },

    /// Verify that ffmpeg and ffprobe are available
    Check,

    /// Remove expired working sets from the storage root
    Sweep {
        /// Maximum age in hours (defaults to storage.retention_secs)
        #[arg(long)]
        max_age_hours: Option<u64>,
    },

    /// Inspect or write the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Write the default configuration to a file
    Init {
        /// Destination path
        #[arg(default_value = "config.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
