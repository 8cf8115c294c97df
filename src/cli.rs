use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "streambridge")]
#[command(author, version, about = "Local HLS bridge over a range-fetch substrate")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the bridge server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Serve resources from this directory instead of the configured substrate
        #[arg(long)]
        media_root: Option<PathBuf>,
    },

    /// Print the master manifest a media object would get
    Manifest {
        /// Media object description (JSON)
        #[arg(required = true)]
        media: PathBuf,

        /// Also print each level's playlist path
        #[arg(long)]
        levels: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
