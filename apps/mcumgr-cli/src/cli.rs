use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mcumgr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to ~/.config/mcumgr/mcumgr.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags that take precedence over the configuration file.
#[derive(Debug, Default, Clone, Args)]
pub struct Overrides {
    /// Device address (host:port)
    #[arg(long, global = true)]
    pub addr: Option<String>,

    /// Link MTU in bytes, header included
    #[arg(long, global = true)]
    pub mtu: Option<usize>,

    /// Maximum chunks in flight
    #[arg(long, global = true)]
    pub window: Option<usize>,

    /// Chunk size alignment in bytes
    #[arg(long, global = true)]
    pub alignment: Option<usize>,

    /// Attempts per chunk, the first one included
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload a firmware image
    UploadImage {
        file: PathBuf,
        /// Target image slot
        #[arg(long, default_value_t = 0)]
        image: u32,
        /// Reject the image unless it is newer than the running one
        #[arg(long)]
        upgrade: bool,
    },
    /// Upload a file to the device file system
    UploadFile {
        local: PathBuf,
        /// Destination path on the device
        remote: String,
    },
    /// Download a file from the device file system
    DownloadFile {
        /// Source path on the device
        remote: String,
        local: PathBuf,
    },
    /// Download the stored core dump
    DownloadCore { local: PathBuf },
    /// Upload a SUIT envelope
    UploadEnvelope {
        file: PathBuf,
        /// Store without starting installation
        #[arg(long)]
        defer_install: bool,
    },
    /// Answer a SUIT resource request
    UploadResource {
        file: PathBuf,
        #[arg(long)]
        session_id: u64,
    },
    /// Fill a SUIT raw cache partition
    UploadCache {
        file: PathBuf,
        #[arg(long)]
        target_id: u64,
    },
    /// Run a simulated device on a TCP port
    Sim(SimArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Args)]
pub struct SimArgs {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:1337")]
    pub bind: String,

    /// Bytes returned per download read
    #[arg(long, default_value_t = 128)]
    pub read_chunk_size: usize,

    /// Only accept upload chunks at the next expected offset
    #[arg(long)]
    pub strict_offsets: bool,

    /// Report errors as group error maps
    #[arg(long)]
    pub group_errors: bool,

    /// Drop every n-th request
    #[arg(long)]
    pub drop_every: Option<u64>,

    /// Delay each response by up to this many milliseconds
    #[arg(long)]
    pub max_delay_ms: Option<u64>,

    /// Serve this file as the core dump
    #[arg(long)]
    pub core: Option<PathBuf>,
}
