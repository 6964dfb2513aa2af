use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "veil",
    about = "Veil: per-object envelope encryption for object storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a payload through the encrypted facade and read it back
    Roundtrip(RoundtripArgs),
    /// Manage a plaintext profile file
    Profile(ProfileArgs),
    /// Create or check a facade configuration file
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct RoundtripArgs {
    #[arg(long, default_value = "my-bucket")]
    pub bucket: String,
    #[arg(long, default_value = "hello")]
    pub object: String,
    /// Payload to store
    #[arg(long, default_value = "Hello, World!", conflicts_with = "file")]
    pub content: String,
    /// Store this file's contents instead of `--content`
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Key attribute as name=value; repeat a name to give it several values
    #[arg(long = "attr")]
    pub attributes: Vec<String>,
    /// Object metadata entry as name=value
    #[arg(long = "meta")]
    pub metadata: Vec<String>,
    /// Plaintext profile file; a throwaway profile is used when omitted
    #[arg(long)]
    pub profiles: Option<PathBuf>,
    /// Facade configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Promote object metadata into key attributes
    #[arg(long)]
    pub capture: bool,
}

#[derive(Args)]
pub struct ProfileArgs {
    /// Profile file to operate on
    #[arg(long)]
    pub file: PathBuf,
    #[command(subcommand)]
    pub action: ProfileAction,
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// List profiles; the active one is marked
    List,
    /// Add or replace a profile
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        server: String,
        #[arg(long)]
        key_space: String,
        #[arg(long)]
        credential: String,
        /// Make this the active profile
        #[arg(long)]
        activate: bool,
    },
    /// Set the active profile
    Activate { id: String },
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the default configuration
    Init,
    /// Parse a configuration file and print what it resolves to
    Check { path: PathBuf },
}
