use std::path::PathBuf;

use clap::Parser;

/// One-shot query driver: load a router config, push a single query through
/// the configured entry plugin, print the response.
#[derive(Debug, Parser)]
#[command(name = "dnspipe", version, about = "Programmable DNS router")]
pub struct Cli {
    /// Path to the router config (YAML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Name to query
    #[arg(short, long)]
    pub name: String,

    /// Record type to query
    #[arg(short = 't', long, default_value = "A")]
    pub qtype: String,

    /// Entry plugin tag; overrides the config's `entry`
    #[arg(long)]
    pub entry: Option<String>,

    /// Ambient deadline for the whole query, in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}
