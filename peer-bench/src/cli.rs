use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::config::{AllToAllConfig, DEFAULT_TABLE_SIZE, LookupConfig, Placement};
use crate::error::ConfigError;
use crate::transport::TransportOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replicated lookup benchmark: servers answer GETs from closed-loop clients.
    Lookup(LookupArgs),
    /// All-to-all bandwidth benchmark with per-epoch timing.
    Alltoall(AllToAllArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PeerArgs {
    /// This peer's rank, an index into --peers.
    #[arg(long, requires = "peers")]
    pub rank: Option<usize>,

    /// Comma-separated listen addresses of every peer, ordered by rank.
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<SocketAddr>,

    /// Run this many peers inside this process on loopback instead.
    #[arg(long, conflicts_with_all = ["rank", "peers"])]
    pub local: Option<usize>,

    /// Connection attempts per peer while the mesh forms.
    #[arg(long, default_value_t = 100)]
    pub dial_attempts: u32,

    /// Print the final report as a JSON line on stdout.
    #[arg(long)]
    pub json: bool,
}

impl PeerArgs {
    pub fn placement(&self) -> Result<Placement, ConfigError> {
        Placement::new(self.rank, self.peers.clone(), self.local)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            dial_attempts: self.dial_attempts,
            ..TransportOptions::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LookupArgs {
    #[command(flatten)]
    pub peer: PeerArgs,

    /// Number of leading ranks that act as servers.
    #[arg(long, default_value_t = 4)]
    pub servers: usize,

    /// GET round trips issued by each client.
    #[arg(long, default_value_t = 1000)]
    pub requests: u64,

    /// Entries in each server's lookup table.
    #[arg(long, default_value_t = DEFAULT_TABLE_SIZE)]
    pub table_size: usize,

    /// Servers log progress after this many requests (0 disables).
    #[arg(long, default_value_t = 1_000_000)]
    pub progress_every: u64,
}

impl LookupArgs {
    pub fn config(&self) -> LookupConfig {
        LookupConfig {
            servers: self.servers,
            requests: self.requests,
            table_size: self.table_size,
            progress_every: self.progress_every,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AllToAllArgs {
    #[command(flatten)]
    pub peer: PeerArgs,

    /// Number of all-to-all rounds.
    #[arg(long, default_value_t = 10_000)]
    pub epochs: usize,

    /// Total bytes exchanged per epoch, split evenly across peers.
    #[arg(long, default_value_t = 100_000)]
    pub size: usize,
}

impl AllToAllArgs {
    pub fn config(&self) -> AllToAllConfig {
        AllToAllConfig {
            epochs: self.epochs,
            data_size: self.size,
        }
    }
}
