//! Validated run parameters.
//!
//! Every check here runs before the transport opens a socket, so a bad launch
//! fails fast with a [`ConfigError`] instead of leaving peers blocked.

use std::net::SocketAddr;

use crate::error::ConfigError;
use crate::role::Topology;
use crate::transport::Rank;

/// Table size used when none is given on the command line.
pub const DEFAULT_TABLE_SIZE: usize = 50;

/// Where the peers of a run live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// This process is `rank` in the mesh formed by `peers` (indexed by rank).
    Single { rank: Rank, peers: Vec<SocketAddr> },
    /// All `count` peers run as tasks of this process on loopback.
    Local { count: usize },
}

impl Placement {
    pub fn new(
        rank: Option<Rank>,
        peers: Vec<SocketAddr>,
        local: Option<usize>,
    ) -> Result<Self, ConfigError> {
        match (rank, local) {
            (None, Some(0)) => Err(ConfigError::NoPeers),
            (None, Some(count)) if peers.is_empty() => Ok(Placement::Local { count }),
            (Some(rank), None) => {
                if peers.is_empty() {
                    return Err(ConfigError::NoPeers);
                }
                if rank >= peers.len() {
                    return Err(ConfigError::RankOutOfRange {
                        rank,
                        total: peers.len(),
                    });
                }
                Ok(Placement::Single { rank, peers })
            }
            _ => Err(ConfigError::Placement),
        }
    }

    pub fn total(&self) -> usize {
        match self {
            Placement::Single { peers, .. } => peers.len(),
            Placement::Local { count } => *count,
        }
    }
}

/// Parameters of the replicated lookup benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    pub servers: usize,
    /// GET round trips issued by each client.
    pub requests: u64,
    pub table_size: usize,
    /// Servers log progress after this many requests; 0 disables it.
    pub progress_every: u64,
}

impl LookupConfig {
    /// Checks the parameters against a peer set of `total` ranks.
    ///
    /// Each client spreads its requests round-robin, so every server receives
    /// the same share only when `requests` divides evenly by `servers`. Any
    /// other count would leave some server waiting forever and is rejected.
    pub fn validate(&self, total: usize) -> Result<Topology, ConfigError> {
        let topology = Topology::new(total, self.servers)?;
        if self.requests % self.servers as u64 != 0 {
            return Err(ConfigError::UnevenRequests {
                requests: self.requests,
                servers: self.servers,
            });
        }
        if self.requests > i32::MAX as u64 + 1 {
            return Err(ConfigError::KeySpace {
                requests: self.requests,
            });
        }
        Ok(topology)
    }

    /// Requests each server answers before it stops.
    pub fn requests_per_server(&self, topology: &Topology) -> u64 {
        self.requests * topology.clients() as u64 / topology.servers() as u64
    }
}

/// Parameters of the all-to-all bandwidth benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllToAllConfig {
    pub epochs: usize,
    /// Bytes exchanged per epoch across all peers.
    pub data_size: usize,
}

impl AllToAllConfig {
    /// Bytes each peer sends to each other peer per epoch.
    pub fn chunk_size(&self, peers: usize) -> usize {
        if peers == 0 {
            return 0;
        }
        self.data_size / peers
    }
}
