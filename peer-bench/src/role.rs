use crate::error::ConfigError;
use crate::transport::Rank;

/// What a peer does for the lookup benchmark, derived from its rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client { client_id: usize },
}

/// Split of a peer set into a server prefix and a client suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    total: usize,
    servers: usize,
}

impl Topology {
    pub fn new(total: usize, servers: usize) -> Result<Self, ConfigError> {
        if servers == 0 || servers >= total {
            return Err(ConfigError::ServerCount { servers, total });
        }
        Ok(Self { total, servers })
    }

    pub fn servers(&self) -> usize {
        self.servers
    }

    pub fn clients(&self) -> usize {
        self.total - self.servers
    }

    /// Ranks `0..servers` serve; every later rank is a client numbered from 0.
    pub fn role(&self, rank: Rank) -> Result<Role, ConfigError> {
        if rank >= self.total {
            return Err(ConfigError::RankOutOfRange {
                rank,
                total: self.total,
            });
        }
        if rank < self.servers {
            Ok(Role::Server)
        } else {
            Ok(Role::Client {
                client_id: rank - self.servers,
            })
        }
    }
}

pub fn assign(rank: Rank, total: usize, servers: usize) -> Result<Role, ConfigError> {
    Topology::new(total, servers)?.role(rank)
}
