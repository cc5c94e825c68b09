//! Error types shared by every peer role.
//!
//! Configuration problems are detected before any socket is opened. Transport
//! failures are fatal to the run: there is no retry past the initial dial
//! back-off and no recovery from a lost peer.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::message::Tag;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("peer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Rejected launch parameters. Always raised before the first connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("server count {servers} must be in [1, {total}) for {total} peers")]
    ServerCount { servers: usize, total: usize },

    #[error("rank {rank} is outside the peer set of size {total}")]
    RankOutOfRange { rank: usize, total: usize },

    #[error("request count {requests} is not evenly divisible across {servers} servers")]
    UnevenRequests { requests: u64, servers: usize },

    #[error("request count {requests} exceeds the i32 key space")]
    KeySpace { requests: u64 },

    #[error("at least one peer address is required")]
    NoPeers,

    #[error("either --local or both --rank and --peers must be given")]
    Placement,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("could not reach peer {rank} at {addr} after {attempts} attempts: {source}")]
    Dial {
        rank: usize,
        addr: SocketAddr,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("handshake from {addr} announced unknown rank {rank}")]
    Handshake { addr: SocketAddr, rank: u32 },

    #[error("no link to peer {0}")]
    UnknownPeer(usize),

    #[error("link to peer {0} closed")]
    Closed(usize),

    #[error("pending operation was abandoned")]
    Abandoned,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{tag:?} record must be {expected} bytes, got {actual}")]
    RecordSize {
        tag: Tag,
        expected: usize,
        actual: usize,
    },

    #[error("response for key {actual} does not match request key {expected}")]
    KeyMismatch { expected: i32, actual: i32 },

    #[error("chunk from peer {from} is {actual} bytes, expected {expected}")]
    ChunkSize {
        from: usize,
        expected: usize,
        actual: usize,
    },
}
