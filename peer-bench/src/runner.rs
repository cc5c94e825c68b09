//! Drives one peer through a benchmark, or a whole mesh inside one process.
//!
//! Configuration is validated before any socket is bound, so a bad launch
//! fails without leaving other peers blocked on this one.

use std::net::{Ipv4Addr, SocketAddr};

use futures::future::try_join_all;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{Instrument, Span, info_span};

use crate::client::{Client, ClientReport};
use crate::config::{AllToAllConfig, LookupConfig};
use crate::error::{Result, TransportError};
use crate::harness::{Harness, HarnessReport};
use crate::role::{Role, Topology};
use crate::server::{Server, ServerReport};
use crate::transport::{Rank, Transport, TransportOptions};

/// Outcome of one peer in the lookup benchmark.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum PeerReport {
    Server(ServerReport),
    Client(ClientReport),
}

/// Span carried by every event a peer logs, from mesh setup to its report.
pub fn peer_span(rank: Rank) -> Span {
    info_span!("peer", rank, pid = std::process::id())
}

pub async fn run_lookup(transport: Transport, config: &LookupConfig) -> Result<PeerReport> {
    let topology = config.validate(transport.size())?;
    let role = topology.role(transport.rank())?;
    let span = peer_span(transport.rank());
    run_role(transport, role, config, &topology)
        .instrument(span)
        .await
}

async fn run_role(
    transport: Transport,
    role: Role,
    config: &LookupConfig,
    topology: &Topology,
) -> Result<PeerReport> {
    match role {
        Role::Server => {
            let report = Server::new(transport, config, topology).run().await?;
            Ok(PeerReport::Server(report))
        }
        Role::Client { client_id } => {
            let report = Client::new(transport, client_id, config, topology)
                .run()
                .await?;
            Ok(PeerReport::Client(report))
        }
    }
}

pub async fn run_alltoall(transport: Transport, config: &AllToAllConfig) -> Result<HarnessReport> {
    let span = peer_span(transport.rank());
    Harness::new(transport, config.clone())
        .run()
        .instrument(span)
        .await
}

/// Binds `count` loopback listeners and connects them into a full mesh.
///
/// Transports are returned in rank order.
pub async fn local_mesh(
    count: usize,
    options: TransportOptions,
) -> Result<Vec<Transport>, TransportError> {
    let mut listeners = Vec::with_capacity(count);
    for _ in 0..count {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        listeners.push(listener);
    }
    let peers = listeners
        .iter()
        .map(TcpListener::local_addr)
        .collect::<Result<Vec<_>, _>>()?;

    try_join_all(
        listeners
            .into_iter()
            .enumerate()
            .map(|(rank, listener)| {
                Transport::establish(rank, listener, peers.clone(), options.clone())
                    .instrument(peer_span(rank))
            }),
    )
    .await
}

/// Runs the lookup benchmark with `count` in-process peers.
///
/// Reports are returned in rank order.
pub async fn run_local_lookup(count: usize, config: &LookupConfig) -> Result<Vec<PeerReport>> {
    config.validate(count)?;
    let transports = local_mesh(count, TransportOptions::default()).await?;

    let tasks = transports.into_iter().map(|transport| {
        let config = config.clone();
        tokio::spawn(async move { run_lookup(transport, &config).await })
    });
    try_join_all(tasks).await?.into_iter().collect()
}

/// Runs the all-to-all benchmark with `count` in-process peers.
pub async fn run_local_alltoall(
    count: usize,
    config: &AllToAllConfig,
) -> Result<Vec<HarnessReport>> {
    let transports = local_mesh(count, TransportOptions::default()).await?;

    let tasks = transports.into_iter().map(|transport| {
        let config = config.clone();
        tokio::spawn(async move { run_alltoall(transport, &config).await })
    });
    try_join_all(tasks).await?.into_iter().collect()
}
