//! Closed-loop lookup client.
//!
//! Exactly one request is outstanding at a time, so the measurements describe
//! per-call latency rather than saturation throughput.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::config::LookupConfig;
use crate::error::{ProtocolError, Result};
use crate::message::{Request, Response, Tag};
use crate::metrics::{MetricsCollector, Summary, as_secs};
use crate::role::Topology;
use crate::table::MISS;
use crate::transport::{Rank, Source, Transport, TransportStats};

const PREALLOCATED_SAMPLES: u64 = 1 << 20;

/// Server that receives the `index`-th request of every client.
pub fn target(index: u64, servers: usize) -> Rank {
    (index % servers as u64) as Rank
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientReport {
    pub rank: Rank,
    pub client_id: usize,
    pub requests: u64,
    /// Responses carrying the miss sentinel.
    pub misses: u64,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub round_trips: Summary,
    /// Completed requests per second of wall time.
    pub throughput: f64,
    pub transport: TransportStats,
}

pub struct Client {
    transport: Transport,
    client_id: usize,
    servers: usize,
    requests: u64,
}

impl Client {
    pub fn new(
        transport: Transport,
        client_id: usize,
        config: &LookupConfig,
        topology: &Topology,
    ) -> Self {
        Self {
            transport,
            client_id,
            servers: topology.servers(),
            requests: config.requests,
        }
    }

    pub async fn run(self) -> Result<ClientReport> {
        info!(client_id = self.client_id, requests = self.requests, "started client");

        let mut round_trips =
            MetricsCollector::with_capacity(self.requests.min(PREALLOCATED_SAMPLES) as usize);
        let mut misses = 0;
        let started = Instant::now();
        for index in 0..self.requests {
            let server = target(index, self.servers);
            let key = index as i32;

            let sent = Instant::now();
            self.transport
                .send(server, Tag::Get, Request { key }.encode())
                .await?;
            let envelope = self
                .transport
                .recv(Source::Peer(server), Tag::GetResponse)
                .await?;
            round_trips.record(sent.elapsed());

            let response = Response::decode(&envelope.payload)?;
            if response.key != key {
                return Err(ProtocolError::KeyMismatch {
                    expected: key,
                    actual: response.key,
                }
                .into());
            }
            if response.value == MISS {
                misses += 1;
            }
        }
        let elapsed = started.elapsed();

        let secs = elapsed.as_secs_f64();
        let report = ClientReport {
            rank: self.transport.rank(),
            client_id: self.client_id,
            requests: self.requests,
            misses,
            elapsed,
            round_trips: round_trips.summary(),
            throughput: if secs > 0.0 {
                self.requests as f64 / secs
            } else {
                0.0
            },
            transport: self.transport.stats(),
        };
        info!(
            requests = report.requests,
            elapsed = ?report.elapsed,
            mean_rtt = ?report.round_trips.mean,
            "done"
        );
        Ok(report)
    }
}
