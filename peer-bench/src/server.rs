//! Lookup server: answers GET requests from any client until its share of
//! the run's requests has been served.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::LookupConfig;
use crate::error::Result;
use crate::message::{Request, Response, Tag};
use crate::metrics::as_secs;
use crate::role::Topology;
use crate::table::{LookupTable, MISS};
use crate::transport::{Rank, Source, Transport, TransportStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Initializing,
    Ready,
    Serving,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerReport {
    pub rank: Rank,
    /// State the loop stopped in; `Done` once the quota was served.
    pub state: ServerState,
    pub served: u64,
    /// Requests whose key fell outside the table.
    pub misses: u64,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub transport: TransportStats,
}

pub struct Server {
    transport: Transport,
    table_size: usize,
    quota: u64,
    progress_every: u64,
    state: ServerState,
}

impl Server {
    pub fn new(transport: Transport, config: &LookupConfig, topology: &Topology) -> Self {
        Self {
            transport,
            table_size: config.table_size,
            quota: config.requests_per_server(topology),
            progress_every: config.progress_every,
            state: ServerState::Initializing,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Requests this server answers before reaching [`ServerState::Done`].
    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub async fn run(mut self) -> Result<ServerReport> {
        let table = LookupTable::build(self.table_size);
        self.transition(ServerState::Ready);
        info!(table_size = table.len(), quota = self.quota, "server ready");

        self.transition(ServerState::Serving);
        let started = Instant::now();
        let mut misses = 0;
        for served in 1..=self.quota {
            let envelope = self.transport.recv(Source::Any, Tag::Get).await?;
            let Request { key } = Request::decode(&envelope.payload)?;

            let value = table.get(key);
            if value == MISS {
                misses += 1;
            }
            let response = Response { key, value }.encode();
            self.transport
                .send(envelope.from, Tag::GetResponse, response)
                .await?;

            if self.progress_every > 0 && served % self.progress_every == 0 {
                info!(served, quota = self.quota, "working");
            }
        }

        self.transition(ServerState::Done);
        let report = ServerReport {
            rank: self.transport.rank(),
            state: self.state,
            served: self.quota,
            misses,
            elapsed: started.elapsed(),
            transport: self.transport.stats(),
        };
        info!(served = report.served, misses, elapsed = ?report.elapsed, "server done");
        Ok(report)
    }

    fn transition(&mut self, next: ServerState) {
        debug!(from = ?self.state, to = ?next, "server state");
        self.state = next;
    }
}
