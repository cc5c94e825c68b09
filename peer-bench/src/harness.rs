//! All-to-all bandwidth benchmark.
//!
//! Every epoch each peer posts one send to and one receive from every other
//! peer, then waits for all sends followed by all receives. The next epoch is
//! not started until both wait phases have returned.

use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::AllToAllConfig;
use crate::error::{ProtocolError, Result, TransportError};
use crate::message::Tag;
use crate::metrics::{MetricsCollector, Summary, as_secs};
use crate::transport::{Rank, Source, Transport, TransportStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EpochTiming {
    pub index: usize,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub rank: Rank,
    pub peers: usize,
    pub chunk_size: usize,
    pub sends_issued: u64,
    pub receives_completed: u64,
    pub epochs: Vec<EpochTiming>,
    pub summary: Summary,
    /// Configured data size divided by the median epoch, in bytes per second.
    pub bandwidth: f64,
    /// Epoch durations in seconds, comma separated.
    pub epoch_csv: String,
    pub transport: TransportStats,
}

pub struct Harness {
    transport: Transport,
    config: AllToAllConfig,
}

impl Harness {
    pub fn new(transport: Transport, config: AllToAllConfig) -> Self {
        Self { transport, config }
    }

    pub async fn run(self) -> Result<HarnessReport> {
        let peers = self.transport.size();
        let rank = self.transport.rank();
        let chunk_size = self.config.chunk_size(peers);
        info!(peers, chunk_size, epochs = self.config.epochs, "all-to-all starting");

        // One send buffer per peer, only reused after the handle that owned
        // it has been waited on. Receive slots are the posted handles.
        let outbound: Vec<Bytes> = (0..peers)
            .map(|_| Bytes::from(vec![rank as u8; chunk_size]))
            .collect();

        let mut metrics = MetricsCollector::with_capacity(self.config.epochs);
        let mut sends_issued = 0;
        let mut receives_completed = 0;
        for index in 0..self.config.epochs {
            let started = Instant::now();

            let sends = self
                .transport
                .others()
                .map(|peer| self.transport.isend(peer, Tag::Bulk, outbound[peer].clone()))
                .collect::<Result<Vec<_>, TransportError>>()?;
            sends_issued += sends.len() as u64;

            let receives = self
                .transport
                .others()
                .map(|peer| {
                    self.transport
                        .irecv(Source::Peer(peer), Tag::Bulk)
                        .map(|pending| (peer, pending))
                })
                .collect::<Result<Vec<_>, TransportError>>()?;

            for send in sends {
                send.wait().await?;
            }
            for (peer, receive) in receives {
                let envelope = receive.wait().await?;
                if envelope.payload.len() != chunk_size {
                    return Err(ProtocolError::ChunkSize {
                        from: peer,
                        expected: chunk_size,
                        actual: envelope.payload.len(),
                    }
                    .into());
                }
                receives_completed += 1;
            }

            let elapsed = started.elapsed();
            metrics.record(elapsed);
            debug!(epoch = index, ?elapsed, "epoch complete");
        }

        let summary = metrics.summary();
        let median = summary.median.as_secs_f64();
        let report = HarnessReport {
            rank,
            peers,
            chunk_size,
            sends_issued,
            receives_completed,
            epochs: metrics
                .samples()
                .iter()
                .enumerate()
                .map(|(index, elapsed)| EpochTiming {
                    index,
                    elapsed: *elapsed,
                })
                .collect(),
            summary,
            bandwidth: if median > 0.0 {
                self.config.data_size as f64 / median
            } else {
                0.0
            },
            epoch_csv: metrics.to_csv(),
            transport: self.transport.stats(),
        };
        info!(
            epochs = report.summary.count,
            median = ?report.summary.median,
            bandwidth = report.bandwidth,
            "all-to-all done"
        );
        Ok(report)
    }
}
