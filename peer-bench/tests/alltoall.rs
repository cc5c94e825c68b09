use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use peer_bench::config::AllToAllConfig;
use peer_bench::error::{Error, ProtocolError};
use peer_bench::harness::Harness;
use peer_bench::message::Tag;
use peer_bench::runner::{local_mesh, run_local_alltoall};
use peer_bench::transport::{Source, TransportOptions};
use tokio::time::timeout;

const RUN_TIMEOUT: Duration = Duration::from_secs(30);
const HOLD: Duration = Duration::from_millis(300);

#[tokio::test]
async fn four_peers_exchange_hundred_byte_chunks() -> Result<()> {
    let config = AllToAllConfig {
        epochs: 3,
        data_size: 400,
    };
    let reports = timeout(RUN_TIMEOUT, run_local_alltoall(4, &config)).await??;
    assert_eq!(reports.len(), 4);

    let mut total_sends = 0;
    for (rank, report) in reports.iter().enumerate() {
        assert_eq!(report.rank, rank);
        assert_eq!(report.peers, 4);
        assert_eq!(report.chunk_size, 100);
        assert_eq!(report.sends_issued, 9);
        assert_eq!(report.receives_completed, 9);
        assert_eq!(report.summary.count, 3);
        assert_eq!(report.epoch_csv.split(',').count(), 3);

        let indices: Vec<usize> = report.epochs.iter().map(|epoch| epoch.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        assert_eq!(report.transport.frames_sent, 9);
        assert_eq!(report.transport.bytes_sent, 900);
        assert_eq!(report.transport.frames_received, 9);
        assert_eq!(report.transport.bytes_received, 900);
        total_sends += report.sends_issued;
    }
    // epochs * peers * (peers - 1)
    assert_eq!(total_sends, 3 * 4 * 3);
    Ok(())
}

#[tokio::test]
async fn uneven_data_size_truncates_chunk() -> Result<()> {
    let config = AllToAllConfig {
        epochs: 2,
        data_size: 10,
    };
    let reports = timeout(RUN_TIMEOUT, run_local_alltoall(3, &config)).await??;
    for report in &reports {
        assert_eq!(report.chunk_size, 3);
        assert_eq!(report.transport.bytes_received, 2 * 2 * 3);
    }
    Ok(())
}

#[tokio::test]
async fn lone_peer_times_empty_epochs() -> Result<()> {
    let config = AllToAllConfig {
        epochs: 5,
        data_size: 1_000,
    };
    let reports = timeout(RUN_TIMEOUT, run_local_alltoall(1, &config)).await??;
    let report = &reports[0];
    assert_eq!(report.sends_issued, 0);
    assert_eq!(report.summary.count, 5);
    assert_eq!(report.chunk_size, 1_000);
    Ok(())
}

#[tokio::test]
async fn zero_epochs_produce_no_measurements() -> Result<()> {
    let config = AllToAllConfig {
        epochs: 0,
        data_size: 400,
    };
    let reports = timeout(RUN_TIMEOUT, run_local_alltoall(2, &config)).await??;
    for report in &reports {
        assert!(report.epochs.is_empty());
        assert_eq!(report.bandwidth, 0.0);
        assert!(report.epoch_csv.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn short_chunk_is_a_protocol_error() -> Result<()> {
    let peers = timeout(RUN_TIMEOUT, local_mesh(2, TransportOptions::default())).await??;
    let config = AllToAllConfig {
        epochs: 1,
        data_size: 400,
    };
    let running = tokio::spawn(Harness::new(peers[0].clone(), config).run());

    peers[1]
        .send(0, Tag::Bulk, Bytes::from_static(&[1, 1, 1]))
        .await?;

    let result = timeout(RUN_TIMEOUT, running).await??;
    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolError::ChunkSize {
            from: 1,
            expected: 200,
            actual: 3
        }))
    ));
    Ok(())
}

#[tokio::test]
async fn next_epoch_waits_for_previous_receives() -> Result<()> {
    let peers = timeout(RUN_TIMEOUT, local_mesh(2, TransportOptions::default())).await??;
    let config = AllToAllConfig {
        epochs: 2,
        data_size: 400,
    };
    let running = tokio::spawn(Harness::new(peers[0].clone(), config).run());

    let peer = &peers[1];
    let first = timeout(RUN_TIMEOUT, peer.recv(Source::Peer(0), Tag::Bulk)).await??;
    assert_eq!(first.payload.len(), 200);

    // Rank 0 cannot start epoch 1 while our epoch 0 chunk is held back.
    let early = timeout(HOLD, peer.recv(Source::Peer(0), Tag::Bulk)).await;
    assert!(early.is_err(), "epoch 1 started before epoch 0 completed");

    let chunk = Bytes::from(vec![1u8; 200]);
    peer.send(0, Tag::Bulk, chunk.clone()).await?;
    let second = timeout(RUN_TIMEOUT, peer.recv(Source::Peer(0), Tag::Bulk)).await??;
    assert_eq!(second.payload.len(), 200);
    peer.send(0, Tag::Bulk, chunk).await?;

    let report = timeout(RUN_TIMEOUT, running).await???;
    assert_eq!(report.summary.count, 2);
    assert_eq!(report.sends_issued, 2);
    assert_eq!(report.receives_completed, 2);
    assert_eq!(peer.stats().frames_received, 2);
    Ok(())
}
