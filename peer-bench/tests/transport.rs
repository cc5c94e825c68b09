use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use peer_bench::message::Tag;
use peer_bench::runner::local_mesh;
use peer_bench::transport::{Source, Transport, TransportOptions};
use tokio::net::TcpListener;
use tokio::time::timeout;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

async fn mesh(count: usize) -> Result<Vec<Transport>> {
    Ok(timeout(STEP_TIMEOUT, local_mesh(count, TransportOptions::default())).await??)
}

#[tokio::test]
async fn blocking_send_reaches_named_peer() -> Result<()> {
    let peers = mesh(3).await?;
    assert_eq!(peers[2].rank(), 2);
    assert_eq!(peers[2].size(), 3);
    assert_eq!(peers[2].others().collect::<Vec<_>>(), vec![0, 1]);

    peers[2]
        .send(0, Tag::Get, Bytes::from_static(&[1, 2, 3, 4]))
        .await?;
    let envelope = timeout(STEP_TIMEOUT, peers[0].recv(Source::Peer(2), Tag::Get)).await??;

    assert_eq!(envelope.from, 2);
    assert_eq!(&envelope.payload[..], &[1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn frames_from_one_sender_arrive_in_order() -> Result<()> {
    let peers = mesh(2).await?;

    let mut sends = Vec::new();
    for value in 0..64u8 {
        sends.push(peers[1].isend(0, Tag::Bulk, Bytes::from(vec![value; 16]))?);
    }
    for send in sends {
        send.wait().await?;
    }

    for expected in 0..64u8 {
        let envelope = timeout(STEP_TIMEOUT, peers[0].recv(Source::Peer(1), Tag::Bulk)).await??;
        assert_eq!(envelope.payload.len(), 16);
        assert_eq!(envelope.payload[0], expected);
    }
    Ok(())
}

#[tokio::test]
async fn any_source_receive_reports_sender() -> Result<()> {
    let peers = mesh(4).await?;

    for sender in 1..4 {
        peers[sender]
            .send(0, Tag::Get, Bytes::from(vec![sender as u8]))
            .await?;
    }

    let mut senders = Vec::new();
    for _ in 1..4 {
        let envelope = timeout(STEP_TIMEOUT, peers[0].recv(Source::Any, Tag::Get)).await??;
        assert_eq!(envelope.payload[0] as usize, envelope.from);
        senders.push(envelope.from);
    }
    senders.sort_unstable();
    assert_eq!(senders, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn receives_only_match_their_tag() -> Result<()> {
    let peers = mesh(2).await?;

    peers[1].send(0, Tag::Get, Bytes::from_static(b"get")).await?;
    peers[1]
        .send(0, Tag::GetResponse, Bytes::from_static(b"response"))
        .await?;

    let response = timeout(STEP_TIMEOUT, peers[0].recv(Source::Peer(1), Tag::GetResponse)).await??;
    assert_eq!(&response.payload[..], b"response");
    let request = timeout(STEP_TIMEOUT, peers[0].recv(Source::Peer(1), Tag::Get)).await??;
    assert_eq!(&request.payload[..], b"get");
    Ok(())
}

#[tokio::test]
async fn posted_receive_completes_after_later_send() -> Result<()> {
    let peers = mesh(2).await?;

    let receive = peers[0].irecv(Source::Peer(1), Tag::Bulk)?;
    let send = peers[1].isend(0, Tag::Bulk, Bytes::from(vec![9; 1024]))?;

    send.wait().await?;
    let envelope = timeout(STEP_TIMEOUT, receive.wait()).await??;
    assert_eq!(envelope.payload.len(), 1024);

    let sender = peers[1].stats();
    assert_eq!(sender.frames_sent, 1);
    assert_eq!(sender.bytes_sent, 1024);
    let receiver = peers[0].stats();
    assert_eq!(receiver.frames_received, 1);
    assert_eq!(receiver.bytes_received, 1024);
    Ok(())
}

#[tokio::test]
async fn self_send_is_delivered_locally() -> Result<()> {
    let peers = mesh(2).await?;

    peers[0].send(0, Tag::Get, Bytes::from_static(&[5])).await?;
    let envelope = timeout(STEP_TIMEOUT, peers[0].recv(Source::Any, Tag::Get)).await??;
    assert_eq!(envelope.from, 0);
    assert_eq!(&envelope.payload[..], &[5]);
    Ok(())
}

#[tokio::test]
async fn empty_payloads_are_framed() -> Result<()> {
    let peers = mesh(2).await?;

    peers[0].send(1, Tag::Bulk, Bytes::new()).await?;
    let envelope = timeout(STEP_TIMEOUT, peers[1].recv(Source::Peer(0), Tag::Bulk)).await??;
    assert!(envelope.payload.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_peer_is_rejected() -> Result<()> {
    let peers = mesh(2).await?;

    assert!(peers[0].isend(5, Tag::Get, Bytes::new()).is_err());
    assert!(peers[0].irecv(Source::Peer(5), Tag::Get).is_err());
    Ok(())
}

#[tokio::test]
async fn dial_gives_up_after_configured_attempts() -> Result<()> {
    // Reserve an address, then free it so nothing is listening there.
    let vacant = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let own = listener.local_addr()?;

    let options = TransportOptions {
        dial_attempts: 2,
        dial_backoff: Duration::from_millis(10),
    };
    let result = timeout(
        STEP_TIMEOUT,
        Transport::establish(0, listener, vec![own, vacant], options),
    )
    .await?;
    assert!(result.is_err());
    Ok(())
}
