//! Point-to-point tagged message passing over a full TCP mesh.
//!
//! Every peer binds a listener at its own address, dials every other peer and
//! accepts one connection from each of them. Dialed links carry outbound
//! frames, accepted links carry inbound frames, so each direction of a pair
//! has exactly one writer and one reader.
//!
//! # Frame format
//!
//! ```text
//! handshake (once per dialed link):  rank: u32 LE
//! frame:                             tag: u32 LE | len: u32 LE | payload
//! ```
//!
//! # Matching
//!
//! Inbound frames land in a mailbox that pairs them with posted receives
//! in post order, or parks them until a matching receive is posted. Frames
//! from one sender with one tag are therefore observed in send order. There
//! is no ordering across senders or tags.
//!
//! # Failure
//!
//! There are no timeouts. A receive that never matches, for example because
//! the sending peer died, waits forever. Callers needing liveness must wrap
//! calls in their own watchdog.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::future::try_join_all;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::message::Tag;

pub type Rank = usize;

/// Which sender a receive accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Any,
    Peer(Rank),
}

impl Source {
    fn accepts(self, from: Rank) -> bool {
        match self {
            Source::Any => true,
            Source::Peer(rank) => rank == from,
        }
    }
}

/// A received payload together with the rank that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: Rank,
    pub payload: Bytes,
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Dial attempts per peer before giving up.
    pub dial_attempts: u32,
    pub dial_backoff: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            dial_attempts: 100,
            dial_backoff: Duration::from_millis(50),
        }
    }
}

/// Handle for an outstanding non-blocking operation.
///
/// Dropping a handle does not cancel the operation; it only discards the
/// completion.
#[must_use = "a pending operation must be waited on to observe completion"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T, TransportError>>,
}

impl<T> Pending<T> {
    fn channel() -> (oneshot::Sender<Result<T, TransportError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    fn ready(value: T) -> Self {
        let (tx, pending) = Self::channel();
        let _ = tx.send(Ok(value));
        pending
    }

    /// Blocks until the operation completes.
    pub async fn wait(self) -> Result<T, TransportError> {
        self.rx.await.map_err(|_| TransportError::Abandoned)?
    }
}

/// Counters for everything that crossed this peer's links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
}

#[derive(Default)]
struct Counters {
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
}

impl Counters {
    fn sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn received(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransportStats {
        TransportStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

struct Outbound {
    tag: Tag,
    payload: Bytes,
    done: oneshot::Sender<Result<(), TransportError>>,
}

struct PostedRecv {
    source: Source,
    tag: Tag,
    slot: oneshot::Sender<Result<Envelope, TransportError>>,
}

#[derive(Default)]
struct MailboxState {
    unexpected: VecDeque<(Tag, Envelope)>,
    posted: VecDeque<PostedRecv>,
}

/// Matches inbound frames against posted receives.
#[derive(Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
}

impl Mailbox {
    fn state(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, tag: Tag, mut envelope: Envelope) {
        let mut state = self.state();
        while let Some(index) = state
            .posted
            .iter()
            .position(|posted| posted.tag == tag && posted.source.accepts(envelope.from))
        {
            let Some(posted) = state.posted.remove(index) else {
                break;
            };
            match posted.slot.send(Ok(envelope)) {
                Ok(()) => return,
                // Receiver gave up on its handle; offer the frame to the next match.
                Err(returned) => match returned {
                    Ok(back) => envelope = back,
                    Err(_) => return,
                },
            }
        }
        state.unexpected.push_back((tag, envelope));
    }

    fn post(&self, source: Source, tag: Tag) -> Pending<Envelope> {
        let (slot, pending) = Pending::channel();
        let mut state = self.state();
        let matched = state
            .unexpected
            .iter()
            .position(|(queued, envelope)| *queued == tag && source.accepts(envelope.from));
        match matched.and_then(|index| state.unexpected.remove(index)) {
            Some((_, envelope)) => {
                let _ = slot.send(Ok(envelope));
            }
            None => state.posted.push_back(PostedRecv { source, tag, slot }),
        }
        pending
    }
}

struct Inner {
    rank: Rank,
    size: usize,
    links: HashMap<Rank, mpsc::UnboundedSender<Outbound>>,
    mailbox: Arc<Mailbox>,
    counters: Arc<Counters>,
}

/// One peer's endpoint in the mesh. Cheap to clone.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    /// Binds `peers[rank]` and connects to every other peer.
    pub async fn bind(
        rank: Rank,
        peers: Vec<SocketAddr>,
        options: TransportOptions,
    ) -> Result<Self, TransportError> {
        let addr = *peers.get(rank).ok_or(TransportError::UnknownPeer(rank))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        Self::establish(rank, listener, peers, options).await
    }

    /// Completes the mesh using an already bound listener.
    ///
    /// Returns once every outbound link is dialed and every inbound link has
    /// completed its handshake.
    pub async fn establish(
        rank: Rank,
        listener: TcpListener,
        peers: Vec<SocketAddr>,
        options: TransportOptions,
    ) -> Result<Self, TransportError> {
        let size = peers.len();
        if rank >= size {
            return Err(TransportError::UnknownPeer(rank));
        }

        let mailbox = Arc::new(Mailbox::default());
        let counters = Arc::new(Counters::default());

        let acceptor = spawn_acceptor(
            rank,
            size,
            listener,
            Arc::clone(&mailbox),
            Arc::clone(&counters),
        );

        let dials = peers
            .iter()
            .enumerate()
            .filter(|(peer, _)| *peer != rank)
            .map(|(peer, addr)| dial(rank, peer, *addr, &options, Arc::clone(&counters)));
        let links = try_join_all(dials).await?.into_iter().collect();

        acceptor.await.map_err(|_| TransportError::Abandoned)??;
        info!(rank, peers = size, "mesh established");

        Ok(Self {
            inner: Arc::new(Inner {
                rank,
                size,
                links,
                mailbox,
                counters,
            }),
        })
    }

    pub fn rank(&self) -> Rank {
        self.inner.rank
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Every rank except this one, ascending.
    pub fn others(&self) -> impl Iterator<Item = Rank> + '_ {
        (0..self.inner.size).filter(move |peer| *peer != self.inner.rank)
    }

    pub fn stats(&self) -> TransportStats {
        self.inner.counters.snapshot()
    }

    /// Queues `payload` for `peer` and returns immediately.
    ///
    /// The payload is owned by the operation until the handle resolves.
    pub fn isend(&self, peer: Rank, tag: Tag, payload: Bytes) -> Result<Pending<()>, TransportError> {
        if peer == self.inner.rank {
            self.inner.counters.sent(payload.len());
            self.inner.counters.received(payload.len());
            self.inner.mailbox.deliver(
                tag,
                Envelope {
                    from: peer,
                    payload,
                },
            );
            return Ok(Pending::ready(()));
        }

        let link = self
            .inner
            .links
            .get(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        let (done, pending) = Pending::channel();
        link.send(Outbound { tag, payload, done })
            .map_err(|_| TransportError::Closed(peer))?;
        Ok(pending)
    }

    /// Posts a receive and returns immediately.
    pub fn irecv(&self, source: Source, tag: Tag) -> Result<Pending<Envelope>, TransportError> {
        if let Source::Peer(peer) = source {
            if peer >= self.inner.size {
                return Err(TransportError::UnknownPeer(peer));
            }
        }
        Ok(self.inner.mailbox.post(source, tag))
    }

    /// Sends and waits until the frame has been flushed to the link.
    pub async fn send(&self, peer: Rank, tag: Tag, payload: Bytes) -> Result<(), TransportError> {
        self.isend(peer, tag, payload)?.wait().await
    }

    /// Waits for the oldest frame with `tag` from `source`.
    pub async fn recv(&self, source: Source, tag: Tag) -> Result<Envelope, TransportError> {
        self.irecv(source, tag)?.wait().await
    }
}

fn spawn_acceptor(
    rank: Rank,
    size: usize,
    listener: TcpListener,
    mailbox: Arc<Mailbox>,
    counters: Arc<Counters>,
) -> JoinHandle<Result<(), TransportError>> {
    tokio::spawn(async move {
        let mut linked = vec![false; size];
        linked[rank] = true;
        for _ in 1..size {
            let (stream, addr) = listener.accept().await?;
            stream.set_nodelay(true)?;
            let (reader, _writer) = stream.into_split();
            let mut reader = BufReader::new(reader);

            let announced = reader.read_u32_le().await?;
            let from = announced as usize;
            if linked.get(from).copied().unwrap_or(true) {
                return Err(TransportError::Handshake {
                    addr,
                    rank: announced,
                });
            }
            linked[from] = true;
            debug!(rank, from, %addr, "inbound link up");

            let mailbox = Arc::clone(&mailbox);
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                read_frames(from, reader, mailbox, counters).await;
            });
        }
        Ok::<(), TransportError>(())
    })
}

async fn dial(
    rank: Rank,
    peer: Rank,
    addr: SocketAddr,
    options: &TransportOptions,
    counters: Arc<Counters>,
) -> Result<(Rank, mpsc::UnboundedSender<Outbound>), TransportError> {
    let attempts = options.dial_attempts.max(1);
    let mut attempt = 0;
    let stream = loop {
        attempt += 1;
        match TcpStream::connect(addr).await {
            Ok(stream) => break stream,
            Err(source) if attempt >= attempts => {
                return Err(TransportError::Dial {
                    rank: peer,
                    addr,
                    attempts,
                    source,
                });
            }
            Err(err) => {
                debug!(peer, %addr, attempt, error = %err, "peer not reachable yet");
                tokio::time::sleep(options.dial_backoff).await;
            }
        }
    };
    stream.set_nodelay(true)?;

    let (_reader, writer) = stream.into_split();
    let mut writer = BufWriter::new(writer);
    writer.write_u32_le(rank as u32).await?;
    writer.flush().await?;
    debug!(rank, peer, %addr, "outbound link up");

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        write_frames(peer, writer, rx, counters).await;
    });
    Ok((peer, tx))
}

async fn write_frames(
    peer: Rank,
    mut writer: BufWriter<OwnedWriteHalf>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    counters: Arc<Counters>,
) {
    while let Some(Outbound { tag, payload, done }) = queue.recv().await {
        let result = write_frame(&mut writer, tag, &payload).await;
        let failed = match &result {
            Ok(()) => {
                counters.sent(payload.len());
                false
            }
            Err(err) => {
                warn!(peer, error = %err, "outbound link failed");
                true
            }
        };
        let _ = done.send(result.map_err(TransportError::from));
        if failed {
            return;
        }
    }
    if let Err(err) = writer.shutdown().await {
        debug!(peer, error = %err, "outbound link shutdown failed");
    }
}

async fn write_frame(
    writer: &mut BufWriter<OwnedWriteHalf>,
    tag: Tag,
    payload: &[u8],
) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload exceeds u32 length"))?;
    writer.write_u32_le(tag.code()).await?;
    writer.write_u32_le(len).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

async fn read_frames(
    from: Rank,
    mut reader: BufReader<OwnedReadHalf>,
    mailbox: Arc<Mailbox>,
    counters: Arc<Counters>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some((tag, payload))) => {
                counters.received(payload.len());
                mailbox.deliver(tag, Envelope { from, payload });
            }
            Ok(None) => {
                debug!(from, "inbound link closed");
                return;
            }
            Err(err) => {
                warn!(from, error = %err, "inbound link failed");
                return;
            }
        }
    }
}

/// Reads one frame, or `None` on a clean close between frames.
async fn read_frame(reader: &mut BufReader<OwnedReadHalf>) -> io::Result<Option<(Tag, Bytes)>> {
    let code = match reader.read_u32_le().await {
        Ok(code) => code,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    };
    let tag = Tag::from_code(code).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, format!("unknown tag {code}"))
    })?;
    let len = reader.read_u32_le().await? as usize;
    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;
    Ok(Some((tag, payload.freeze())))
}
