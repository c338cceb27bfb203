use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::RconCodec;
use crate::error::{RconError, Result};
use crate::frame::{Frame, MAX_FRAME_SIZE};

/// Frames queued for the writer task before `send` starts waiting.
const WRITE_QUEUE_DEPTH: usize = 64;

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;

/// Receives everything the read loop produces.
///
/// `on_frame` runs on the read loop itself; implementations must not
/// block.
pub trait FrameHandler: Send + Sync + 'static {
    fn on_frame(&self, frame: Frame);

    /// Called exactly once, after the last `on_frame`.
    fn on_closed(&self, reason: CloseReason);
}

/// Why the read loop stopped.
#[derive(Debug)]
pub enum CloseReason {
    /// `close()` was called, or the writer gave up after a failed write.
    Closed,
    /// The peer closed its side of the stream.
    Eof,
    /// Reading or decoding failed.
    Error(RconError),
}

struct Outbound {
    frame: Frame,
    ack: oneshot::Sender<Result<()>>,
}

/// A single framed RCON stream.
///
/// A background writer task owns the write half; the read half is
/// parked until [`Connection::start_receive_loop`] hands it to a reader
/// task. Both tasks stop when the connection is closed, after which the
/// underlying stream is dropped.
pub struct Connection {
    peer: SocketAddr,
    outbound: mpsc::Sender<Outbound>,
    reader: Mutex<Option<FramedRead<BoxedRead, RconCodec>>>,
    cancel: CancellationToken,
}

impl Connection {
    /// Open a TCP connection, giving up after `timeout`.
    ///
    /// On timeout the pending socket is dropped; nothing stays open.
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
        debug!(%endpoint, ?timeout, "opening tcp connection");
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(RconError::Connect(e)),
            Err(_) => return Err(RconError::Timeout(timeout)),
        };
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(%peer, "tcp connection established");
        Ok(Self::new(stream, peer))
    }

    /// Wrap an already-connected stream. Must be called inside a tokio
    /// runtime.
    pub fn new<S>(stream: S, peer: SocketAddr) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = FramedRead::with_capacity(
            Box::new(read_half) as BoxedRead,
            RconCodec::client(),
            MAX_FRAME_SIZE,
        );
        let writer = FramedWrite::new(write_half, RconCodec::client());

        let (tx, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        tokio::spawn(write_loop(writer, rx, cancel.clone(), peer));

        Self {
            peer,
            outbound: tx,
            reader: Mutex::new(Some(reader)),
            cancel,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Start delivering inbound frames to `handler`.
    ///
    /// Fails with `NotConnected` if the connection is closed or the loop
    /// is already running.
    pub fn start_receive_loop<H: FrameHandler>(&self, handler: Arc<H>) -> Result<()> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let reader = match reader {
            Some(reader) if !self.cancel.is_cancelled() => reader,
            _ => return Err(RconError::NotConnected),
        };

        let cancel = self.cancel.clone();
        let peer = self.peer;
        tokio::spawn(async move {
            let reason = read_loop(reader, handler.as_ref(), &cancel, peer).await;
            debug!(%peer, ?reason, "receive loop stopped");
            // Whatever ended the read side also ends the write side.
            cancel.cancel();
            handler.on_closed(reason);
        });
        Ok(())
    }

    /// Queue `frame` and wait until it has been written to the socket.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RconError::NotConnected);
        }
        let (ack, done) = oneshot::channel();
        self.outbound
            .send(Outbound { frame, ack })
            .await
            .map_err(|_| RconError::NotConnected)?;
        done.await.map_err(|_| RconError::NotConnected)?
    }

    /// Close both directions. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(peer = %self.peer, "closing connection");
            self.cancel.cancel();
        }
        // Drops the read half if the receive loop never started.
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection has been closed, from either side.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_loop<H: FrameHandler + ?Sized>(
    mut reader: FramedRead<BoxedRead, RconCodec>,
    handler: &H,
    cancel: &CancellationToken,
    peer: SocketAddr,
) -> CloseReason {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CloseReason::Closed,
            next = reader.next() => next,
        };
        match next {
            Some(Ok(frame)) => {
                trace!(%peer, %frame, "received frame");
                handler.on_frame(frame);
            }
            Some(Err(e)) => {
                warn!(%peer, error = %e, "receive failed");
                return CloseReason::Error(e);
            }
            None => return CloseReason::Eof,
        }
    }
}

async fn write_loop<W>(
    mut writer: FramedWrite<W, RconCodec>,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
    peer: SocketAddr,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let Outbound { frame, ack } = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(outbound) => outbound,
                None => break,
            },
        };

        trace!(%peer, %frame, "writing frame");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RconError::ConnectionClosed),
            result = writer.send(frame) => result,
        };
        let failed = result.is_err();
        if let Err(e) = &result {
            warn!(%peer, error = %e, "write failed");
        }
        let _ = ack.send(result);
        if failed {
            cancel.cancel();
            break;
        }
    }

    rx.close();
    while let Ok(Outbound { ack, .. }) = rx.try_recv() {
        let _ = ack.send(Err(RconError::NotConnected));
    }
    if let Err(e) = writer.close().await {
        debug!(%peer, error = %e, "shutdown of write side failed");
    }
}

// ── Tests ────────────────────────────────────────────────────────
