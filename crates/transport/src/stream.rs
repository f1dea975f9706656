//! SMP over a byte stream (TCP, a serial bridge, an in-memory pipe).
//!
//! Frames use the standard scheme: the 8-byte header's length field says
//! how many CBOR bytes follow, so the read side can split the stream
//! without any extra framing. Requests are correlated with responses by
//! sequence number, which lets many requests share the link at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use mcumgr_protocol::{McuMgrRequest, McuMgrResponse, Scheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::pumps::{self, PendingEntry, PendingMap};
use crate::{SendFuture, SequenceCounter, Transport, TransportConfig, TransportError};

/// Frames queued for the write pump before `send` starts waiting.
const WRITE_QUEUE: usize = 64;

/// Standard-scheme transport over any `AsyncRead + AsyncWrite` stream.
///
/// Must be created inside a tokio runtime: the read and write pumps are
/// spawned immediately. Dropping the transport stops both pumps.
pub struct StreamTransport {
    write_tx: mpsc::Sender<Vec<u8>>,
    pending: PendingMap,
    sequence: SequenceCounter,
    tickets: AtomicU64,
    config: TransportConfig,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
}

impl StreamTransport {
    pub fn new<S>(stream: S, config: TransportConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_sequence(stream, config, SequenceCounter::new())
    }

    /// Like [`new`](Self::new) with an explicit sequence counter.
    pub fn with_sequence<S>(stream: S, config: TransportConfig, sequence: SequenceCounter) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if config.scheme != Scheme::Standard {
            warn!(scheme = ?config.scheme, "stream transport always uses the standard scheme");
        }

        let (read, write) = tokio::io::split(stream);
        let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let pending = pending.clone();
            let cancel = cancel.clone();
            tokio::spawn(pumps::read::read_pump(read, pending, cancel))
        };

        Self {
            write_tx,
            pending,
            sequence,
            tickets: AtomicU64::new(0),
            config,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
        }
    }

    /// Connects over TCP.
    pub async fn connect<A>(addr: A, config: TransportConfig) -> Result<Self, TransportError>
    where
        A: ToSocketAddrs,
    {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "connected");
        Ok(Self::new(stream, config))
    }

    /// `false` once either pump has stopped.
    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    async fn exchange(&self, request: McuMgrRequest) -> Result<McuMgrResponse, TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let seq = self.sequence.next();
        let frame = request.encode(Scheme::Standard, seq)?;
        if frame.len() > self.config.mtu {
            return Err(TransportError::MtuExceeded {
                len: frame.len(),
                mtu: self.config.mtu,
            });
        }

        let (tx, rx) = oneshot::channel();
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let _entry = PendingEntry::register(&self.pending, seq, ticket, tx)?;

        trace!(group = request.group, command = request.command, seq, len = frame.len(), "sending request");

        if self.write_tx.send(frame).await.is_err() {
            return Err(TransportError::Closed);
        }

        match tokio::time::timeout(self.config.request_timeout(), rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                debug!(seq, "request timed out");
                Err(TransportError::Timeout)
            }
        }
    }
}

impl Transport for StreamTransport {
    fn send(&self, request: McuMgrRequest) -> SendFuture<'_> {
        Box::pin(self.exchange(request))
    }

    fn mtu(&self) -> usize {
        self.config.mtu
    }

    fn scheme(&self) -> Scheme {
        Scheme::Standard
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
