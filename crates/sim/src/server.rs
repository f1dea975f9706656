//! Serves a [`SimDevice`] over a byte stream using the standard scheme.

use std::io;
use std::sync::Arc;

use mcumgr_protocol::Scheme;
use mcumgr_transport::read_frame;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::device::SimDevice;

/// Answers requests on `stream` until the peer closes it.
///
/// Each request is handled on its own task, so response delays from
/// [`Faults`](crate::Faults) reorder responses on the wire.
pub async fn serve<S>(device: Arc<SimDevice>, stream: S) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut read, mut write) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            write.write_all(&frame).await?;
            write.flush().await?;
        }
        write.shutdown().await
    });

    while let Some(frame) = read_frame(&mut read).await? {
        let device = device.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = device.process(Scheme::Standard, &frame).await {
                let _ = tx.send(response).await;
            }
        });
    }
    debug!("client closed the stream");

    drop(tx);
    match writer.await {
        Ok(result) => result,
        Err(e) => Err(io::Error::other(e)),
    }
}

/// Accepts TCP clients forever, serving each one on its own task.
pub async fn serve_tcp(device: Arc<SimDevice>, listener: TcpListener) -> io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "simulated device listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!(%peer, "client connected");
        let device = device.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(device, stream).await {
                warn!(%peer, "connection error: {e}");
            }
            info!(%peer, "client disconnected");
        });
    }
}
