//! Write pump: drains queued frames onto the stream.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub(crate) async fn write_pump<W>(
    mut write: W,
    mut rx: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = rx.recv() => {
                let Some(frame) = frame else {
                    debug!("write channel closed");
                    break;
                };
                trace!(len = frame.len(), "writing frame");
                if let Err(e) = write.write_all(&frame).await {
                    warn!("stream write error: {e}");
                    break;
                }
                if let Err(e) = write.flush().await {
                    warn!("stream flush error: {e}");
                    break;
                }
            }
        }
    }

    cancel.cancel();
    let _ = write.shutdown().await;
}
