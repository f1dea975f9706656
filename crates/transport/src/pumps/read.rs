//! Read pump: reassembles frames and routes responses to waiting requests.

use std::io;

use mcumgr_protocol::constants::HEADER_LEN;
use mcumgr_protocol::{McuMgrResponse, Scheme};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{PendingMap, lock};

/// Reads one standard-scheme frame (header plus `len` body bytes).
///
/// Returns `Ok(None)` when the stream ends cleanly between frames.
pub async fn read_frame<R>(read: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match read.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut frame = vec![0u8; HEADER_LEN + len];
    frame[..HEADER_LEN].copy_from_slice(&header);
    read.read_exact(&mut frame[HEADER_LEN..]).await?;
    Ok(Some(frame))
}

pub(crate) async fn read_pump<R>(mut read: R, pending: PendingMap, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read_frame(&mut read) => frame,
        };

        match frame {
            Ok(Some(frame)) => dispatch(&frame, &pending),
            Ok(None) => {
                debug!("stream ended");
                break;
            }
            Err(e) => {
                warn!("stream read error: {e}");
                break;
            }
        }
    }

    cancel.cancel();
    // Dropping the senders wakes every waiter with `Closed`.
    lock(&pending).clear();
}

fn dispatch(frame: &[u8], pending: &PendingMap) {
    let response = match McuMgrResponse::decode(Scheme::Standard, frame) {
        Ok(response) => response,
        Err(e) => {
            warn!("dropping undecodable frame: {e}");
            return;
        }
    };

    let header = response.header;
    if !header.op.is_response() {
        warn!(op = ?header.op, seq = header.seq, "dropping non-response frame");
        return;
    }

    trace!(group = header.group, seq = header.seq, len = header.len, "received response");

    let waiter = lock(pending).remove(&header.seq);
    match waiter {
        Some(waiter) => {
            let _ = waiter.tx.send(response);
        }
        None => warn!(seq = header.seq, "no pending request for response"),
    }
}
