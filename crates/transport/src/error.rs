use mcumgr_protocol::CodecError;

/// Failures below the SMP layer: the request never produced a usable
/// response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("frame of {len} bytes exceeds MTU {mtu}")]
    MtuExceeded { len: usize, mtu: usize },

    #[error("sequence number {0} already in flight")]
    SequenceBusy(u8),
}
