use mcumgr_protocol::ResponseCode;
use mcumgr_transport::{McuMgrError, TransportError};

/// Why a single chunk exchange failed. Every variant is retried.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("device returned error: {0}")]
    Protocol(ResponseCode),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("response carried no body")]
    MissingBody,

    #[error("device acknowledged offset {actual}, expected {expected}")]
    OffsetMismatch { expected: u64, actual: u64 },

    #[error("chunk at offset {offset} carried {actual} bytes, expected {expected}")]
    SizeMismatch {
        offset: u64,
        expected: usize,
        actual: usize,
    },
}

impl From<McuMgrError> for ChunkError {
    fn from(e: McuMgrError) -> Self {
        match e {
            McuMgrError::Protocol(code) => Self::Protocol(code),
            McuMgrError::Transport(e) => Self::Transport(e),
            McuMgrError::MissingBody => Self::MissingBody,
        }
    }
}

/// Errors that end a transfer session.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("chunk at offset {offset} failed after {attempts} attempts: {source}")]
    Chunk {
        offset: u64,
        attempts: u32,
        source: Box<ChunkError>,
    },

    #[error("MTU {mtu} leaves no room for data at offset {offset}")]
    MtuTooSmall { mtu: usize, offset: u64 },

    #[error("first response carried no total length")]
    MissingLength,

    #[error("device reported {total} bytes but sent a first chunk of {first_chunk}")]
    InvalidLength { total: u64, first_chunk: usize },

    #[error("chunk task failed: {0}")]
    Task(String),
}

impl TransferError {
    /// The failed chunk's last error, if a chunk exhausted its retries.
    pub fn chunk_error(&self) -> Option<&ChunkError> {
        match self {
            Self::Chunk { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The device's code when the transfer died on a protocol error.
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self.chunk_error()? {
            ChunkError::Protocol(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_protocol_error(&self) -> bool {
        self.response_code().is_some()
    }

    pub fn is_transport_failure(&self) -> bool {
        matches!(self.chunk_error(), Some(ChunkError::Transport(_)))
    }
}
