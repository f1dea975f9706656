use mcumgr_protocol::{CodecError, ResponseCode};

/// Why the simulated device rejected a request.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("rejected: {0}")]
    Rejected(ResponseCode),

    #[error("malformed request: {0}")]
    Malformed(#[from] CodecError),
}

impl DeviceError {
    /// Code reported back to the client.
    pub fn code(&self) -> ResponseCode {
        match self {
            Self::Rejected(code) => *code,
            Self::Malformed(_) => ResponseCode::InValue,
        }
    }
}
