//! Tri-state outcome of one request/response exchange.

use mcumgr_protocol::{CborMap, CodecError, McuMgrResponse, ResponseCode};

use crate::TransportError;

/// Outcome of a single exchange.
///
/// A [`Response`](Self::Response) means the device answered, whatever its
/// code. A [`Failure`](Self::Failure) means no usable answer arrived.
#[derive(Debug)]
pub enum McuMgrResult<T> {
    Response { body: Option<T>, code: ResponseCode },
    Failure(TransportError),
}

impl<T> McuMgrResult<T> {
    /// Classifies the result of [`Transport::send`](crate::Transport::send),
    /// parsing the body with `parse`.
    ///
    /// A body that fails to parse under an `Ok` code is a decode failure.
    /// Under an error code the body is kept only if it parses.
    pub fn from_exchange<F>(exchange: Result<McuMgrResponse, TransportError>, parse: F) -> Self
    where
        F: FnOnce(&CborMap) -> Result<T, CodecError>,
    {
        let response = match exchange {
            Ok(response) => response,
            Err(e) => return Self::Failure(e),
        };
        let code = match response.code() {
            Ok(code) => code,
            Err(e) => return Self::Failure(e.into()),
        };
        match parse(&response.body) {
            Ok(body) => Self::Response {
                body: Some(body),
                code,
            },
            Err(e) if code.is_ok() => Self::Failure(e.into()),
            Err(_) => Self::Response { body: None, code },
        }
    }

    /// `true` for an `Ok` response with a body.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Response { body: Some(_), code } if code.is_ok())
    }

    /// The device's code, if the device answered.
    pub fn code(&self) -> Option<ResponseCode> {
        match self {
            Self::Response { code, .. } => Some(*code),
            Self::Failure(_) => None,
        }
    }

    /// Collapses into a `Result`, keeping the two error classes apart.
    pub fn into_result(self) -> Result<T, McuMgrError> {
        match self {
            Self::Response {
                body: Some(body),
                code,
            } if code.is_ok() => Ok(body),
            Self::Response { body: None, code } if code.is_ok() => Err(McuMgrError::MissingBody),
            Self::Response { code, .. } => Err(McuMgrError::Protocol(code)),
            Self::Failure(e) => Err(McuMgrError::Transport(e)),
        }
    }
}

/// Error side of [`McuMgrResult::into_result`].
#[derive(Debug, thiserror::Error)]
pub enum McuMgrError {
    #[error("device returned error: {0}")]
    Protocol(ResponseCode),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("response carried no body")]
    MissingBody,
}

impl McuMgrError {
    /// The device's code when this is a protocol error.
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            Self::Protocol(code) => Some(*code),
            _ => None,
        }
    }
}
